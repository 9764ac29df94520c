//! Declarative configuration schemas.
//!
//! Blocks describe their parameters as ordered [`Param`] declarations and
//! the registry renders them into the JSON-Schema-shaped object exposed over
//! introspection. Rendering is pure, so repeated calls produce identical
//! output. A parameter without a default is required.

use serde_json::{json, Map, Value};

// ---------------------------------------------------------------------------
// ParamType — value types a parameter can take
// ---------------------------------------------------------------------------

/// JSON value type of one configuration parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array(Box<ParamType>),
}

impl ParamType {
    /// Render as a property skeleton: `{"type": ...}`, plus `items` for arrays.
    fn to_property(&self) -> Value {
        match self {
            ParamType::String => json!({"type": "string"}),
            ParamType::Integer => json!({"type": "integer"}),
            ParamType::Number => json!({"type": "number"}),
            ParamType::Boolean => json!({"type": "boolean"}),
            ParamType::Object => json!({"type": "object"}),
            ParamType::Array(items) => json!({"type": "array", "items": items.to_property()}),
        }
    }
}

// ---------------------------------------------------------------------------
// Param — one declared parameter
// ---------------------------------------------------------------------------

/// One configuration parameter declaration.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    param_type: ParamType,
    default: Option<Value>,
    choices: Option<Vec<Value>>,
    description: Option<String>,
    field_reference: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            default: None,
            choices: None,
            description: None,
            field_reference: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Object)
    }

    pub fn string_array(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Array(Box::new(ParamType::String)))
    }

    /// Default value; declaring one makes the parameter optional.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Restrict the value to a fixed set of string choices.
    pub fn choices(mut self, values: &[&str]) -> Self {
        self.choices = Some(values.iter().map(|v| json!(v)).collect());
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Mark the parameter as naming a context field, so editors can offer
    /// field pickers instead of free text.
    pub fn field_reference(mut self) -> Self {
        self.field_reference = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

// ---------------------------------------------------------------------------
// ConfigSchema — ordered parameter list for one block type
// ---------------------------------------------------------------------------

/// Ordered set of parameter declarations for one block type.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    params: Vec<Param>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Append a parameter declaration.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Render the JSON-Schema-shaped object served over introspection:
    /// `{"type": "object", "properties": {...}, "required": [...]}` with
    /// `required` in declaration order.
    pub fn to_value(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            let mut property = param.param_type.to_property();
            if let Some(default) = &param.default {
                property["default"] = default.clone();
            }
            if let Some(choices) = &param.choices {
                property["enum"] = json!(choices);
            }
            if let Some(description) = &param.description {
                property["description"] = json!(description);
            }
            if param.field_reference {
                property["isFieldReference"] = json!(true);
            }
            properties.insert(param.name.clone(), property);
            if param.is_required() {
                required.push(json!(param.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
