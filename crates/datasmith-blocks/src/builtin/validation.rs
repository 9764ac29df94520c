//! Rule-based and JSON validation blocks.
//!
//! Both record their verdict in the context (`valid`) instead of failing the
//! run; only `JsonValidator` in strict mode turns a parse failure into a
//! block error.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};

use datasmith_types::{Context, DatasmithError, Result};

use crate::block::{Block, BlockSchema, WILDCARD};
use crate::config::BlockConfig;
use crate::registry::BlockRegistration;
use crate::schema::{ConfigSchema, Param};

// ---------------------------------------------------------------------------
// ValidatorBlock — length bounds and forbidden words
// ---------------------------------------------------------------------------

/// Check text length bounds and forbidden words.
pub struct ValidatorBlock {
    min_length: usize,
    max_length: usize,
    forbidden_words: Vec<String>,
}

impl ValidatorBlock {
    pub const TYPE: &'static str = "ValidatorBlock";

    pub fn from_config(config: &Map<String, Value>) -> Result<Self> {
        let config = BlockConfig::new(Self::TYPE, config.clone());
        Ok(Self {
            min_length: config.uint_or("min_length", 0)? as usize,
            max_length: config.uint_or("max_length", 100_000)? as usize,
            forbidden_words: config.string_list_or("forbidden_words", &[])?,
        })
    }

    pub fn registration() -> BlockRegistration {
        BlockRegistration::new(
            BlockSchema {
                block_type: Self::TYPE.to_string(),
                name: "Validator".to_string(),
                description: "Validate text against length bounds and forbidden words".to_string(),
                inputs: vec!["text".to_string(), "assistant".to_string()],
                outputs: vec!["text".to_string(), "valid".to_string(), "assistant".to_string()],
                config_schema: Self::config_schema().to_value(),
                algorithm: None,
                paper: None,
            },
            |config| Ok(Box::new(Self::from_config(config)?)),
        )
    }

    fn config_schema() -> ConfigSchema {
        ConfigSchema::new()
            .param(Param::integer("min_length").default(0))
            .param(Param::integer("max_length").default(100_000))
            .param(
                Param::string_array("forbidden_words")
                    .default(json!([]))
                    .describe("List of words that should not appear in the text"),
            )
    }
}

#[async_trait]
impl Block for ValidatorBlock {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn outputs(&self) -> &[&str] {
        &["text", "valid", "assistant"]
    }

    async fn execute(&self, context: &Context) -> Result<Context> {
        // empty or missing `text` falls back to `assistant`
        let text = match context.get_str("text") {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => context.get_string("assistant", ""),
        };

        let length = text.chars().count();
        let mut valid = length >= self.min_length && length <= self.max_length;
        if valid {
            let lowered = text.to_lowercase();
            valid = !self
                .forbidden_words
                .iter()
                .any(|word| lowered.contains(&word.to_lowercase()));
        }

        let mut output = Context::new();
        output.insert("valid", Value::Bool(valid));
        if let Some(value) = context.get("text") {
            output.insert("text", value.clone());
        }
        if let Some(value) = context.get("assistant") {
            output.insert("assistant", value.clone());
        }
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// JsonValidator — parse and check JSON from any context field
// ---------------------------------------------------------------------------

/// Parse and validate JSON carried in a context field.
pub struct JsonValidator {
    field_name: String,
    required_fields: Vec<String>,
    strict: bool,
    fence: Regex,
}

impl JsonValidator {
    pub const TYPE: &'static str = "JsonValidator";

    pub fn from_config(config: &Map<String, Value>) -> Result<Self> {
        let config = BlockConfig::new(Self::TYPE, config.clone());
        Ok(Self {
            field_name: config.str_or("field_name", "assistant")?,
            required_fields: config.string_list_or("required_fields", &[])?,
            strict: config.bool_or("strict", false)?,
            fence: Regex::new(r"(?s)^```(?:json)?\s*\n?(.*?)\n?```\s*$").unwrap(),
        })
    }

    pub fn registration() -> BlockRegistration {
        BlockRegistration::new(
            BlockSchema {
                block_type: Self::TYPE.to_string(),
                name: "JSON Validator".to_string(),
                description: "Parse and validate JSON from a field of the accumulated context"
                    .to_string(),
                inputs: vec![WILDCARD.to_string()],
                outputs: vec!["valid".to_string(), "parsed_json".to_string()],
                config_schema: Self::config_schema().to_value(),
                algorithm: None,
                paper: None,
            },
            |config| Ok(Box::new(Self::from_config(config)?)),
        )
    }

    fn config_schema() -> ConfigSchema {
        ConfigSchema::new()
            .param(
                Param::string("field_name")
                    .default("assistant")
                    .field_reference()
                    .describe("Context field to parse as JSON"),
            )
            .param(Param::string_array("required_fields").default(json!([])))
            .param(Param::boolean("strict").default(false))
    }

    fn verdict(valid: bool, parsed: Value) -> Context {
        let mut output = Context::new();
        output.insert("valid", Value::Bool(valid));
        output.insert("parsed_json", parsed);
        output
    }

    fn has_required_fields(&self, parsed: &Value) -> bool {
        match parsed {
            Value::Object(map) => self.required_fields.iter().all(|f| map.contains_key(f)),
            Value::Array(items) => self
                .required_fields
                .iter()
                .all(|f| items.iter().any(|item| item.as_str() == Some(f.as_str()))),
            _ => false,
        }
    }
}

#[async_trait]
impl Block for JsonValidator {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn outputs(&self) -> &[&str] {
        &["valid", "parsed_json"]
    }

    async fn execute(&self, context: &Context) -> Result<Context> {
        // objects and arrays (say, from StructuredGenerator) are used as-is
        let parsed = match context.get(&self.field_name) {
            Some(value @ (Value::Object(_) | Value::Array(_))) => value.clone(),
            other => {
                let raw = other.and_then(Value::as_str).unwrap_or("");
                let stripped = self.fence.replace(raw, "$1");
                match serde_json::from_str::<Value>(stripped.trim()) {
                    Ok(value) => value,
                    Err(e) if self.strict => {
                        return Err(DatasmithError::Block {
                            block_type: Self::TYPE.to_string(),
                            message: format!("invalid JSON: {e}"),
                        });
                    }
                    Err(_) => return Ok(Self::verdict(false, Value::Null)),
                }
            }
        };

        if !self.required_fields.is_empty() && !self.has_required_fields(&parsed) {
            return Ok(Self::verdict(false, Value::Null));
        }
        Ok(Self::verdict(true, parsed))
    }
}
