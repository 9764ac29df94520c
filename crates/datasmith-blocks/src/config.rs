//! Typed access to a block's raw configuration map.

use serde_json::{Map, Value};

use datasmith_types::{DatasmithError, Result};

/// Wraps a block's raw config map with typed getters.
///
/// Absent keys fall back to the caller's default; present keys of the wrong
/// type are an invalid-config error naming the block type, so a mistyped
/// value fails at load time instead of silently taking the default.
#[derive(Debug, Clone)]
pub struct BlockConfig {
    block_type: String,
    values: Map<String, Value>,
}

impl BlockConfig {
    pub fn new(block_type: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            block_type: block_type.into(),
            values,
        }
    }

    pub fn block_type(&self) -> &str {
        &self.block_type
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value, or `default` when absent.
    pub fn str_or(&self, key: &str, default: &str) -> Result<String> {
        match self.values.get(key) {
            None => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.type_error(key, "a string", other)),
        }
    }

    /// Integer value, or `default` when absent.
    pub fn int_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.values.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_i64()
                .ok_or_else(|| self.type_error(key, "an integer", value)),
        }
    }

    /// Non-negative integer, or `default` when absent.
    pub fn uint_or(&self, key: &str, default: u32) -> Result<u32> {
        match self.values.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| self.type_error(key, "a non-negative integer", value)),
        }
    }

    /// Float value (integers accepted), or `default` when absent.
    pub fn float_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.values.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_f64()
                .ok_or_else(|| self.type_error(key, "a number", value)),
        }
    }

    /// Boolean value, or `default` when absent.
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.values.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| self.type_error(key, "a boolean", value)),
        }
    }

    /// List of strings, or `default` when absent.
    pub fn string_list_or(&self, key: &str, default: &[&str]) -> Result<Vec<String>> {
        match self.values.get(key) {
            None => Ok(default.iter().map(|s| s.to_string()).collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(self.type_error(key, "an array of strings", other)),
                })
                .collect(),
            Some(other) => Err(self.type_error(key, "an array of strings", other)),
        }
    }

    /// Object value that must be present.
    pub fn required_object(&self, key: &str) -> Result<Map<String, Value>> {
        match self.values.get(key) {
            None => Err(DatasmithError::InvalidConfig {
                block_type: self.block_type.clone(),
                message: format!("missing required parameter '{key}'"),
            }),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(other) => Err(self.type_error(key, "an object", other)),
        }
    }

    fn type_error(&self, key: &str, expected: &str, found: &Value) -> DatasmithError {
        DatasmithError::InvalidConfig {
            block_type: self.block_type.clone(),
            message: format!("parameter '{key}' must be {expected}, got {}", describe(found)),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_config(value: Value) -> BlockConfig {
        BlockConfig::new("Example", value.as_object().unwrap().clone())
    }

    #[test]
    fn absent_keys_fall_back_to_defaults() {
        let config = make_config(json!({}));
        assert_eq!(config.str_or("operation", "strip").unwrap(), "strip");
        assert_eq!(config.int_or("turns", 5).unwrap(), 5);
        assert_eq!(config.uint_or("max_tokens", 2048).unwrap(), 2048);
        assert!((config.float_or("temperature", 0.7).unwrap() - 0.7).abs() < 1e-9);
        assert!(!config.bool_or("strict", false).unwrap());
        assert_eq!(
            config.string_list_or("traits", &["helpful"]).unwrap(),
            vec!["helpful".to_string()]
        );
    }

    #[test]
    fn present_keys_are_read_with_their_type() {
        let config = make_config(json!({
            "operation": "trim",
            "max_tokens": 500,
            "temperature": 1,
            "strict": true,
            "traits": ["curious", "blunt"],
        }));
        assert_eq!(config.str_or("operation", "strip").unwrap(), "trim");
        assert_eq!(config.uint_or("max_tokens", 2048).unwrap(), 500);
        // integers are accepted where a float is expected
        assert!((config.float_or("temperature", 0.7).unwrap() - 1.0).abs() < 1e-9);
        assert!(config.bool_or("strict", false).unwrap());
        assert_eq!(
            config.string_list_or("traits", &[]).unwrap(),
            vec!["curious".to_string(), "blunt".to_string()]
        );
    }

    #[test]
    fn wrong_types_name_the_block_and_parameter() {
        let config = make_config(json!({"min_length": "ten"}));
        let err = config.uint_or("min_length", 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid config for block 'Example': parameter 'min_length' must be a non-negative integer, got a string"
        );
    }

    #[test]
    fn negative_values_are_rejected_as_uint() {
        let config = make_config(json!({"max_tokens": -5}));
        assert!(config.uint_or("max_tokens", 2048).is_err());
    }

    #[test]
    fn mixed_arrays_are_rejected_as_string_lists() {
        let config = make_config(json!({"words": ["ok", 3]}));
        assert!(config.string_list_or("words", &[]).is_err());
    }

    #[test]
    fn required_object_reports_missing_and_mistyped() {
        let config = make_config(json!({"json_schema": "not an object"}));
        let err = config.required_object("json_schema").unwrap_err();
        assert!(err.to_string().contains("must be an object"));

        let config = make_config(json!({}));
        let err = config.required_object("json_schema").unwrap_err();
        assert!(err.to_string().contains("missing required parameter 'json_schema'"));
    }
}
