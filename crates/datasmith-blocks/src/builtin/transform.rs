//! Text transformation and output formatting blocks.

use async_trait::async_trait;
use serde_json::{Map, Value};

use datasmith_types::{Context, DatasmithError, Result};

use crate::block::{Block, BlockSchema};
use crate::config::BlockConfig;
use crate::registry::BlockRegistration;
use crate::schema::{ConfigSchema, Param};
use crate::template;

// ---------------------------------------------------------------------------
// TransformerBlock — case and whitespace operations
// ---------------------------------------------------------------------------

/// Apply a text operation to the `text` field.
pub struct TransformerBlock {
    operation: String,
}

impl TransformerBlock {
    pub const TYPE: &'static str = "TransformerBlock";

    pub fn from_config(config: &Map<String, Value>) -> Result<Self> {
        let config = BlockConfig::new(Self::TYPE, config.clone());
        Ok(Self {
            operation: config.str_or("operation", "strip")?,
        })
    }

    pub fn registration() -> BlockRegistration {
        BlockRegistration::new(
            BlockSchema {
                block_type: Self::TYPE.to_string(),
                name: "Transformer".to_string(),
                description: "Transform the text field with a case or whitespace operation"
                    .to_string(),
                inputs: vec!["text".to_string()],
                outputs: vec!["text".to_string()],
                config_schema: Self::config_schema().to_value(),
                algorithm: None,
                paper: None,
            },
            |config| Ok(Box::new(Self::from_config(config)?)),
        )
    }

    fn config_schema() -> ConfigSchema {
        ConfigSchema::new().param(
            Param::string("operation")
                .default("strip")
                .choices(&["lowercase", "uppercase", "strip", "trim"]),
        )
    }
}

#[async_trait]
impl Block for TransformerBlock {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn outputs(&self) -> &[&str] {
        &["text"]
    }

    async fn execute(&self, context: &Context) -> Result<Context> {
        let text = context.get_string("text", "");
        let transformed = match self.operation.as_str() {
            "lowercase" => text.to_lowercase(),
            "uppercase" => text.to_uppercase(),
            "strip" => text.trim().to_string(),
            // collapse internal whitespace runs to single spaces
            "trim" => text.split_whitespace().collect::<Vec<_>>().join(" "),
            _ => text,
        };

        let mut output = Context::new();
        output.insert("text", Value::String(transformed));
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// FormatterBlock — final output string from a template
// ---------------------------------------------------------------------------

/// Render the pipeline's output string from a template.
pub struct FormatterBlock {
    format_template: String,
}

impl FormatterBlock {
    pub const TYPE: &'static str = "FormatterBlock";

    pub fn from_config(config: &Map<String, Value>) -> Result<Self> {
        let config = BlockConfig::new(Self::TYPE, config.clone());
        Ok(Self {
            format_template: config.str_or("format_template", "Result: {{ assistant }}")?,
        })
    }

    pub fn registration() -> BlockRegistration {
        BlockRegistration::new(
            BlockSchema {
                block_type: Self::TYPE.to_string(),
                name: "Output Formatter".to_string(),
                description: "Render the final output string from a template".to_string(),
                inputs: vec!["assistant".to_string()],
                outputs: vec!["pipeline_output".to_string()],
                config_schema: Self::config_schema().to_value(),
                algorithm: None,
                paper: None,
            },
            |config| Ok(Box::new(Self::from_config(config)?)),
        )
    }

    fn config_schema() -> ConfigSchema {
        ConfigSchema::new()
            .param(Param::string("format_template").default("Result: {{ assistant }}"))
    }
}

#[async_trait]
impl Block for FormatterBlock {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn outputs(&self) -> &[&str] {
        &["pipeline_output"]
    }

    async fn execute(&self, context: &Context) -> Result<Context> {
        // render failures become the output string instead of failing the run
        let formatted = match template::render(&self.format_template, context) {
            Ok(text) => text,
            Err(DatasmithError::Template(message)) => format!("Formatting error: {message}"),
            Err(error) => format!("Formatting error: {error}"),
        };

        let mut output = Context::new();
        output.insert("pipeline_output", Value::String(formatted));
        Ok(output)
    }
}
