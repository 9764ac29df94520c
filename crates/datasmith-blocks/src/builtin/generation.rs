//! Backend-driven generation blocks.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};

use datasmith_llm::GenerationBackend;
use datasmith_types::{Context, GenerationConfig, Result};

use crate::block::{Block, BlockSchema};
use crate::config::BlockConfig;
use crate::registry::BlockRegistration;
use crate::schema::{ConfigSchema, Param};
use crate::template;

fn generation_config(model: &Option<String>, temperature: f32, max_tokens: u32) -> GenerationConfig {
    GenerationConfig {
        model: model.clone(),
        endpoint: None,
        temperature,
        max_tokens: Some(max_tokens),
    }
}

// ---------------------------------------------------------------------------
// TextGenerator — free text from prompt templates
// ---------------------------------------------------------------------------

/// Generate free text from prompt templates rendered against the context.
pub struct TextGenerator {
    backend: Arc<dyn GenerationBackend>,
    model: Option<String>,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    user_prompt: String,
}

impl TextGenerator {
    pub const TYPE: &'static str = "TextGenerator";

    pub fn from_config(
        backend: Arc<dyn GenerationBackend>,
        config: &Map<String, Value>,
    ) -> Result<Self> {
        let config = BlockConfig::new(Self::TYPE, config.clone());
        let model = config.str_or("model", "")?;
        Ok(Self {
            backend,
            model: (!model.is_empty()).then_some(model),
            temperature: config.float_or("temperature", 0.7)? as f32,
            max_tokens: config.uint_or("max_tokens", 2048)?,
            system_prompt: config.str_or("system_prompt", "")?,
            user_prompt: config.str_or("user_prompt", "")?,
        })
    }

    pub fn registration(backend: Arc<dyn GenerationBackend>) -> BlockRegistration {
        BlockRegistration::new(
            BlockSchema {
                block_type: Self::TYPE.to_string(),
                name: "Text Generator".to_string(),
                description: "Generate text from prompt templates rendered against the context"
                    .to_string(),
                inputs: vec![],
                outputs: vec!["assistant".to_string(), "system".to_string(), "user".to_string()],
                config_schema: Self::config_schema().to_value(),
                algorithm: None,
                paper: None,
            },
            move |config| Ok(Box::new(Self::from_config(backend.clone(), config)?)),
        )
    }

    fn config_schema() -> ConfigSchema {
        ConfigSchema::new()
            .param(
                Param::string("model")
                    .default("")
                    .describe("Model name; empty uses the backend default"),
            )
            .param(Param::number("temperature").default(0.7))
            .param(Param::integer("max_tokens").default(2048))
            .param(Param::string("system_prompt").default(""))
            .param(Param::string("user_prompt").default(""))
    }
}

#[async_trait]
impl Block for TextGenerator {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn outputs(&self) -> &[&str] {
        &["assistant", "system", "user"]
    }

    async fn execute(&self, context: &Context) -> Result<Context> {
        // config prompts win; empty ones fall back to prompts carried in the context
        let system_template = if self.system_prompt.is_empty() {
            context.get_string("system", "")
        } else {
            self.system_prompt.clone()
        };
        let user_template = if self.user_prompt.is_empty() {
            context.get_string("user", "")
        } else {
            self.user_prompt.clone()
        };

        let system = template::render(&system_template, context)?;
        let user = template::render(&user_template, context)?;
        let assistant = self
            .backend
            .generate(&system, &user, &generation_config(&self.model, self.temperature, self.max_tokens))
            .await?;

        let mut output = Context::new();
        output.insert("assistant", Value::String(assistant));
        output.insert("system", Value::String(system));
        output.insert("user", Value::String(user));
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// StructuredGenerator — JSON conforming to a caller-supplied schema
// ---------------------------------------------------------------------------

/// Generate a JSON value conforming to a configured JSON schema.
pub struct StructuredGenerator {
    backend: Arc<dyn GenerationBackend>,
    json_schema: Map<String, Value>,
    model: Option<String>,
    temperature: f32,
    max_tokens: u32,
    prompt: String,
    fence: Regex,
}

impl std::fmt::Debug for StructuredGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredGenerator")
            .field("json_schema", &self.json_schema)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl StructuredGenerator {
    pub const TYPE: &'static str = "StructuredGenerator";

    pub fn from_config(
        backend: Arc<dyn GenerationBackend>,
        config: &Map<String, Value>,
    ) -> Result<Self> {
        let config = BlockConfig::new(Self::TYPE, config.clone());
        let model = config.str_or("model", "")?;
        Ok(Self {
            backend,
            json_schema: config.required_object("json_schema")?,
            model: (!model.is_empty()).then_some(model),
            temperature: config.float_or("temperature", 0.7)? as f32,
            max_tokens: config.uint_or("max_tokens", 2048)?,
            prompt: config.str_or("prompt", "")?,
            fence: Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").unwrap(),
        })
    }

    pub fn registration(backend: Arc<dyn GenerationBackend>) -> BlockRegistration {
        BlockRegistration::new(
            BlockSchema {
                block_type: Self::TYPE.to_string(),
                name: "Structured Generator".to_string(),
                description: "Generate JSON conforming to a configured schema".to_string(),
                inputs: vec![],
                outputs: vec!["generated".to_string()],
                config_schema: Self::config_schema().to_value(),
                algorithm: None,
                paper: None,
            },
            move |config| Ok(Box::new(Self::from_config(backend.clone(), config)?)),
        )
    }

    fn config_schema() -> ConfigSchema {
        ConfigSchema::new()
            .param(
                Param::object("json_schema")
                    .describe("JSON schema the generated value must conform to"),
            )
            .param(Param::string("model").default(""))
            .param(Param::number("temperature").default(0.7))
            .param(Param::integer("max_tokens").default(2048))
            .param(
                Param::string("prompt")
                    .default("")
                    .describe("Prompt template; empty falls back to the context's 'prompt' field"),
            )
    }

    /// Best-effort extraction: direct parse, then code-fence contents, else
    /// the raw reply wrapped for inspection.
    fn parse_reply(&self, content: &str) -> Value {
        let trimmed = content.trim();
        if let Ok(value) = serde_json::from_str(trimmed) {
            return value;
        }
        if let Some(captures) = self.fence.captures(trimmed) {
            if let Ok(value) = serde_json::from_str(captures[1].trim()) {
                return value;
            }
        }
        json!({ "raw_response": content })
    }
}

#[async_trait]
impl Block for StructuredGenerator {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn outputs(&self) -> &[&str] {
        &["generated"]
    }

    async fn execute(&self, context: &Context) -> Result<Context> {
        let user_template = if self.prompt.is_empty() {
            context.get_string("prompt", "Generate data according to schema")
        } else {
            self.prompt.clone()
        };
        let user = template::render(&user_template, context)?;

        let schema_text = serde_json::to_string_pretty(&self.json_schema)?;
        let system = format!(
            "You are a structured data generator. Respond with a single JSON value that \
             conforms to this JSON schema, with no surrounding prose:\n{schema_text}"
        );

        let content = self
            .backend
            .generate(&system, &user, &generation_config(&self.model, self.temperature, self.max_tokens))
            .await?;

        let mut output = Context::new();
        output.insert("generated", self.parse_reply(&content));
        Ok(output)
    }
}
