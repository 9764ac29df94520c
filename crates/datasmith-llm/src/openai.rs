use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::GenerationBackend;
use datasmith_types::{DatasmithError, GenerationConfig, Result};

/// Default endpoint: a local Ollama server's OpenAI-compatible route.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/v1/chat/completions";

const DEFAULT_MODEL: &str = "llama3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// OpenAiBackend
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat-completions client.
///
/// Speaks the `POST {endpoint}` chat format with a system/user message pair,
/// which works against Ollama, OpenAI, vLLM, and any other compatible server.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    default_model: String,
}

impl OpenAiBackend {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
        }
    }

    /// Build from `LLM_ENDPOINT`, `LLM_API_KEY`, and `LLM_MODEL`. Every
    /// variable has a default, so this never fails.
    pub fn from_env() -> Self {
        let endpoint =
            std::env::var("LLM_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let api_key = std::env::var("LLM_API_KEY").unwrap_or_default();
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(endpoint, api_key, model)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn build_request_body(
        &self,
        system: &str,
        user: &str,
        config: &GenerationConfig,
    ) -> serde_json::Value {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": config.clamped_temperature(),
        });

        if let Some(max_tokens) = config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        body
    }

    fn parse_response(&self, body: serde_json::Value) -> Result<String> {
        match body["choices"][0]["message"]["content"].as_str() {
            Some(content) => Ok(content.to_string()),
            None => Err(DatasmithError::Generation {
                message: format!("unexpected response format: {body}"),
                status: None,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: u16, body: &str) -> DatasmithError {
    DatasmithError::Generation {
        message: format!("HTTP {status}: {}", extract_error_message(body)),
        status: Some(status),
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| {
            let mut snippet = body.to_string();
            if snippet.len() > 200 {
                snippet.truncate(200);
            }
            snippet
        })
}

// ---------------------------------------------------------------------------
// GenerationBackend implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        config: &GenerationConfig,
    ) -> Result<String> {
        let endpoint = config.endpoint.as_deref().unwrap_or(&self.endpoint);
        let body = self.build_request_body(system, user, config);

        tracing::debug!(endpoint, model = %body["model"], "sending generation request");

        let mut request = self
            .client
            .post(endpoint)
            .timeout(REQUEST_TIMEOUT)
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request.send().await.map_err(|e| DatasmithError::Generation {
            message: e.to_string(),
            status: None,
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| DatasmithError::Generation {
            message: e.to_string(),
            status: Some(status.as_u16()),
        })?;

        if !status.is_success() {
            return Err(map_error(status.as_u16(), &text));
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| DatasmithError::Generation {
                message: format!("failed to parse response JSON: {e}"),
                status: Some(status.as_u16()),
            })?;

        self.parse_response(parsed)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_backend() -> OpenAiBackend {
        OpenAiBackend::new("http://localhost:9999/v1/chat/completions", "", "llama3")
    }

    #[test]
    fn build_request_body_produces_chat_payload() {
        let backend = make_backend();
        let config = GenerationConfig {
            model: Some("mistral".into()),
            max_tokens: Some(512),
            ..Default::default()
        };
        let body = backend.build_request_body("You are helpful.", "Hello", &config);

        assert_eq!(body["model"], "mistral");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You are helpful.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Hello");
        assert_eq!(body["max_tokens"], 512);
        let temp = body["temperature"].as_f64().unwrap();
        assert!((temp - 0.7).abs() < 0.01);
    }

    #[test]
    fn build_request_body_uses_default_model_when_unset() {
        let backend = make_backend();
        let body = backend.build_request_body("s", "u", &GenerationConfig::default());
        assert_eq!(body["model"], "llama3");
        assert!(body.get("max_tokens").is_none() || body["max_tokens"].is_null());
    }

    #[test]
    fn build_request_body_clamps_out_of_range_temperature() {
        let backend = make_backend();
        let config = GenerationConfig {
            temperature: 5.0,
            ..Default::default()
        };
        let body = backend.build_request_body("s", "u", &config);
        let temp = body["temperature"].as_f64().unwrap();
        assert!((temp - 2.0).abs() < 0.01);
    }

    #[test]
    fn parse_response_extracts_content() {
        let backend = make_backend();
        let body = json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Generated text" } }
            ]
        });
        assert_eq!(backend.parse_response(body).unwrap(), "Generated text");
    }

    #[test]
    fn parse_response_rejects_missing_choices() {
        let backend = make_backend();
        let err = backend.parse_response(json!({"unexpected": true})).unwrap_err();
        assert!(err.to_string().contains("unexpected response format"));
        assert!(matches!(err, DatasmithError::Generation { status: None, .. }));
    }

    #[test]
    fn parse_response_rejects_non_string_content() {
        let backend = make_backend();
        let body = json!({ "choices": [ { "message": { "content": 42 } } ] });
        assert!(backend.parse_response(body).is_err());
    }

    #[test]
    fn map_error_prefers_structured_message() {
        let err = map_error(500, r#"{"error": {"message": "server exploded"}}"#);
        assert!(err.to_string().contains("HTTP 500"));
        assert!(err.to_string().contains("server exploded"));
        assert_eq!(err.detail()["status"], 500);
    }

    #[test]
    fn map_error_falls_back_to_raw_body() {
        let err = map_error(404, "not found");
        assert!(err.to_string().contains("HTTP 404: not found"));
    }

    // from_env tests share process environment, so both cases run in one test.
    #[test]
    fn from_env_reads_variables_and_falls_back_to_defaults() {
        std::env::set_var("LLM_ENDPOINT", "http://example.test/v1/chat/completions");
        std::env::set_var("LLM_API_KEY", "sk-test");
        std::env::set_var("LLM_MODEL", "qwen2");
        let backend = OpenAiBackend::from_env();
        assert_eq!(backend.endpoint, "http://example.test/v1/chat/completions");
        assert_eq!(backend.api_key, "sk-test");
        assert_eq!(backend.default_model(), "qwen2");

        std::env::remove_var("LLM_ENDPOINT");
        std::env::remove_var("LLM_API_KEY");
        std::env::remove_var("LLM_MODEL");
        let backend = OpenAiBackend::from_env();
        assert_eq!(backend.endpoint, DEFAULT_ENDPOINT);
        assert!(backend.api_key.is_empty());
        assert_eq!(backend.default_model(), "llama3");
    }

    #[test]
    fn builder_methods_override_fields() {
        let backend = make_backend()
            .with_endpoint("http://other/v1/chat/completions")
            .with_api_key("sk-abc")
            .with_model("phi3");
        assert_eq!(backend.endpoint, "http://other/v1/chat/completions");
        assert_eq!(backend.api_key, "sk-abc");
        assert_eq!(backend.default_model(), "phi3");
    }
}
