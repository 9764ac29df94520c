//! Shared types, errors, context, and trace structures for the datasmith engine.
//!
//! This crate provides the foundational types used across all other datasmith crates:
//! - `DatasmithError` — unified error taxonomy with structured detail payloads
//! - `Context` — insertion-ordered key-value state threaded through a pipeline run
//! - `TraceEntry` / `PipelineRun` — per-step execution records and the run result
//! - Data model: block/pipeline definitions, seeds, records, generation config

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Unified error type for all datasmith subsystems.
#[derive(Debug, thiserror::Error)]
pub enum DatasmithError {
    // === Pipeline construction ===
    #[error("Block type '{block_type}' not found in registry")]
    BlockNotFound {
        block_type: String,
        available_blocks: Vec<String>,
    },

    #[error("Invalid config for block '{block_type}': {message}")]
    InvalidConfig { block_type: String, message: String },

    // === Pipeline execution ===
    #[error("Block '{block_type}' returned undeclared output fields: {}", .extra_fields.join(", "))]
    OutputValidation {
        block_type: String,
        declared_outputs: Vec<String>,
        actual_outputs: Vec<String>,
        extra_fields: Vec<String>,
    },

    #[error("Block '{block_type}' failed at step {step}: {message}")]
    BlockExecution {
        block_type: String,
        step: usize,
        message: String,
        input: serde_json::Value,
    },

    #[error("Block '{block_type}' error: {message}")]
    Block { block_type: String, message: String },

    // === Collaborators ===
    #[error("Template error: {0}")]
    Template(String),

    #[error("Generation request failed: {message}")]
    Generation {
        message: String,
        status: Option<u16>,
    },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl DatasmithError {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DatasmithError::BlockNotFound { .. } => "block_not_found",
            DatasmithError::InvalidConfig { .. } => "invalid_config",
            DatasmithError::OutputValidation { .. } => "output_validation",
            DatasmithError::BlockExecution { .. } => "block_execution",
            DatasmithError::Block { .. } => "block",
            DatasmithError::Template(_) => "template",
            DatasmithError::Generation { .. } => "generation",
            DatasmithError::Io(_) => "io",
            DatasmithError::Json(_) => "json",
            DatasmithError::Other(_) => "other",
        }
    }

    /// Machine-readable detail payload for presentation layers.
    ///
    /// Carries which block failed, at which step, and the declared-vs-actual
    /// mismatch or underlying cause, so callers never have to parse the
    /// display message.
    pub fn detail(&self) -> serde_json::Value {
        match self {
            DatasmithError::BlockNotFound {
                block_type,
                available_blocks,
            } => json!({
                "block_type": block_type,
                "available_blocks": available_blocks,
            }),
            DatasmithError::InvalidConfig { block_type, .. } => json!({
                "block_type": block_type,
            }),
            DatasmithError::OutputValidation {
                block_type,
                declared_outputs,
                actual_outputs,
                extra_fields,
            } => json!({
                "block_type": block_type,
                "declared_outputs": declared_outputs,
                "actual_outputs": actual_outputs,
                "extra_fields": extra_fields,
            }),
            DatasmithError::BlockExecution {
                block_type,
                step,
                message,
                input,
            } => json!({
                "block_type": block_type,
                "step": step,
                "error": message,
                "input": input,
            }),
            DatasmithError::Block { block_type, .. } => json!({
                "block_type": block_type,
            }),
            DatasmithError::Generation { status, .. } => match status {
                Some(code) => json!({ "status": code }),
                None => json!({}),
            },
            _ => json!({}),
        }
    }

    /// Returns `true` for errors caused by the pipeline definition or block
    /// contract rather than by a failing step; these are never worth retrying.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DatasmithError::BlockNotFound { .. }
                | DatasmithError::InvalidConfig { .. }
                | DatasmithError::OutputValidation { .. }
        )
    }

    /// Serialize the full error (kind, message, detail) for API/CLI output.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "detail": self.detail(),
        })
    }
}

/// A convenience alias for `Result<T, DatasmithError>`.
pub type Result<T> = std::result::Result<T, DatasmithError>;

// ---------------------------------------------------------------------------
// Context — insertion-ordered key-value state for one pipeline run
// ---------------------------------------------------------------------------

use indexmap::IndexMap;

/// The accumulated state threaded through a pipeline run.
///
/// Keys keep their insertion order; overwriting a key keeps its original
/// position. Each run owns its context exclusively, and [`snapshot`]
/// (Context::snapshot) returns a deep copy, so trace entries never alias the
/// live state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: IndexMap<String, serde_json::Value>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            values: IndexMap::new(),
        }
    }

    /// Insert or overwrite a key.
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    /// Read a value by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Read a value as `&str` when it is a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// Convenience accessor that returns a `String`. Falls back to `default`
    /// when the key is absent or not a JSON string.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get_str(key)
            .map(String::from)
            .unwrap_or_else(|| default.to_owned())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Merge `updates` into the context, overwriting on key collision.
    /// Existing keys not present in `updates` are preserved.
    pub fn merge(&mut self, updates: Context) {
        for (key, value) in updates.values {
            self.values.insert(key, value);
        }
    }

    /// Deep copy that is fully independent of this context.
    pub fn snapshot(&self) -> Context {
        self.clone()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render the context as a JSON object value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

impl FromIterator<(String, serde_json::Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Context {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Trace — per-step execution records and the run result
// ---------------------------------------------------------------------------

/// One entry per executed block: the context snapshot fed in, the raw block
/// output, the accumulated state after merging, and the wall-clock duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub block_type: String,
    pub input: Context,
    pub output: Context,
    pub accumulated_state: Context,
    pub duration_ms: u64,
}

/// The result of one completed pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Final accumulated context after the last block merged.
    pub context: Context,
    /// One entry per executed block, in execution order.
    pub trace: Vec<TraceEntry>,
    /// Correlation identifier generated fresh for this run.
    pub run_id: String,
}

// ---------------------------------------------------------------------------
// Definitions — serializable pipeline and block wire shapes
// ---------------------------------------------------------------------------

/// One entry of a pipeline definition: which block to instantiate, and with
/// what configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDefinition {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// A named, ordered sequence of block definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub blocks: Vec<BlockDefinition>,
}

// ---------------------------------------------------------------------------
// Seeds and records — batch generation inputs and outputs
// ---------------------------------------------------------------------------

/// One batch seed: initial metadata plus how many times to run it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedInput {
    #[serde(
        default = "default_repetitions",
        deserialize_with = "lenient_repetitions"
    )]
    pub repetitions: u32,
    #[serde(default)]
    pub metadata: Context,
}

fn default_repetitions() -> u32 {
    1
}

/// Seed files are hand-written; a missing or non-integer `repetitions` value
/// means one run rather than a rejected batch. Negative values mean zero runs.
fn lenient_repetitions<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value.as_i64() {
        Some(n) if n < 0 => 0,
        Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
        None => 1,
    })
}

/// Moderation status of a generated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Accepted,
    Rejected,
    Edited,
}

/// One successful pipeline run, packaged for review or export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub output: String,
    pub metadata: Context,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TraceEntry>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Record {
    /// Create a pending record with a fresh id and current timestamps.
    pub fn new(output: impl Into<String>, metadata: Context, trace: Option<Vec<TraceEntry>>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            output: output.into(),
            metadata,
            status: RecordStatus::Pending,
            trace,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationConfig — tunables for a single generation call
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model name; `None` uses the backend's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Endpoint override; `None` uses the backend's configured endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: None,
            endpoint: None,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

impl GenerationConfig {
    /// Temperature clamped to the supported `[0, 2]` range.
    pub fn clamped_temperature(&self) -> f32 {
        self.temperature.clamp(0.0, 2.0)
    }
}
