//! Block trait and the introspection schema served to pipeline editors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use datasmith_types::{Context, DatasmithError, Result};

/// Wildcard entry for input/output declarations. In an output list it opts
/// the block out of output validation; in an input list it declares that the
/// block may read any field.
pub const WILDCARD: &str = "*";

/// A unit of pipeline work.
///
/// Implementations are built by a registry factory from their raw config
/// map, then executed once per pipeline step. `execute` receives the
/// accumulated context read-only and returns only the fields it produced;
/// the engine merges those back and checks them against `outputs()` unless
/// that list contains [`WILDCARD`].
#[async_trait]
pub trait Block: Send + Sync {
    /// Stable type name; matches the registry key for built-ins.
    fn type_name(&self) -> &str;

    /// Context fields this block writes.
    fn outputs(&self) -> &[&str];

    /// Run the block against the accumulated context.
    async fn execute(&self, context: &Context) -> Result<Context>;
}

impl std::fmt::Debug for dyn Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("type_name", &self.type_name())
            .finish_non_exhaustive()
    }
}

/// Introspection record for one registered block type: the registry key,
/// display metadata, declared fields, and the rendered config schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSchema {
    #[serde(rename = "type")]
    pub block_type: String,
    pub name: String,
    pub description: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub config_schema: Value,
    /// Algorithm identifier, present on research-grounded blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Citation for the paper the algorithm comes from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper: Option<String>,
}

impl BlockSchema {
    /// Check a raw config map against this schema without instantiating the
    /// block: every required parameter must be present. Unknown keys are
    /// tolerated so configs can carry annotations.
    pub fn check_config(&self, config: &Map<String, Value>) -> Result<()> {
        let required = self.config_schema.get("required").and_then(Value::as_array);
        for name in required.into_iter().flatten().filter_map(Value::as_str) {
            if !config.contains_key(name) {
                return Err(DatasmithError::InvalidConfig {
                    block_type: self.block_type.clone(),
                    message: format!("missing required parameter '{name}'"),
                });
            }
        }
        Ok(())
    }
}
