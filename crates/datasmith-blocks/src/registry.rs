//! Block registry: the factory map from type name to implementation.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use datasmith_llm::GenerationBackend;
use datasmith_types::{DatasmithError, Result};

use crate::block::{Block, BlockSchema};

/// Builds a configured block instance from its raw config map.
pub type BlockFactory = Box<dyn Fn(&Map<String, Value>) -> Result<Box<dyn Block>> + Send + Sync>;

/// One registrable block type: its introspection schema plus a factory.
pub struct BlockRegistration {
    schema: BlockSchema,
    factory: BlockFactory,
}

impl BlockRegistration {
    pub fn new(
        schema: BlockSchema,
        factory: impl Fn(&Map<String, Value>) -> Result<Box<dyn Block>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            schema,
            factory: Box::new(factory),
        }
    }

    pub fn schema(&self) -> &BlockSchema {
        &self.schema
    }
}

/// Registry of every block type a pipeline may reference.
///
/// Built once at startup and read-only afterwards; registration order is
/// preserved for listings.
pub struct BlockRegistry {
    blocks: IndexMap<String, BlockRegistration>,
}

impl BlockRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            blocks: IndexMap::new(),
        }
    }

    /// Registry with the full built-in roster wired to `backend`.
    pub fn builtin(backend: Arc<dyn GenerationBackend>) -> Self {
        let mut registry = Self::new();
        crate::builtin::register_builtins(&mut registry, backend);
        registry
    }

    /// Register a block type. A repeated type name replaces the earlier
    /// registration and logs a warning.
    pub fn register(&mut self, registration: BlockRegistration) {
        let block_type = registration.schema.block_type.clone();
        if self.blocks.insert(block_type.clone(), registration).is_some() {
            warn!(block_type = %block_type, "replacing existing block registration");
        } else {
            debug!(block_type = %block_type, "registered block");
        }
    }

    /// Register externally loaded candidates, skipping any that failed to
    /// load. Returns how many registered.
    pub fn register_plugins(&mut self, candidates: Vec<Result<BlockRegistration>>) -> usize {
        let mut registered = 0;
        for candidate in candidates {
            match candidate {
                Ok(registration) => {
                    self.register(registration);
                    registered += 1;
                }
                Err(error) => warn!(error = %error, "skipping block that failed to load"),
            }
        }
        registered
    }

    pub fn get(&self, block_type: &str) -> Option<&BlockRegistration> {
        self.blocks.get(block_type)
    }

    pub fn contains(&self, block_type: &str) -> bool {
        self.blocks.contains_key(block_type)
    }

    /// Registered type names in registration order.
    pub fn type_names(&self) -> Vec<String> {
        self.blocks.keys().cloned().collect()
    }

    /// Introspection schemas in registration order.
    pub fn list_blocks(&self) -> Vec<BlockSchema> {
        self.blocks.values().map(|r| r.schema.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Instantiate `block_type` with `config`. Unknown types report the
    /// available roster; the config is checked against the schema before the
    /// factory runs.
    pub fn create(&self, block_type: &str, config: &Map<String, Value>) -> Result<Box<dyn Block>> {
        let registration =
            self.blocks
                .get(block_type)
                .ok_or_else(|| DatasmithError::BlockNotFound {
                    block_type: block_type.to_string(),
                    available_blocks: self.type_names(),
                })?;
        registration.schema.check_config(config)?;
        (registration.factory)(config)
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
