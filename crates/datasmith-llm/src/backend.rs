use async_trait::async_trait;
use datasmith_types::{GenerationConfig, Result};

// ---------------------------------------------------------------------------
// GenerationBackend
// ---------------------------------------------------------------------------

/// A text-generation service the generation blocks call into.
///
/// One backend instance is shared across all blocks of a registry behind
/// `Arc<dyn GenerationBackend>`, so implementations must be safe for
/// concurrent calls and keep no per-request state.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a completion for a system/user prompt pair.
    async fn generate(
        &self,
        system: &str,
        user: &str,
        config: &GenerationConfig,
    ) -> Result<String>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
