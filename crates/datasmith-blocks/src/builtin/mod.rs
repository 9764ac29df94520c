//! Built-in block roster.
//!
//! Five families: generation (backend-driven text and structured output),
//! validation (rule and JSON checks), transform (text operations and output
//! formatting), scoring (coherence, diversity, ROUGE), and research
//! (paper-grounded conversation synthesis).

mod generation;
mod research;
mod scoring;
mod transform;
mod validation;

pub use generation::{StructuredGenerator, TextGenerator};
pub use research::{BackTranslation, DialogueGenerator, PersonaGenerator};
pub use scoring::{CoherenceScore, DiversityScore, RougeScore};
pub use transform::{FormatterBlock, TransformerBlock};
pub use validation::{JsonValidator, ValidatorBlock};

use std::sync::Arc;

use datasmith_llm::GenerationBackend;

use crate::registry::BlockRegistry;

/// Register every built-in block into `registry`, wiring the blocks that
/// generate text to the shared backend.
pub fn register_builtins(registry: &mut BlockRegistry, backend: Arc<dyn GenerationBackend>) {
    registry.register(TextGenerator::registration(backend.clone()));
    registry.register(StructuredGenerator::registration(backend.clone()));
    registry.register(ValidatorBlock::registration());
    registry.register(JsonValidator::registration());
    registry.register(TransformerBlock::registration());
    registry.register(FormatterBlock::registration());
    registry.register(CoherenceScore::registration());
    registry.register(DiversityScore::registration());
    registry.register(RougeScore::registration());
    registry.register(BackTranslation::registration(backend.clone()));
    registry.register(PersonaGenerator::registration(backend.clone()));
    registry.register(DialogueGenerator::registration(backend));
}
