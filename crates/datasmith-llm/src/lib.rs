//! Generation backend for datasmith blocks.
//!
//! Provides the `GenerationBackend` trait that generation blocks call into,
//! and `OpenAiBackend`, an OpenAI-compatible chat-completions client that
//! works with Ollama, OpenAI, vLLM, and other compatible servers.

mod backend;
mod openai;

pub use backend::GenerationBackend;
pub use openai::{OpenAiBackend, DEFAULT_ENDPOINT};
