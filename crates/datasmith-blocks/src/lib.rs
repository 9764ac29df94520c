//! Block contract, configuration schemas, and the built-in block roster.
//!
//! A block is the unit of pipeline work: it declares the context fields it
//! writes, describes its configuration as a JSON-Schema-shaped object, and
//! executes asynchronously against the accumulated context. `BlockRegistry`
//! maps type names to factories; `BlockRegistry::builtin` wires the full
//! roster of twelve built-ins to a shared generation backend.

pub mod block;
pub mod builtin;
pub mod config;
pub mod metrics;
pub mod registry;
pub mod schema;
pub mod template;

pub use block::{Block, BlockSchema, WILDCARD};
pub use config::BlockConfig;
pub use registry::{BlockFactory, BlockRegistration, BlockRegistry};
pub use schema::{ConfigSchema, Param, ParamType};
pub use template::render;
