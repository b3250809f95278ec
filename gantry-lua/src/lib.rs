//! Gantry Lua
//!
//! Pipeline documents for the Gantry CI/CD engine are written in Lua. This
//! crate provides:
//! - A restricted sandbox for evaluating documents
//! - The parser turning a document into a `PipelineDefinition`
//! - `PipelineSource` implementations backed by files or strings

pub mod parser;
pub mod sandbox;
pub mod source;

pub use parser::{parse_pipeline_definition, validate_definition};
pub use sandbox::create_sandbox;
pub use source::{LuaFileSource, LuaSource};
