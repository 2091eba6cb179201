//! Chartwright Engine - Go-style templating for charts
//!
//! This crate provides the template engine with:
//! - A pest grammar for `{{ }}` actions, trim markers applied at parse time
//! - Built-in functions resolved and arity-checked while parsing
//! - Immutable scopes for `.`, `$` and `$name`
//! - Named templates with parent-chart fallback
//! - Sequential or parallel chart rendering, all-or-nothing
//! - Human-readable error messages with suggestions

pub mod assembler;
pub mod ast;
pub mod engine;
pub mod error;
mod eval;
pub mod functions;
pub mod parser;
pub mod registry;
pub mod renderer;
pub mod scope;
pub mod suggestions;

pub use assembler::RenderedDocument;
pub use engine::{DEFAULT_MAX_INCLUDE_DEPTH, Engine, EngineBuilder, RenderedChart};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use functions::Builtin;
pub use registry::TemplateRegistry;
