//! # LR - Resource Definitions and a Lazy Field Runtime
//!
//! Resources (files, processes, cloud buckets, cluster objects) are
//! described once in a small declarative language, LR. The compiler turns
//! that description into a typed schema and generated Rust bindings; the
//! runtime evaluates resource fields on demand, caches them, and recomputes
//! fields whose dependencies arrive later.
//!
//! ## Quick Start
//!
//! ```rust
//! use lr::compiler::build_schema;
//! use lr::runtime::{Args, Registry, Runtime, Value};
//!
//! # fn main() -> lr::Result<()> {
//! let source = r#"
//! // File on disk
//! file {
//!   init(path string)
//!   path string
//!   basename(path) string
//! }
//! "#;
//!
//! // Parse and build the schema
//! let lr = lr::parser::parse(source)?;
//! let schema = build_schema(&lr)?;
//!
//! // Bind the computed field
//! let mut registry = Registry::from_schema(&schema);
//! registry.kind_mut("file")?.bind("basename", |_, deps| {
//!     let path = deps[0].get::<String>().unwrap_or_default();
//!     let name = path.rsplit('/').next().unwrap_or_default().to_string();
//!     Ok(Value::String(name))
//! })?;
//!
//! // Create an instance and read the field
//! let runtime = Runtime::new(registry);
//! let mut args = Args::new();
//! args.insert("path".to_string(), Value::from("/etc/hosts"));
//! let file = runtime.create_resource("file", args)?;
//!
//! assert_eq!(runtime.resolve(&file, "basename")?, Value::from("hosts"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`lexer`] / [`parser`]: LR source to AST
//! - [`compiler`]: import resolution, schema building, Rust code generation
//! - [`runtime`]: resource instances, field cache, watch graph
//! - [`types`]: semantic types of LR fields

/// Version of the LR compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod types;

// Generated bindings name `lr::chrono` for time fields
pub use chrono;

// Re-export main types
pub use compiler::{CompileOptions, CompileOutput, Compiler, Schema};
pub use error::{Error, ErrorSeverity, Result};
pub use lexer::{LrScanner, Token, TokenKind};
pub use parser::{Lr, LrParser};
pub use runtime::{Registry, Resource, Runtime, RuntimeConfig, Value};
pub use types::Type;
