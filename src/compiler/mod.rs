//! # LR Compiler - Resource Definitions to Rust Bindings
//!
//! Turns an LR file into a typed schema and generated Rust bindings.
//!
//! ## Architecture
//!
//! ```text
//! LR Source → Tokens → AST → Resolve Imports → Schema → Rust Bindings
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use lr::compiler::{CompileOptions, Compiler};
//!
//! let compiler = Compiler::new(CompileOptions::default());
//! let output = compiler.compile_file("os.lr")?;
//! std::fs::write("os.rs", output.code)?;
//! std::fs::write("os.lr.json", output.schema.to_json()?)?;
//! ```

pub mod codegen;
pub mod resolver;
pub mod schema;

pub use codegen::generate;
pub use resolver::{resolve, resolve_file, resolve_imports, DEFAULT_PACKAGE_OPTION};
pub use schema::{build_schema, FieldInfo, InitArg, InitInfo, ResourceInfo, Schema};

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::parser::{self, Lr};

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Option an imported file must set to name the module of its bindings
    pub package_option: String,
    /// Crate path the generated code imports the runtime from
    pub runtime_crate: String,
    /// Embed the schema JSON into the generated code
    pub embed_schema: bool,
    /// First line of the generated code
    pub header: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            package_option: DEFAULT_PACKAGE_OPTION.to_string(),
            runtime_crate: "lr".to_string(),
            embed_schema: true,
            header: "// Code generated by lr. DO NOT EDIT.".to_string(),
        }
    }
}

/// Compilation result
#[derive(Debug)]
pub struct CompileOutput {
    /// Resolved AST (imports absorbed into packs)
    pub lr: Lr,
    /// Schema of every resource in the file
    pub schema: Schema,
    /// Generated Rust bindings
    pub code: String,
    /// SHA-256 of the schema JSON
    pub digest: String,
}

/// LR to Rust compiler
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Compiler options
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile the LR file at `path`, reading it and its imports from disk
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<CompileOutput> {
        self.compile_with(path.as_ref(), |p| std::fs::read_to_string(p))
    }

    /// Compile the LR file at `path`, reading it and its imports with `read_file`
    pub fn compile_with<F>(&self, path: &Path, read_file: F) -> Result<CompileOutput>
    where
        F: Fn(&Path) -> std::io::Result<String>,
    {
        let lr = resolve(path, read_file, &self.options.package_option)?;
        self.finish(lr, &path.display().to_string())
    }

    /// Compile LR source without imports
    ///
    /// Sources that import other files must be compiled with
    /// [`Compiler::compile_with`] so the imports can be read.
    pub fn compile_source(&self, source: &str, file: Option<&str>) -> Result<CompileOutput> {
        let file = file.unwrap_or("<input>");
        let mut lr = parser::parse_named(source, file)?;
        resolve_imports(
            &mut lr,
            Path::new(""),
            |p| {
                Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("cannot read {} when compiling from source", p.display()),
                ))
            },
            &self.options.package_option,
        )?;
        self.finish(lr, file)
    }

    fn finish(&self, lr: Lr, file: &str) -> Result<CompileOutput> {
        let schema = build_schema(&lr)?;
        let code = generate(&lr, &self.options)?;
        let digest = schema.digest()?;
        debug!(
            file,
            resources = schema.resources.len(),
            packs = lr.packs.len(),
            digest = %digest,
            "compiled LR file"
        );
        Ok(CompileOutput {
            lr,
            schema,
            code,
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn test_compile_source() {
        let compiler = Compiler::new(CompileOptions::default());
        let output = compiler
            .compile_source("file {\n  path string\n  size() int\n}", None)
            .unwrap();
        assert!(output.schema.resource("file").is_some());
        assert!(output.code.contains("pub struct File(pub Arc<Resource>);"));
        assert_eq!(output.digest.len(), 64);
    }

    #[test]
    fn test_compile_source_rejects_imports() {
        let compiler = Compiler::new(CompileOptions::default());
        let err = compiler
            .compile_source("import \"core.lr\"\nfile", None)
            .unwrap_err();
        assert!(matches!(err, Error::ImportError { ref path, .. } if path == "core.lr"));
    }

    #[test]
    fn test_compile_with_custom_options() {
        let files: HashMap<PathBuf, String> = [
            (
                PathBuf::from("defs/os.lr"),
                "import \"core.lr\"\nfile {\n  owner() core.user\n}".to_string(),
            ),
            (
                PathBuf::from("defs/core.lr"),
                "option rust_module = \"crate::core\"\nuser {\n  name string\n}".to_string(),
            ),
        ]
        .into_iter()
        .collect();

        let compiler = Compiler::new(CompileOptions {
            package_option: "rust_module".to_string(),
            runtime_crate: "::lr".to_string(),
            embed_schema: false,
            ..Default::default()
        });
        let output = compiler
            .compile_with(Path::new("defs/os.lr"), |p| {
                files
                    .get(p)
                    .cloned()
                    .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
            })
            .unwrap();

        assert!(output.lr.imports.is_empty());
        assert!(output.code.contains("use crate::core as core;"));
        assert!(output.code.contains("use ::lr::Result;"));
        assert!(!output.code.contains("SCHEMA_JSON"));
    }
}
