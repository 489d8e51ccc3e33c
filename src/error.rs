//! Error types for the LR compiler and field runtime

use thiserror::Error;

/// LR compiler and runtime errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Parse errors
    /// Syntax error encountered while scanning or parsing LR source
    ///
    /// **Triggered by:** Malformed LR source (unterminated string, missing `}`)
    /// **Example:** `file { init(path string }`
    #[error("{file}:{line}:{col}: syntax error: {message}")]
    SyntaxError {
        /// File the source came from (`<input>` for in-memory sources)
        file: String,
        /// Line number where error occurred
        line: usize,
        /// Column number where error occurred
        col: usize,
        /// Error description
        message: String,
    },

    // Import errors
    /// An imported LR file could not be read or parsed
    #[error("failed to import {path}: {reason}")]
    ImportError {
        /// Path of the offending import
        path: String,
        /// Failure reason
        reason: String,
    },

    /// An imported LR file does not declare where its bindings live
    ///
    /// **Triggered by:** `import "core.lr"` where `core.lr` has no `option go_package = "..."`
    #[error("missing {option} option for {path}")]
    MissingPackageOption {
        /// Path of the offending import
        path: String,
        /// Name of the required option
        option: String,
    },

    // Schema errors
    /// Semantic violation found while building the schema
    ///
    /// **Triggered by:** unresolved field types, duplicate `init`, init/field
    /// type mismatch, a required init argument after an optional one
    #[error("resource '{resource}'{}: {message}", field.as_ref().map(|f| format!(" field '{}'", f)).unwrap_or_default())]
    SemanticError {
        /// Resource in which the violation was found
        resource: String,
        /// Field in which the violation was found, if any
        field: Option<String>,
        /// Error description
        message: String,
    },

    /// Fields depend on each other in a loop
    #[error("dependency cycle detected involving: {}", members.join(", "))]
    DependencyCycle {
        /// `resource.field` members of the cycle, sorted
        members: Vec<String>,
    },

    // Runtime errors
    /// No resource kind with that name is registered
    #[error("cannot find resource '{name}'")]
    UnknownResource {
        /// Requested resource kind
        name: String,
    },

    /// A field name unknown to the resource was requested
    #[error("cannot find field '{field}' in \"{resource}\" resource")]
    UnknownField {
        /// Resource kind
        resource: String,
        /// Requested field
        field: String,
    },

    /// A constructor argument does not name a declared field
    ///
    /// **Triggered by:** `create_resource("file", [("nope", ...)])`
    #[error("failed to initialize \"{resource}\": unknown argument {name}")]
    UnknownArgument {
        /// Resource kind
        resource: String,
        /// Offending argument
        name: String,
    },

    /// A constructor argument has a value of the wrong type
    #[error("failed to initialize \"{resource}\": wrong type for {name} (expected {expected}, got {got})")]
    WrongArgumentType {
        /// Resource kind
        resource: String,
        /// Offending argument
        name: String,
        /// Declared type
        expected: String,
        /// Type of the supplied value
        got: String,
    },

    /// A static field was not supplied at construction
    #[error("initialized \"{resource}\" resource without a \"{field}\". This field is required.")]
    MissingField {
        /// Resource kind
        resource: String,
        /// Missing static field
        field: String,
    },

    /// A static field was read but never populated
    #[error("\"{resource}\" failed: no value provided for static field \"{field}\"")]
    MissingStaticValue {
        /// Resource kind
        resource: String,
        /// Static field
        field: String,
    },

    /// Dependencies of a field are not resolved yet; retry later
    #[error("NotReady")]
    NotReady,

    /// A cached value does not match the declared field type
    #[error("\"{resource}\" failed to cast field \"{field}\" to the right type ({expected}): got {got}")]
    Cast {
        /// Resource kind
        resource: String,
        /// Field being read
        field: String,
        /// Declared type
        expected: String,
        /// Type found in the cache
        got: String,
    },

    /// A computed field has no logic bound to it
    #[error("no implementation bound for field \"{field}\" in \"{resource}\" resource")]
    NotImplemented {
        /// Resource kind
        resource: String,
        /// Computed field
        field: String,
    },

    /// No instance matches a lookup
    #[error("resource not found: {name} (id: {id})")]
    ResourceNotFound {
        /// Resource kind
        name: String,
        /// Requested id
        id: String,
    },

    // External errors
    /// File system failure
    #[error("I/O error on {path}: {message}")]
    Io {
        /// Path being accessed
        path: String,
        /// Error message
        message: String,
    },

    /// Schema (de)serialization failure
    #[error("JSON error: {0}")]
    Json(String),

    /// General runtime error, usually raised by provider logic
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that aborts compilation or signals a core bug
    Fatal,
    /// Error returned to the field's caller
    Recoverable,
    /// Control-flow signal, not a failure
    Signal,
}

impl Error {
    /// Create a runtime error with a message
    pub fn runtime(msg: impl Into<String>) -> Self {
        Error::RuntimeError(msg.into())
    }

    /// Create a semantic error for a resource
    pub fn semantic(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SemanticError {
            resource: resource.into(),
            field: None,
            message: message.into(),
        }
    }

    /// Create a semantic error for a field of a resource
    pub fn semantic_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::SemanticError {
            resource: resource.into(),
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Returns true for the NotReady control signal
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Error::NotReady)
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::NotReady => ErrorSeverity::Signal,

            Error::SyntaxError { .. } => ErrorSeverity::Fatal,
            Error::ImportError { .. } => ErrorSeverity::Fatal,
            Error::MissingPackageOption { .. } => ErrorSeverity::Fatal,
            Error::SemanticError { .. } => ErrorSeverity::Fatal,
            Error::DependencyCycle { .. } => ErrorSeverity::Fatal,
            Error::Cast { .. } => ErrorSeverity::Fatal,

            _ => ErrorSeverity::Recoverable,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

/// Result type for LR operations
pub type Result<T> = std::result::Result<T, Error>;
