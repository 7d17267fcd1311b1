//! Parser module for depscope.
//!
//! This module turns Go source into the structural fact stream the graph
//! builder consumes, and locates the module a source tree belongs to.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use depscope::parser::{discover_module, GoExtractor, SyntaxExtractor};
//!
//! let module = discover_module(Path::new("."))?;
//! let facts = GoExtractor::new().extract(&module.root.join("main.go"))?;
//! println!("{} facts", facts.len());
//! ```

pub mod go_mod;
pub mod go_source;
pub mod types;

// Re-export commonly used types for convenience
pub use go_mod::{discover_module, find_go_mod, module_path};
pub use go_source::{GoExtractor, SyntaxExtractor};
pub use types::{DeclKind, Fact, FileFacts, ModuleInfo, ReceiverError, TypeExpr};

/// Errors raised while extracting facts or discovering the module.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Failed to read a file from disk.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// The source contains a syntax error.
    #[error("Syntax error in {path} at line {line}, column {column}")]
    Syntax {
        path: String,
        line: usize,
        column: usize,
    },

    /// The file has no `package` clause.
    #[error("Missing package clause: {0}")]
    MissingPackageClause(String),

    /// The parser produced no tree.
    #[error("Failed to parse file: {0}")]
    ParseFailed(String),

    #[error("Tree-sitter language initialization failed")]
    LanguageInit,

    /// No `go.mod` at or above the starting path.
    #[error("No go.mod found at or above {0}")]
    GoModNotFound(String),

    /// `go.mod` exists but declares no module path.
    #[error("No module directive in {0}")]
    MissingModuleDirective(String),
}

/// Result type alias for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;
