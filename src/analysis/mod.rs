//! Source analysis module for depscope.
//!
//! This module drives extraction over a source tree and feeds the resulting
//! facts into the graph builder concurrently.
//!
//! # Features
//!
//! - Enumerate Go sources, skipping tests, vendored code, and hidden or
//!   private directories
//! - Honour file name suffixes and `//go:build` constraints
//! - Run extraction on a pool of blocking workers
//! - Build the graph on a single consumer task
//! - Cancel every stage on the first failure
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use depscope::analysis::{analyze, PipelineOptions};
//!
//! let snapshot = analyze(Path::new("."), PipelineOptions::default()).await?;
//! for package in snapshot.packages().filter(|p| p.in_import_cycle) {
//!     println!("{} is in an import cycle", package.name);
//! }
//! ```

pub mod constraints;
pub mod pipeline;

use thiserror::Error;

use crate::graph::GraphError;
use crate::parser::ParseError;

// Re-export main types for convenience
pub use constraints::{BuildContext, ConstraintError, Expr};
pub use pipeline::{
    analyze, default_workers, enumerate_source_files, Pipeline, PipelineOptions,
    DEFAULT_QUEUE_CAPACITY,
};

/// Errors that can occur during analysis.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to walk source tree: {0}")]
    Enumerate(#[from] walkdir::Error),

    /// Module discovery failed before any extraction started.
    #[error("Module discovery failed: {0}")]
    Discovery(#[from] ParseError),

    #[error("Invalid build constraint in {path}: {source}")]
    Constraint {
        path: String,
        #[source]
        source: ConstraintError,
    },

    #[error("Extraction failed for {path}: {source}")]
    Extraction {
        path: String,
        #[source]
        source: ParseError,
    },

    #[error("Graph construction failed: {0}")]
    Graph(#[from] GraphError),

    /// A pipeline task panicked or was aborted.
    #[error("Pipeline task failed: {0}")]
    Task(String),

    #[error("Analysis was cancelled")]
    Cancelled,
}

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
