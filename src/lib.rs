//! depscope - Go package dependency analyzer with import cycle detection
//!
//! This crate extracts structural facts from a Go module, builds a
//! package/file dependency graph from them, marks the packages, imports, and
//! files that take part in import cycles, and renders the result as DOT or
//! JSON.

pub mod analysis;
pub mod config;
pub mod export;
pub mod graph;
pub mod parser;
