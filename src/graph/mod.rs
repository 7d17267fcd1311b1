//! Graph module for package dependency modeling.
//!
//! The [`GraphBuilder`] accepts the fact stream one fact at a time and,
//! once every file has been submitted, is consumed by
//! [`GraphBuilder::finalize`] to produce an immutable, cycle-annotated
//! [`Snapshot`].
//!
//! # Example
//!
//! ```rust
//! use depscope::graph::GraphBuilder;
//! use depscope::parser::{DeclKind, Fact, ModuleInfo};
//!
//! let mut builder = GraphBuilder::new(ModuleInfo::new("example.com/m", "/m"));
//! for fact in [
//!     Fact::package("/m/a", "a"),
//!     Fact::file("/m/a/a.go"),
//!     Fact::import("example.com/m/b"),
//!     Fact::reference("b", "B"),
//!     Fact::decl(DeclKind::Func, "A"),
//! ] {
//!     builder.submit(fact).unwrap();
//! }
//! builder.reset_context();
//! for fact in [
//!     Fact::package("/m/b", "b"),
//!     Fact::file("/m/b/b.go"),
//!     Fact::import("example.com/m/a"),
//!     Fact::reference("a", "A"),
//!     Fact::decl(DeclKind::Func, "B"),
//! ] {
//!     builder.submit(fact).unwrap();
//! }
//!
//! let snapshot = builder.finalize().unwrap();
//! assert_eq!(snapshot.package_count(), 2);
//! assert!(snapshot.has_cycles());
//! ```

mod builder;
mod cycles;
mod model;

pub use builder::{
    GraphBuilder, GraphError, GraphResult, BLANK_DECL_NAME, BLANK_IMPORT_FILE_NAME, STUB_FILE_NAME,
};
pub use model::{
    canonical_import_path, package_uid, Declaration, File, FileId, Import, Package, PackageId,
    Snapshot, MAIN_PACKAGE,
};
