//! Structural facts emitted by syntax extraction.
//!
//! A source file is reduced to a flat, ordered sequence of [`Fact`]s. The
//! graph builder rebuilds the package → file → import/declaration hierarchy
//! from that sequence, so the ordering rules matter: a package marker comes
//! first, then the file marker, then everything else for that file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The kind of a declared entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    /// `const` spec
    Const,
    /// `type` spec or alias
    Type,
    /// `var` spec
    Var,
    /// Function or method
    Func,
}

impl DeclKind {
    /// Returns a short label for the declaration kind.
    pub fn label(&self) -> &'static str {
        match self {
            DeclKind::Const => "const",
            DeclKind::Type => "type",
            DeclKind::Var => "var",
            DeclKind::Func => "func",
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Shape of a method receiver's type expression.
///
/// Only the base type name matters for qualification, but the full shape is
/// kept so a malformed receiver can be rejected by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// Plain type name: `Foo`
    Ident(String),
    /// Pointer receiver: `*Foo`. `None` when the pointee is missing.
    Pointer(Option<Box<TypeExpr>>),
    /// Instantiated generic: `Foo[T]`, `Foo[K, V]`
    Generic {
        base: Box<TypeExpr>,
        args: Vec<TypeExpr>,
    },
    /// Any other expression shape, tagged with its syntax kind.
    Other(String),
}

/// Why a receiver expression has no usable base type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiverError {
    #[error("pointer receiver without a pointee type")]
    EmptyPointer,

    #[error("unsupported receiver expression: {0}")]
    Unsupported(String),
}

impl TypeExpr {
    /// Convenience constructor for `*Name`.
    pub fn pointer_to(name: impl Into<String>) -> Self {
        TypeExpr::Pointer(Some(Box::new(TypeExpr::Ident(name.into()))))
    }

    /// Returns the receiver's base type name with pointer and generic
    /// wrapping stripped.
    ///
    /// # Example
    ///
    /// ```
    /// use depscope::parser::TypeExpr;
    ///
    /// let recv = TypeExpr::Pointer(Some(Box::new(TypeExpr::Generic {
    ///     base: Box::new(TypeExpr::Ident("Foo".into())),
    ///     args: vec![TypeExpr::Ident("T".into())],
    /// })));
    /// assert_eq!(recv.base_name().unwrap(), "Foo");
    /// ```
    pub fn base_name(&self) -> Result<&str, ReceiverError> {
        match self {
            TypeExpr::Ident(name) => Ok(name),
            TypeExpr::Pointer(Some(inner)) => inner.base_name(),
            TypeExpr::Pointer(None) => Err(ReceiverError::EmptyPointer),
            TypeExpr::Generic { base, .. } => base.base_name(),
            TypeExpr::Other(kind) => Err(ReceiverError::Unsupported(kind.clone())),
        }
    }
}

/// A single structural fact about a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fact {
    /// Marks the package the following file belongs to.
    Package { dir: PathBuf, name: String },

    /// Marks the start of a file. `path` is absolute.
    File { path: PathBuf },

    /// An import spec. `alias` is `_` for blank imports, `.` for dot imports.
    Import { path: String, alias: Option<String> },

    /// A declared constant, type, variable, or function.
    Decl {
        kind: DeclKind,
        name: String,
        /// Receiver type for methods
        receiver: Option<TypeExpr>,
        /// Enclosing function scopes, outermost first
        scope: Vec<String>,
    },

    /// A dotted `qualifier.name` reference where `qualifier` names an import.
    Reference { qualifier: String, name: String },
}

impl Fact {
    /// Package marker.
    pub fn package(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Fact::Package {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// File marker.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Fact::File { path: path.into() }
    }

    /// Unaliased import.
    pub fn import(path: impl Into<String>) -> Self {
        Fact::Import {
            path: path.into(),
            alias: None,
        }
    }

    /// Aliased import, including `_` and `.`.
    pub fn import_as(path: impl Into<String>, alias: impl Into<String>) -> Self {
        Fact::Import {
            path: path.into(),
            alias: Some(alias.into()),
        }
    }

    /// Top-level declaration without receiver.
    pub fn decl(kind: DeclKind, name: impl Into<String>) -> Self {
        Fact::Decl {
            kind,
            name: name.into(),
            receiver: None,
            scope: Vec::new(),
        }
    }

    /// Method declaration.
    pub fn method(receiver: TypeExpr, name: impl Into<String>) -> Self {
        Fact::Decl {
            kind: DeclKind::Func,
            name: name.into(),
            receiver: Some(receiver),
            scope: Vec::new(),
        }
    }

    /// Outbound `qualifier.name` reference.
    pub fn reference(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Fact::Reference {
            qualifier: qualifier.into(),
            name: name.into(),
        }
    }

    /// Short name of the fact variant, used in error messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Fact::Package { .. } => "package",
            Fact::File { .. } => "file",
            Fact::Import { .. } => "import",
            Fact::Decl { .. } => "declaration",
            Fact::Reference { .. } => "reference",
        }
    }
}

/// All facts extracted from one file, delivered as a unit.
#[derive(Debug, Clone)]
pub struct FileFacts {
    /// The file the facts were extracted from
    pub path: PathBuf,
    /// Facts in source order
    pub facts: Vec<Fact>,
}

impl FileFacts {
    pub fn new(path: impl Into<PathBuf>, facts: Vec<Fact>) -> Self {
        Self {
            path: path.into(),
            facts,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Location of a Go module: its canonical path and root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module path from the `module` directive, e.g. `github.com/acme/tool`
    pub path: String,
    /// Directory holding `go.mod`
    pub root: PathBuf,
}

impl ModuleInfo {
    pub fn new(path: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: root.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_plain_and_pointer() {
        assert_eq!(TypeExpr::Ident("Foo".into()).base_name().unwrap(), "Foo");
        assert_eq!(TypeExpr::pointer_to("Bar").base_name().unwrap(), "Bar");
    }

    #[test]
    fn test_base_name_generic_list() {
        let recv = TypeExpr::Generic {
            base: Box::new(TypeExpr::Ident("Slice".into())),
            args: vec![TypeExpr::Ident("E".into()), TypeExpr::Ident("V".into())],
        };
        assert_eq!(recv.base_name().unwrap(), "Slice");
    }

    #[test]
    fn test_base_name_malformed() {
        assert_eq!(
            TypeExpr::Pointer(None).base_name(),
            Err(ReceiverError::EmptyPointer)
        );
        assert!(matches!(
            TypeExpr::Other("map_type".into()).base_name(),
            Err(ReceiverError::Unsupported(kind)) if kind == "map_type"
        ));
    }

    #[test]
    fn test_fact_kind_labels() {
        assert_eq!(Fact::package("/m/a", "a").kind(), "package");
        assert_eq!(Fact::import_as("x/y", "_").kind(), "import");
        assert_eq!(Fact::reference("y", "Z").kind(), "reference");
        assert_eq!(DeclKind::Type.to_string(), "type");
    }
}
