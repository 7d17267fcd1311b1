//! Incremental graph construction from the fact stream.
//!
//! The builder is single-writer: exactly one task feeds it facts, so it holds
//! plain mutable state with no locking. Nesting is implicit in the stream and
//! tracked through the "current package" and "current file" ids.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use tracing::{debug, trace};

use super::cycles;
use super::model::{
    canonical_import_path, package_uid, Declaration, File, FileId, Import, Package, PackageId,
    Snapshot,
};
use crate::parser::{DeclKind, Fact, ModuleInfo, ReceiverError, TypeExpr};

/// File name of the synthetic file that stands in for blank imports.
pub const BLANK_IMPORT_FILE_NAME: &str = "_";

/// File name of the synthetic file holding declarations that were referenced
/// but never seen, e.g. everything used from an external package.
pub const STUB_FILE_NAME: &str = "_stub";

/// Name of the declaration a blank import refers to.
pub const BLANK_DECL_NAME: &str = "_";

/// Errors raised while building the graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A file marker arrived before any package marker.
    #[error("{fact} fact arrived without a current package")]
    MissingPackage { fact: &'static str },

    /// An import, declaration, or reference arrived before a file marker.
    #[error("{fact} fact arrived without a current file")]
    MissingFile { fact: &'static str },

    /// A method's receiver has no usable base type name.
    #[error("Malformed receiver on method {method} in {file}: {source}")]
    MalformedReceiver {
        file: String,
        method: String,
        #[source]
        source: ReceiverError,
    },
}

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// A `qualifier.name` reference waiting for its target package to be complete.
#[derive(Debug, Clone)]
struct PendingReference {
    file: FileId,
    import: String,
    name: String,
}

/// Builds the package graph one fact at a time.
///
/// # Example
///
/// ```rust
/// use depscope::graph::GraphBuilder;
/// use depscope::parser::{DeclKind, Fact, ModuleInfo};
///
/// let mut builder = GraphBuilder::new(ModuleInfo::new("example.com/m", "/m"));
/// builder.submit(Fact::package("/m/a", "a")).unwrap();
/// builder.submit(Fact::file("/m/a/a.go")).unwrap();
/// builder.submit(Fact::import("example.com/m/b")).unwrap();
/// builder.submit(Fact::reference("b", "Fn")).unwrap();
/// builder.submit(Fact::decl(DeclKind::Func, "Fn")).unwrap();
///
/// let snapshot = builder.finalize().unwrap();
/// assert_eq!(snapshot.package_count(), 2);
/// assert!(snapshot.package_by_uid("example.com/m/b").unwrap().is_stub);
/// ```
#[derive(Debug)]
pub struct GraphBuilder {
    module: ModuleInfo,
    packages: Vec<Package>,
    files: Vec<File>,
    /// Maps package UIDs to their arena ids for O(1) lookup
    package_indices: HashMap<String, PackageId>,
    current_package: Option<PackageId>,
    current_file: Option<FileId>,
    /// Names imports are visible under in the current file → import UID
    file_imports: HashMap<String, String>,
    pending: Vec<PendingReference>,
}

impl GraphBuilder {
    pub fn new(module: ModuleInfo) -> Self {
        Self {
            module,
            packages: Vec::new(),
            files: Vec::new(),
            package_indices: HashMap::new(),
            current_package: None,
            current_file: None,
            file_imports: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn module(&self) -> &ModuleInfo {
        &self.module
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Clears the package and file context.
    ///
    /// Called between per-file batches so a batch that lacks its own markers
    /// fails instead of attaching to the previous file.
    pub fn reset_context(&mut self) {
        self.current_package = None;
        self.current_file = None;
        self.file_imports.clear();
    }

    /// Applies one fact to the graph.
    pub fn submit(&mut self, fact: Fact) -> GraphResult<()> {
        trace!(fact = fact.kind(), "submit");
        match fact {
            Fact::Package { dir, name } => {
                self.enter_package(dir, name);
                Ok(())
            }
            Fact::File { path } => self.enter_file(path),
            Fact::Import { path, alias } => self.add_import(path, alias),
            Fact::Decl {
                kind,
                name,
                receiver,
                scope,
            } => self.add_decl(kind, name, receiver, scope),
            Fact::Reference { qualifier, name } => self.add_reference(qualifier, name),
        }
    }

    /// Applies a sequence of facts, stopping at the first error.
    pub fn submit_all(&mut self, facts: impl IntoIterator<Item = Fact>) -> GraphResult<()> {
        facts.into_iter().try_for_each(|fact| self.submit(fact))
    }

    fn enter_package(&mut self, dir: PathBuf, name: String) {
        let import_path = canonical_import_path(&self.module, &dir, &name);
        let uid = package_uid(&import_path, &dir, &name);

        let existing = self.package_indices.get(&uid).copied();
        let id = match existing {
            Some(id) => {
                let pkg = &mut self.packages[id.0];
                if pkg.is_stub {
                    debug!(package = %uid, "promoting stub package");
                    pkg.is_stub = false;
                    pkg.dir = dir;
                    pkg.name = name;
                    pkg.import_path = import_path;
                    self.rehome_synthetic_files(id);
                }
                id
            }
            None => self.insert_package(Package::new(uid, dir, name, import_path)),
        };

        self.current_package = Some(id);
        self.current_file = None;
        self.file_imports.clear();
    }

    /// Moves synthetic files created while the package was a stub under its
    /// real directory, so their UIDs do not depend on arrival order.
    fn rehome_synthetic_files(&mut self, package: PackageId) {
        let dir = self.packages[package.0].dir.clone();
        let ids: Vec<FileId> = self.packages[package.0].files.values().copied().collect();
        let mut files = BTreeMap::new();
        for id in ids {
            let file = &mut self.files[id.0];
            if file.is_stub {
                file.abs_path = dir.join(&file.file_name);
            }
            files.insert(file.uid(), id);
        }
        self.packages[package.0].files = files;
    }

    fn insert_package(&mut self, package: Package) -> PackageId {
        let id = PackageId(self.packages.len());
        self.package_indices.insert(package.uid.clone(), id);
        self.packages.push(package);
        id
    }

    fn insert_file(&mut self, file: File) -> FileId {
        let id = FileId(self.files.len());
        let uid = file.uid();
        self.packages[file.package.0].files.insert(uid, id);
        self.files.push(file);
        id
    }

    fn enter_file(&mut self, path: PathBuf) -> GraphResult<()> {
        let package = self
            .current_package
            .ok_or(GraphError::MissingPackage { fact: "file" })?;

        let uid = path.display().to_string();
        let existing = self.packages[package.0].files.get(&uid).copied();
        let id = match existing {
            Some(id) => id,
            None => self.insert_file(File::new(package, path)),
        };

        self.current_file = Some(id);
        self.file_imports.clear();
        Ok(())
    }

    fn add_import(&mut self, path: String, alias: Option<String>) -> GraphResult<()> {
        let file = self
            .current_file
            .ok_or(GraphError::MissingFile { fact: "import" })?;

        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        let is_blank = alias.as_deref() == Some(BLANK_DECL_NAME);
        let target = self.import_target(&path, &name);

        let mut import = Import {
            package: target,
            name,
            is_aliased: alias.is_some(),
            alias,
            path,
            is_blank,
            referenced_decls: Default::default(),
            in_import_cycle: false,
            referenced_files_in_cycle: Default::default(),
        };
        let uid = import.uid();

        if is_blank {
            let blank_file = self.blank_import_file(target);
            import
                .referenced_decls
                .insert(BLANK_DECL_NAME.to_string(), blank_file);
        } else {
            let visible = match import.alias.as_deref() {
                Some(".") => None,
                Some(alias) => Some(alias.to_string()),
                None => Some(import.name.clone()),
            };
            if let Some(visible) = visible {
                self.file_imports.insert(visible, uid.clone());
            }
        }

        self.files[file.0].imports.entry(uid).or_insert(import);
        Ok(())
    }

    /// Looks up the imported package, creating a stub if it has not been seen.
    fn import_target(&mut self, path: &str, name: &str) -> PackageId {
        if let Some(&id) = self.package_indices.get(path) {
            return id;
        }
        let mut stub = Package::new(
            path.to_string(),
            PathBuf::from(path),
            name.to_string(),
            path.to_string(),
        );
        stub.is_stub = true;
        self.insert_package(stub)
    }

    /// Returns the package's blank-import file, creating it on first use.
    fn blank_import_file(&mut self, package: PackageId) -> FileId {
        if let Some(id) = self.packages[package.0].blank_import_file {
            return id;
        }
        let path = self.packages[package.0].dir.join(BLANK_IMPORT_FILE_NAME);
        let mut file = File::new(package, path);
        file.is_stub = true;
        file.is_blank_import = true;

        let id = self.insert_file(file);
        self.files[id.0].decls.insert(
            BLANK_DECL_NAME.to_string(),
            Declaration {
                file: id,
                name: BLANK_DECL_NAME.to_string(),
                kind: DeclKind::Var,
            },
        );
        self.packages[package.0].blank_import_file = Some(id);
        id
    }

    fn add_decl(
        &mut self,
        kind: DeclKind,
        name: String,
        receiver: Option<TypeExpr>,
        scope: Vec<String>,
    ) -> GraphResult<()> {
        let file = self
            .current_file
            .ok_or(GraphError::MissingFile { fact: "declaration" })?;

        let mut qualified = match receiver {
            Some(receiver) => {
                let base = receiver
                    .base_name()
                    .map_err(|source| GraphError::MalformedReceiver {
                        file: self.files[file.0].uid(),
                        method: name.clone(),
                        source,
                    })?;
                format!("{}.{}", base, name)
            }
            None => name,
        };
        if !scope.is_empty() {
            qualified = format!("{}.{}", scope.join("."), qualified);
        }

        self.files[file.0]
            .decls
            .entry(qualified.clone())
            .or_insert(Declaration {
                file,
                name: qualified,
                kind,
            });
        Ok(())
    }

    fn add_reference(&mut self, qualifier: String, name: String) -> GraphResult<()> {
        let file = self
            .current_file
            .ok_or(GraphError::MissingFile { fact: "reference" })?;

        match self.file_imports.get(&qualifier) {
            Some(import) => self.pending.push(PendingReference {
                file,
                import: import.clone(),
                name,
            }),
            None => trace!(%qualifier, %name, "selector does not name an import"),
        }
        Ok(())
    }

    /// Binds every deferred reference to a concrete declaration.
    ///
    /// Names missing from the target package are declared in its stub file.
    fn resolve_references(&mut self) {
        let mut index: HashMap<(PackageId, String), FileId> = HashMap::new();
        for (idx, package) in self.packages.iter().enumerate() {
            for &file in package.files.values() {
                for name in self.files[file.0].decls.keys() {
                    index
                        .entry((PackageId(idx), name.clone()))
                        .or_insert(file);
                }
            }
        }

        for pending in std::mem::take(&mut self.pending) {
            let Some(target) = self.files[pending.file.0]
                .imports
                .get(&pending.import)
                .map(|imp| imp.package)
            else {
                continue;
            };

            let key = (target, pending.name.clone());
            let declaring = match index.get(&key) {
                Some(&file) => file,
                None => {
                    let file = self.stub_file(target);
                    self.files[file.0].decls.insert(
                        pending.name.clone(),
                        Declaration {
                            file,
                            name: pending.name.clone(),
                            kind: DeclKind::Func,
                        },
                    );
                    index.insert(key, file);
                    file
                }
            };

            if let Some(import) = self.files[pending.file.0].imports.get_mut(&pending.import) {
                import.referenced_decls.insert(pending.name, declaring);
            }
        }
    }

    /// Returns the package's stub file, creating it on first use.
    fn stub_file(&mut self, package: PackageId) -> FileId {
        let path = self.packages[package.0].dir.join(STUB_FILE_NAME);
        if let Some(&id) = self.packages[package.0].files.get(&path.display().to_string()) {
            return id;
        }
        let mut file = File::new(package, path);
        file.is_stub = true;
        self.insert_file(file)
    }

    /// Resolves deferred references, annotates import cycles, and returns
    /// the read-only snapshot.
    pub fn finalize(mut self) -> GraphResult<Snapshot> {
        debug!(
            packages = self.packages.len(),
            files = self.files.len(),
            references = self.pending.len(),
            "finalizing graph"
        );
        self.resolve_references();
        let cycles = cycles::annotate(&mut self.packages, &mut self.files);

        let mut order: Vec<PackageId> = (0..self.packages.len()).map(PackageId).collect();
        order.sort_by(|&a, &b| {
            let (a, b) = (&self.packages[a.0], &self.packages[b.0]);
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.uid.cmp(&b.uid))
        });

        Ok(Snapshot {
            module: self.module,
            packages: self.packages,
            files: self.files,
            by_uid: self.package_indices,
            order,
            cycles,
        })
    }
}
