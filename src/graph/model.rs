//! Package, file, import, and declaration entities.
//!
//! Entities live in arenas owned by the builder (and later the
//! [`Snapshot`]) and refer to each other through [`PackageId`] and
//! [`FileId`]. A package owns its files through its `files` map; a file owns
//! its imports and declarations. Import targets and referenced declarations
//! are lookups by id, never ownership.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::parser::{DeclKind, ModuleInfo};

/// Name Go reserves for executable packages.
pub const MAIN_PACKAGE: &str = "main";

/// Stable index of a package in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub(crate) usize);

/// Stable index of a file in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) usize);

/// Computes the canonical import path of the package in `dir`.
///
/// `main` packages are not importable and get an empty path. Directories
/// under the module root map to `module/relative/dir`.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use depscope::graph::canonical_import_path;
/// use depscope::parser::ModuleInfo;
///
/// let module = ModuleInfo::new("github.com/fake/fake", "/src/fake");
/// assert_eq!(
///     canonical_import_path(&module, Path::new("/src/fake/a/b"), "b"),
///     "github.com/fake/fake/a/b"
/// );
/// assert_eq!(canonical_import_path(&module, Path::new("/src/fake"), "main"), "");
/// ```
pub fn canonical_import_path(module: &ModuleInfo, dir: &Path, name: &str) -> String {
    if name == MAIN_PACKAGE {
        return String::new();
    }
    if let Ok(relative) = dir.strip_prefix(&module.root) {
        let relative = slash_path(relative);
        if relative.is_empty() {
            return module.path.clone();
        }
        return format!("{}/{}", module.path, relative);
    }
    let dir = slash_path(dir);
    if !module.path.is_empty() && dir.starts_with(&module.path) {
        return dir;
    }
    name.to_string()
}

/// Unique key of a package: import path, else directory, else bare name.
pub fn package_uid(import_path: &str, dir: &Path, name: &str) -> String {
    if !import_path.is_empty() {
        return import_path.to_string();
    }
    let dir = dir.display().to_string();
    if !dir.is_empty() {
        return dir;
    }
    name.to_string()
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// A directory-scoped compilation unit.
#[derive(Debug, Clone)]
pub struct Package {
    /// Unique key, see [`package_uid`]
    pub uid: String,
    /// Directory for extracted packages; the import path for stubs
    pub dir: PathBuf,
    /// Declared package name
    pub name: String,
    /// Canonical import path, empty for `main`
    pub import_path: String,
    /// Files keyed by file UID (absolute path)
    pub files: BTreeMap<String, FileId>,
    /// Referenced as an import target but never extracted
    pub is_stub: bool,
    pub in_import_cycle: bool,
    /// Synthetic file standing in for side-effect imports of this package
    pub blank_import_file: Option<FileId>,
}

impl Package {
    pub(crate) fn new(uid: String, dir: PathBuf, name: String, import_path: String) -> Self {
        Self {
            uid,
            dir,
            name,
            import_path,
            files: BTreeMap::new(),
            is_stub: false,
            in_import_cycle: false,
            blank_import_file: None,
        }
    }

    /// Returns true if some file blank-imports this package.
    pub fn has_blank_imports(&self) -> bool {
        self.blank_import_file.is_some()
    }

    /// Label relative to the module root; `main` packages get a `:main` suffix.
    pub fn module_relative_path(&self, module: &ModuleInfo) -> String {
        let relative = match self.dir.strip_prefix(&module.root) {
            Ok(relative) => slash_path(relative),
            Err(_) => {
                let dir = slash_path(&self.dir);
                match dir.strip_prefix(&module.path) {
                    Some(rest) if !module.path.is_empty() => rest.trim_start_matches('/').to_string(),
                    _ => return self.name.clone(),
                }
            }
        };
        if self.name != MAIN_PACKAGE {
            return relative;
        }
        if relative.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", relative, self.name)
        }
    }
}

/// A source file belonging to exactly one package.
#[derive(Debug, Clone)]
pub struct File {
    /// Owning package
    pub package: PackageId,
    pub file_name: String,
    pub abs_path: PathBuf,
    /// Imports keyed by [`Import::uid`]
    pub imports: BTreeMap<String, Import>,
    /// Declarations keyed by qualified name
    pub decls: BTreeMap<String, Declaration>,
    pub is_stub: bool,
    pub is_blank_import: bool,
    pub in_import_cycle: bool,
}

impl File {
    pub(crate) fn new(package: PackageId, abs_path: PathBuf) -> Self {
        let file_name = abs_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            package,
            file_name,
            abs_path,
            imports: BTreeMap::new(),
            decls: BTreeMap::new(),
            is_stub: false,
            is_blank_import: false,
            in_import_cycle: false,
        }
    }

    /// The file's absolute path, used as its unique key.
    pub fn uid(&self) -> String {
        self.abs_path.display().to_string()
    }

    pub fn has_decl(&self, name: &str) -> bool {
        self.decls.contains_key(name)
    }

    /// Distinct files declaring something this file references.
    pub fn referenced_files(&self) -> BTreeSet<FileId> {
        self.imports
            .values()
            .flat_map(|imp| imp.referenced_decls.values().copied())
            .collect()
    }
}

/// A directed dependency from a file to a package.
#[derive(Debug, Clone)]
pub struct Import {
    /// Target package, possibly a stub
    pub package: PackageId,
    /// Leaf of the import path
    pub name: String,
    pub alias: Option<String>,
    /// Import path as written
    pub path: String,
    pub is_aliased: bool,
    pub is_blank: bool,
    /// Referenced declarations of the target: qualified name → declaring file
    pub referenced_decls: BTreeMap<String, FileId>,
    pub in_import_cycle: bool,
    /// Target files on a path that leads back to the importing package
    pub referenced_files_in_cycle: BTreeSet<FileId>,
}

impl Import {
    /// Key within the importing file: `_name` for blank imports, the alias
    /// when aliased, otherwise the name.
    pub fn uid(&self) -> String {
        match &self.alias {
            Some(alias) if self.is_blank => format!("{}{}", alias, self.name),
            Some(alias) if self.is_aliased => alias.clone(),
            _ => self.name.clone(),
        }
    }

    /// True if the declaration's file closes an import cycle through this edge.
    pub fn is_connected(&self, decl: &Declaration) -> bool {
        self.referenced_files_in_cycle.contains(&decl.file)
    }
}

/// A named entity defined in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Declaring file
    pub file: FileId,
    /// Qualified name: `Type.Method`, `Scope.name`, or plain `name`
    pub name: String,
    pub kind: DeclKind,
}

/// Finished, cycle-annotated dependency graph.
///
/// Produced once by [`GraphBuilder::finalize`](super::GraphBuilder::finalize)
/// and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub(crate) module: ModuleInfo,
    pub(crate) packages: Vec<Package>,
    pub(crate) files: Vec<File>,
    pub(crate) by_uid: HashMap<String, PackageId>,
    /// Package ids sorted case-insensitively by name, then by UID
    pub(crate) order: Vec<PackageId>,
    pub(crate) cycles: Vec<Vec<PackageId>>,
}

impl Snapshot {
    pub fn module(&self) -> &ModuleInfo {
        &self.module
    }

    /// Packages in rendering order.
    pub fn packages(&self) -> impl Iterator<Item = &Package> + '_ {
        self.order.iter().map(move |&id| &self.packages[id.0])
    }

    /// Package ids in rendering order.
    pub fn package_ids(&self) -> &[PackageId] {
        &self.order
    }

    pub fn package(&self, id: PackageId) -> &Package {
        &self.packages[id.0]
    }

    pub fn file(&self, id: FileId) -> &File {
        &self.files[id.0]
    }

    pub fn package_by_uid(&self, uid: &str) -> Option<&Package> {
        self.by_uid.get(uid).map(|&id| &self.packages[id.0])
    }

    /// Finds a package by declared name. Names need not be unique; the first
    /// match in rendering order wins.
    pub fn package_by_name(&self, name: &str) -> Option<&Package> {
        self.packages().find(|pkg| pkg.name == name)
    }

    /// Files of a package ordered by UID.
    pub fn files_of<'a>(&'a self, package: &'a Package) -> impl Iterator<Item = &'a File> + 'a {
        package.files.values().map(move |&id| &self.files[id.0])
    }

    pub fn file_by_path(&self, path: &Path) -> Option<&File> {
        self.files.iter().find(|file| file.abs_path == path)
    }

    /// Packages grouped by import cycle (strongly connected components).
    pub fn cycles(&self) -> &[Vec<PackageId>] {
        &self.cycles
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn import_count(&self) -> usize {
        self.files.iter().map(|file| file.imports.len()).sum()
    }

    /// Names of every package flagged as part of an import cycle.
    pub fn packages_in_cycles(&self) -> BTreeSet<String> {
        self.packages()
            .filter(|pkg| pkg.in_import_cycle)
            .map(|pkg| pkg.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> ModuleInfo {
        ModuleInfo::new("github.com/fake/fake", "/src/fake")
    }

    #[test]
    fn test_canonical_import_path() {
        let module = module();
        assert_eq!(
            canonical_import_path(&module, Path::new("/src/fake"), "fake"),
            "github.com/fake/fake"
        );
        assert_eq!(
            canonical_import_path(&module, Path::new("github.com/fake/fake/x"), "x"),
            "github.com/fake/fake/x"
        );
        assert_eq!(canonical_import_path(&module, Path::new("/elsewhere"), "log"), "log");
    }

    #[test]
    fn test_package_uid_fallbacks() {
        assert_eq!(package_uid("a/b", Path::new("/d"), "b"), "a/b");
        assert_eq!(package_uid("", Path::new("/src/fake"), "main"), "/src/fake");
        assert_eq!(package_uid("", Path::new(""), "main"), "main");
    }

    #[test]
    fn test_module_relative_path() {
        let module = module();
        let pkg = |dir: &str, name: &str| {
            Package::new(String::new(), PathBuf::from(dir), name.to_string(), String::new())
        };
        assert_eq!(pkg("/src/fake/a", "a").module_relative_path(&module), "a");
        assert_eq!(pkg("/src/fake", "main").module_relative_path(&module), "main");
        assert_eq!(
            pkg("/src/fake/cmd/tool", "main").module_relative_path(&module),
            "cmd/tool:main"
        );
        assert_eq!(pkg("log", "log").module_relative_path(&module), "log");
    }

    #[test]
    fn test_import_uid() {
        let mut imp = Import {
            package: PackageId(0),
            name: "a".to_string(),
            alias: None,
            path: "github.com/fake/fake/a".to_string(),
            is_aliased: false,
            is_blank: false,
            referenced_decls: BTreeMap::new(),
            in_import_cycle: false,
            referenced_files_in_cycle: BTreeSet::new(),
        };
        assert_eq!(imp.uid(), "a");

        imp.alias = Some("alpha".to_string());
        imp.is_aliased = true;
        assert_eq!(imp.uid(), "alpha");

        imp.alias = Some("_".to_string());
        imp.is_blank = true;
        assert_eq!(imp.uid(), "_a");
    }
}
