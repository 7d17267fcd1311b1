//! Import cycle annotation.
//!
//! Runs once at finalization. Package-level cycles come from Tarjan's
//! strongly connected components over the import graph; file-level marking
//! then follows declaration references to find which target files actually
//! lead back to the importing package.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use super::model::{File, FileId, Package, PackageId};

/// Marks packages, imports, and files that take part in import cycles.
///
/// Returns the cyclic components, each sorted by package id.
pub(crate) fn annotate(packages: &mut [Package], files: &mut [File]) -> Vec<Vec<PackageId>> {
    let mut graph: DiGraph<PackageId, ()> = DiGraph::with_capacity(packages.len(), files.len());
    for idx in 0..packages.len() {
        graph.add_node(PackageId(idx));
    }
    for file in files.iter() {
        for import in file.imports.values() {
            // update_edge keeps one edge per package pair
            graph.update_edge(
                NodeIndex::new(file.package.0),
                NodeIndex::new(import.package.0),
                (),
            );
        }
    }

    let mut component_of: Vec<Option<usize>> = vec![None; packages.len()];
    let mut cycles = Vec::new();
    for scc in tarjan_scc(&graph) {
        let cyclic = scc.len() > 1 || graph.contains_edge(scc[0], scc[0]);
        if !cyclic {
            continue;
        }
        let mut members: Vec<PackageId> = scc.iter().map(|idx| PackageId(idx.index())).collect();
        members.sort();
        for &id in &members {
            component_of[id.0] = Some(cycles.len());
            packages[id.0].in_import_cycle = true;
        }
        debug!(size = members.len(), "found import cycle");
        cycles.push(members);
    }

    if !cycles.is_empty() {
        mark_files(packages, files, &component_of);
    }

    info!(cycles = cycles.len(), "import cycle annotation complete");
    cycles
}

/// For each file, the files that reference one of its declarations.
fn referrers(files: &[File]) -> Vec<Vec<FileId>> {
    let mut reverse = vec![Vec::new(); files.len()];
    for (idx, file) in files.iter().enumerate() {
        for target in file.referenced_files() {
            reverse[target.0].push(FileId(idx));
        }
    }
    reverse
}

/// Files in `source`'s component from which a chain of declaration
/// references reaches one of `source`'s own files.
fn files_reaching(
    source: PackageId,
    packages: &[Package],
    files: &[File],
    reverse: &[Vec<FileId>],
    component_of: &[Option<usize>],
) -> HashSet<FileId> {
    let component = component_of[source.0];
    let mut seen: HashSet<FileId> = packages[source.0].files.values().copied().collect();
    let mut queue: VecDeque<FileId> = seen.iter().copied().collect();

    while let Some(file) = queue.pop_front() {
        for &referrer in &reverse[file.0] {
            if component_of[files[referrer.0].package.0] != component {
                continue;
            }
            if seen.insert(referrer) {
                queue.push_back(referrer);
            }
        }
    }
    seen
}

fn mark_files(packages: &[Package], files: &mut [File], component_of: &[Option<usize>]) {
    let reverse = referrers(files);
    let mut reaching: HashMap<PackageId, HashSet<FileId>> = HashMap::new();
    let mut updates: Vec<(FileId, String, BTreeSet<FileId>)> = Vec::new();
    let mut marked: HashSet<FileId> = HashSet::new();

    for (idx, file) in files.iter().enumerate() {
        let source = file.package;
        let Some(component) = component_of[source.0] else {
            continue;
        };
        for (uid, import) in &file.imports {
            if component_of[import.package.0] != Some(component) {
                continue;
            }
            let reach = reaching
                .entry(source)
                .or_insert_with(|| files_reaching(source, packages, files, &reverse, component_of));

            let returning: BTreeSet<FileId> = import
                .referenced_decls
                .values()
                .copied()
                .filter(|target| reach.contains(target) || files[target.0].is_blank_import)
                .collect();
            marked.extend(returning.iter().copied());
            updates.push((FileId(idx), uid.clone(), returning));
        }
    }

    for (file, uid, returning) in updates {
        if let Some(import) = files[file.0].imports.get_mut(&uid) {
            import.in_import_cycle = true;
            import.referenced_files_in_cycle = returning;
        }
    }

    for package in packages.iter().filter(|pkg| pkg.in_import_cycle) {
        if let Some(blank) = package.blank_import_file {
            marked.insert(blank);
        }
    }
    for file in marked {
        files[file.0].in_import_cycle = true;
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::graph::{GraphBuilder, Snapshot};
    use crate::parser::{DeclKind, Fact, ModuleInfo};

    const MODULE: &str = "github.com/fake/fake";

    /// One source file: package, file name, imports, `pkg.Name` references,
    /// and declarations.
    struct Src<'a> {
        pkg: &'a str,
        file: &'a str,
        imports: &'a [&'a str],
        refs: &'a [(&'a str, &'a str)],
        decls: &'a [&'a str],
    }

    fn build(sources: &[Src]) -> Snapshot {
        let mut builder = GraphBuilder::new(ModuleInfo::new(MODULE, "/m"));
        for src in sources {
            builder.reset_context();
            builder
                .submit(Fact::package(format!("/m/{}", src.pkg), src.pkg))
                .unwrap();
            builder
                .submit(Fact::file(format!("/m/{}/{}", src.pkg, src.file)))
                .unwrap();
            for import in src.imports {
                let fact = match import.strip_prefix('_') {
                    Some(target) => Fact::import_as(format!("{}/{}", MODULE, target), "_"),
                    None => Fact::import(format!("{}/{}", MODULE, import)),
                };
                builder.submit(fact).unwrap();
            }
            for (qualifier, name) in src.refs {
                builder.submit(Fact::reference(*qualifier, *name)).unwrap();
            }
            for decl in src.decls {
                builder.submit(Fact::decl(DeclKind::Func, *decl)).unwrap();
            }
        }
        builder.finalize().unwrap()
    }

    fn in_cycle(snapshot: &Snapshot, pkg: &str) -> bool {
        snapshot
            .package_by_uid(&format!("{}/{}", MODULE, pkg))
            .unwrap()
            .in_import_cycle
    }

    fn file_in_cycle(snapshot: &Snapshot, pkg: &str, file: &str) -> bool {
        snapshot
            .file_by_path(Path::new(&format!("/m/{}/{}", pkg, file)))
            .unwrap()
            .in_import_cycle
    }

    #[test]
    fn test_two_package_cycle() {
        let snapshot = build(&[
            Src { pkg: "a", file: "a.go", imports: &["b"], refs: &[("b", "B")], decls: &["A"] },
            Src { pkg: "b", file: "b.go", imports: &["a"], refs: &[("a", "A")], decls: &["B"] },
        ]);

        assert_eq!(snapshot.cycles().len(), 1);
        assert!(in_cycle(&snapshot, "a"));
        assert!(in_cycle(&snapshot, "b"));
        assert!(file_in_cycle(&snapshot, "a", "a.go"));
        assert!(file_in_cycle(&snapshot, "b", "b.go"));

        let a_file = snapshot.file_by_path(Path::new("/m/a/a.go")).unwrap();
        let import = &a_file.imports["b"];
        assert!(import.in_import_cycle);
        let b_file = &import.referenced_decls["B"];
        assert!(import.referenced_files_in_cycle.contains(b_file));

        let b_file = snapshot.file_by_path(Path::new("/m/b/b.go")).unwrap();
        assert!(b_file.imports["a"].in_import_cycle);
    }

    #[test]
    fn test_diamond_has_no_cycle() {
        let snapshot = build(&[
            Src { pkg: "a", file: "a.go", imports: &["b", "c"], refs: &[], decls: &[] },
            Src { pkg: "b", file: "b.go", imports: &["d"], refs: &[], decls: &[] },
            Src { pkg: "c", file: "c.go", imports: &["d"], refs: &[], decls: &[] },
            Src { pkg: "d", file: "d.go", imports: &[], refs: &[], decls: &[] },
        ]);

        assert!(!snapshot.has_cycles());
        assert!(snapshot.packages_in_cycles().is_empty());
    }

    #[test]
    fn test_importer_outside_cycle_not_marked() {
        let snapshot = build(&[
            Src { pkg: "a", file: "a.go", imports: &["b"], refs: &[("b", "B")], decls: &["A"] },
            Src { pkg: "b", file: "b.go", imports: &["a"], refs: &[("a", "A")], decls: &["B"] },
            Src { pkg: "c", file: "c.go", imports: &["a"], refs: &[("a", "A")], decls: &[] },
        ]);

        assert!(!in_cycle(&snapshot, "c"));
        let c_file = snapshot.file_by_path(Path::new("/m/c/c.go")).unwrap();
        assert!(!c_file.imports["a"].in_import_cycle);
        assert!(c_file.imports["a"].referenced_files_in_cycle.is_empty());
        assert!(!c_file.in_import_cycle);
    }

    #[test]
    fn test_three_package_cycle() {
        let snapshot = build(&[
            Src { pkg: "a", file: "a.go", imports: &["b"], refs: &[("b", "B")], decls: &["A"] },
            Src { pkg: "b", file: "b.go", imports: &["c"], refs: &[("c", "C")], decls: &["B"] },
            Src { pkg: "c", file: "c.go", imports: &["a"], refs: &[("a", "A")], decls: &["C"] },
            Src { pkg: "d", file: "d.go", imports: &["a"], refs: &[], decls: &[] },
        ]);

        assert_eq!(snapshot.cycles().len(), 1);
        assert_eq!(snapshot.cycles()[0].len(), 3);
        let names: Vec<_> = snapshot.packages_in_cycles().into_iter().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(file_in_cycle(&snapshot, "c", "c.go"));
    }

    #[test]
    fn test_self_import_is_cycle() {
        let snapshot = build(&[Src {
            pkg: "a",
            file: "a.go",
            imports: &["a"],
            refs: &[("a", "A")],
            decls: &["A"],
        }]);

        assert_eq!(snapshot.cycles().len(), 1);
        assert!(in_cycle(&snapshot, "a"));
    }

    #[test]
    fn test_package_cycle_without_returning_files() {
        // a1 -> b1 and b2 -> a2, but neither target leads back
        let snapshot = build(&[
            Src { pkg: "a", file: "a1.go", imports: &["b"], refs: &[("b", "B1")], decls: &[] },
            Src { pkg: "a", file: "a2.go", imports: &[], refs: &[], decls: &["A2"] },
            Src { pkg: "b", file: "b1.go", imports: &[], refs: &[], decls: &["B1"] },
            Src { pkg: "b", file: "b2.go", imports: &["a"], refs: &[("a", "A2")], decls: &[] },
        ]);

        assert!(in_cycle(&snapshot, "a"));
        assert!(in_cycle(&snapshot, "b"));

        let a1 = snapshot.file_by_path(Path::new("/m/a/a1.go")).unwrap();
        assert!(a1.imports["b"].in_import_cycle);
        assert!(a1.imports["b"].referenced_files_in_cycle.is_empty());

        for (pkg, file) in [("a", "a1.go"), ("a", "a2.go"), ("b", "b1.go"), ("b", "b2.go")] {
            assert!(!file_in_cycle(&snapshot, pkg, file), "{}/{}", pkg, file);
        }
    }

    #[test]
    fn test_returning_path_through_sibling_file() {
        // a1 -> b1, b1 -> b2 is not an import, b1 references a.A via b1 itself
        let snapshot = build(&[
            Src { pkg: "a", file: "a1.go", imports: &["b"], refs: &[("b", "B1"), ("b", "B2")], decls: &["A"] },
            Src { pkg: "b", file: "b1.go", imports: &["a"], refs: &[("a", "A")], decls: &["B1"] },
            Src { pkg: "b", file: "b2.go", imports: &[], refs: &[], decls: &["B2"] },
        ]);

        let a1 = snapshot.file_by_path(Path::new("/m/a/a1.go")).unwrap();
        let import = &a1.imports["b"];
        assert!(import.referenced_files_in_cycle.contains(&import.referenced_decls["B1"]));
        assert!(!import.referenced_files_in_cycle.contains(&import.referenced_decls["B2"]));
        let b1 = &snapshot.file(import.referenced_decls["B1"]).decls["B1"];
        let b2 = &snapshot.file(import.referenced_decls["B2"]).decls["B2"];
        assert!(import.is_connected(b1));
        assert!(!import.is_connected(b2));
        assert!(file_in_cycle(&snapshot, "b", "b1.go"));
        assert!(!file_in_cycle(&snapshot, "b", "b2.go"));
    }

    #[test]
    fn test_blank_import_closes_cycle() {
        let snapshot = build(&[
            Src { pkg: "a", file: "a.go", imports: &["_b"], refs: &[], decls: &["A"] },
            Src { pkg: "b", file: "b.go", imports: &["a"], refs: &[("a", "A")], decls: &[] },
        ]);

        assert!(in_cycle(&snapshot, "a"));
        assert!(in_cycle(&snapshot, "b"));

        let b = snapshot.package_by_uid(&format!("{}/b", MODULE)).unwrap();
        let blank = b.blank_import_file.unwrap();
        assert!(snapshot.file(blank).in_import_cycle);

        let a_file = snapshot.file_by_path(Path::new("/m/a/a.go")).unwrap();
        let import = &a_file.imports["_b"];
        assert!(import.in_import_cycle);
        assert!(import.referenced_files_in_cycle.contains(&blank));
    }
}
