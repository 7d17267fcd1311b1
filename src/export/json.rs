//! JSON export implementation.
//!
//! Exports the whole snapshot for machine consumption. Entities refer to
//! each other by UID, never by arena index, so the output does not depend on
//! the order facts arrived in.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use super::Exporter;
use crate::graph::{File, Import, Package, Snapshot};

/// JSON exporter implementation.
pub struct JsonExporter;

/// Serializable declaration for JSON output.
#[derive(Serialize)]
struct JsonDecl {
    name: String,
    kind: &'static str,
}

/// Serializable import for JSON output.
#[derive(Serialize)]
struct JsonImport {
    uid: String,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
    /// UID of the imported package
    package: String,
    is_blank: bool,
    in_import_cycle: bool,
    /// Declaration name → UID of the declaring file
    referenced_decls: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    referenced_files_in_cycle: Vec<String>,
}

/// Serializable file for JSON output.
#[derive(Serialize)]
struct JsonFile {
    uid: String,
    name: String,
    is_stub: bool,
    is_blank_import: bool,
    in_import_cycle: bool,
    imports: Vec<JsonImport>,
    decls: Vec<JsonDecl>,
}

/// Serializable package for JSON output.
#[derive(Serialize)]
struct JsonPackage {
    uid: String,
    name: String,
    import_path: String,
    dir: String,
    is_stub: bool,
    in_import_cycle: bool,
    files: Vec<JsonFile>,
}

/// Summary statistics for JSON output.
#[derive(Serialize)]
struct JsonSummary {
    packages: usize,
    files: usize,
    imports: usize,
    import_cycles: usize,
}

/// Module info for JSON output.
#[derive(Serialize)]
struct JsonModule {
    path: String,
    root: String,
}

/// Root JSON export structure.
#[derive(Serialize)]
struct JsonExport {
    module: JsonModule,
    summary: JsonSummary,
    packages: Vec<JsonPackage>,
    /// Each cycle as sorted package UIDs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    import_cycles: Vec<Vec<String>>,
}

fn json_import(snapshot: &Snapshot, import: &Import) -> JsonImport {
    JsonImport {
        uid: import.uid(),
        path: import.path.clone(),
        alias: import.alias.clone(),
        package: snapshot.package(import.package).uid.clone(),
        is_blank: import.is_blank,
        in_import_cycle: import.in_import_cycle,
        referenced_decls: import
            .referenced_decls
            .iter()
            .map(|(name, &file)| (name.clone(), snapshot.file(file).uid()))
            .collect(),
        referenced_files_in_cycle: {
            let mut uids: Vec<String> = import
                .referenced_files_in_cycle
                .iter()
                .map(|&file| snapshot.file(file).uid())
                .collect();
            uids.sort();
            uids
        },
    }
}

fn json_file(snapshot: &Snapshot, file: &File) -> JsonFile {
    JsonFile {
        uid: file.uid(),
        name: file.file_name.clone(),
        is_stub: file.is_stub,
        is_blank_import: file.is_blank_import,
        in_import_cycle: file.in_import_cycle,
        imports: file
            .imports
            .values()
            .map(|imp| json_import(snapshot, imp))
            .collect(),
        decls: file
            .decls
            .values()
            .map(|decl| JsonDecl {
                name: decl.name.clone(),
                kind: decl.kind.label(),
            })
            .collect(),
    }
}

fn json_package(snapshot: &Snapshot, package: &Package) -> JsonPackage {
    JsonPackage {
        uid: package.uid.clone(),
        name: package.name.clone(),
        import_path: package.import_path.clone(),
        dir: package.dir.display().to_string(),
        is_stub: package.is_stub,
        in_import_cycle: package.in_import_cycle,
        files: snapshot
            .files_of(package)
            .map(|file| json_file(snapshot, file))
            .collect(),
    }
}

impl Exporter for JsonExporter {
    fn export<W: Write>(&self, snapshot: &Snapshot, writer: &mut W) -> io::Result<()> {
        let mut import_cycles: Vec<Vec<String>> = snapshot
            .cycles()
            .iter()
            .map(|cycle| {
                let mut uids: Vec<String> = cycle
                    .iter()
                    .map(|&id| snapshot.package(id).uid.clone())
                    .collect();
                uids.sort();
                uids
            })
            .collect();
        import_cycles.sort();

        let export = JsonExport {
            module: JsonModule {
                path: snapshot.module().path.clone(),
                root: snapshot.module().root.display().to_string(),
            },
            summary: JsonSummary {
                packages: snapshot.package_count(),
                files: snapshot.file_count(),
                imports: snapshot.import_count(),
                import_cycles: snapshot.cycles().len(),
            },
            packages: snapshot
                .packages()
                .map(|package| json_package(snapshot, package))
                .collect(),
            import_cycles,
        };

        let json = serde_json::to_string_pretty(&export)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        writeln!(writer, "{}", json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::sample_snapshot;

    fn export_value() -> serde_json::Value {
        let mut output = Vec::new();
        JsonExporter.export(&sample_snapshot(), &mut output).unwrap();
        serde_json::from_slice(&output).unwrap()
    }

    fn package<'a>(parsed: &'a serde_json::Value, uid: &str) -> &'a serde_json::Value {
        parsed["packages"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["uid"] == uid)
            .unwrap()
    }

    #[test]
    fn test_json_export_summary() {
        let parsed = export_value();

        assert_eq!(parsed["module"]["path"], "github.com/fake/fake");
        assert_eq!(parsed["summary"]["packages"], 5);
        assert_eq!(parsed["summary"]["import_cycles"], 1);
        assert_eq!(
            parsed["import_cycles"],
            serde_json::json!([["github.com/fake/fake/a", "github.com/fake/fake/b"]])
        );
    }

    #[test]
    fn test_json_packages_in_render_order() {
        let parsed = export_value();
        let names: Vec<&str> = parsed["packages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "log", "main"]);
    }

    #[test]
    fn test_json_references_by_uid() {
        let parsed = export_value();
        let a = package(&parsed, "github.com/fake/fake/a");
        assert_eq!(a["in_import_cycle"], true);

        let import = &a["files"][0]["imports"][0];
        assert_eq!(import["uid"], "b");
        assert_eq!(import["package"], "github.com/fake/fake/b");
        assert_eq!(import["referenced_decls"]["B"], "/m/b/b.go");
        assert_eq!(import["referenced_decls"]["B2"], "/m/b/b2.go");
        assert_eq!(import["referenced_files_in_cycle"], serde_json::json!(["/m/b/b.go"]));

        let log = package(&parsed, "log");
        assert_eq!(log["is_stub"], true);
        assert_eq!(log["files"][0]["decls"][0]["name"], "Println");
    }

    #[test]
    fn test_json_blank_import() {
        let parsed = export_value();
        let c = package(&parsed, "github.com/fake/fake/c");
        let blank = &c["files"][0]["imports"][0];
        assert_eq!(blank["uid"], "_b");
        assert_eq!(blank["alias"], "_");
        assert_eq!(blank["is_blank"], true);
        assert_eq!(blank["referenced_decls"]["_"], "/m/b/_");
        assert!(blank.get("referenced_files_in_cycle").is_none());
    }
}
