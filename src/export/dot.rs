//! Graphviz DOT export implementation.
//!
//! File resolution draws one cluster per package with a node per file and
//! edges from a file to the files declaring what it references. Package
//! resolution draws one node per package with deduplicated import edges.
//! Stub packages (never extracted) are left out of both.

use std::collections::HashSet;
use std::io::{self, Write};

use super::{Exporter, RenderOptions, Resolution};
use crate::config::Palette;
use crate::graph::{File, Package, PackageId, Snapshot};

/// DOT exporter implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DotExporter {
    options: RenderOptions,
}

/// Quotes a DOT identifier or label.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Packages that get drawn: extracted and non-empty.
fn rendered(package: &Package) -> bool {
    !package.is_stub && !package.files.is_empty()
}

/// Files that get a node: real files, plus blank-import stand-ins.
fn has_node(file: &File) -> bool {
    (!file.is_stub || file.is_blank_import) && !file.decls.is_empty()
}

impl DotExporter {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.options.resolution = resolution;
        self
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.options.palette = palette;
        self
    }

    pub fn with_multiple_references(mut self, show: bool) -> Self {
        self.options.show_multiple_references = show;
        self
    }

    fn write_header<W: Write>(&self, snapshot: &Snapshot, writer: &mut W) -> io::Result<()> {
        write!(
            writer,
            "digraph {{\n\tlabelloc=\"t\";\n\tlabel={};\n\trankdir=\"TB\";\n\tnode [shape=\"rect\"];\n",
            quote(&snapshot.module().path)
        )
    }

    fn write_file_nodes<W: Write>(&self, snapshot: &Snapshot, writer: &mut W) -> io::Result<()> {
        let palette = &self.options.palette;
        for package in snapshot.packages().filter(|p| rendered(p)) {
            let theme = palette.theme(package.in_import_cycle);
            write!(
                writer,
                "\n\tsubgraph {} {{\n\t\tlabel={};\n\t\tstyle=\"filled\";\n\t\tfontcolor=\"{}\";\n\t\tfillcolor=\"{}\";\n",
                quote(&format!("cluster_{}", package.uid)),
                quote(&package.module_relative_path(snapshot.module())),
                theme.package_name.hex(),
                theme.package_background.hex(),
            )?;
            for file in snapshot.files_of(package).filter(|f| has_node(f)) {
                let theme = palette.theme(file.in_import_cycle);
                write!(
                    writer,
                    "\n\t\t{} [label={}, style=\"filled\", fontcolor=\"{}\", fillcolor=\"{}\"];",
                    quote(&file.uid()),
                    quote(&file.file_name),
                    theme.file_name.hex(),
                    theme.file_background.hex(),
                )?;
            }
            writer.write_all(b"\n\t};\n")?;
        }
        Ok(())
    }

    fn write_file_edges<W: Write>(&self, snapshot: &Snapshot, writer: &mut W) -> io::Result<()> {
        let palette = &self.options.palette;
        for package in snapshot.packages().filter(|p| !p.is_stub) {
            for file in snapshot.files_of(package).filter(|f| !f.is_stub) {
                for import in file.imports.values() {
                    if snapshot.package(import.package).is_stub {
                        continue;
                    }
                    let targets = import
                        .referenced_decls
                        .iter()
                        .filter(|&(_, &target)| has_node(snapshot.file(target)));
                    for (name, &target) in targets {
                        let in_cycle = snapshot
                            .file(target)
                            .decls
                            .get(name)
                            .is_some_and(|decl| import.is_connected(decl));
                        write!(
                            writer,
                            "\n\t\t{} -> {} [color=\"{}\"];",
                            quote(&file.uid()),
                            quote(&snapshot.file(target).uid()),
                            palette.theme(in_cycle).import_arrow.hex(),
                        )?;
                        if !self.options.show_multiple_references {
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn write_package_nodes<W: Write>(&self, snapshot: &Snapshot, writer: &mut W) -> io::Result<()> {
        for package in snapshot.packages().filter(|p| rendered(p)) {
            let theme = self.options.palette.theme(package.in_import_cycle);
            write!(
                writer,
                "\n\t{} [label={}, style=\"filled\", fontcolor=\"{}\", fillcolor=\"{}\"];",
                quote(&package.uid),
                quote(&package.module_relative_path(snapshot.module())),
                theme.package_name.hex(),
                theme.package_background.hex(),
            )?;
        }
        Ok(())
    }

    fn write_package_edges<W: Write>(&self, snapshot: &Snapshot, writer: &mut W) -> io::Result<()> {
        // several files of a package may import the same package
        let mut written: HashSet<(PackageId, PackageId)> = HashSet::new();
        for &id in snapshot.package_ids() {
            let package = snapshot.package(id);
            if package.is_stub {
                continue;
            }
            for file in snapshot.files_of(package).filter(|f| !f.is_stub) {
                for import in file.imports.values() {
                    let target = snapshot.package(import.package);
                    if target.is_stub || !written.insert((id, import.package)) {
                        continue;
                    }
                    write!(
                        writer,
                        "\n\t{} -> {} [color=\"{}\"];",
                        quote(&package.uid),
                        quote(&target.uid),
                        self.options
                            .palette
                            .theme(import.in_import_cycle)
                            .import_arrow
                            .hex(),
                    )?;
                }
            }
        }
        Ok(())
    }
}

impl Exporter for DotExporter {
    fn export<W: Write>(&self, snapshot: &Snapshot, writer: &mut W) -> io::Result<()> {
        self.write_header(snapshot, writer)?;
        match self.options.resolution {
            Resolution::File => {
                self.write_file_nodes(snapshot, writer)?;
                self.write_file_edges(snapshot, writer)?;
            }
            Resolution::Package => {
                self.write_package_nodes(snapshot, writer)?;
                self.write_package_edges(snapshot, writer)?;
            }
        }
        writer.write_all(b"\n}\n")
    }
}
