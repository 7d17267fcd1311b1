//! Export functionality for dependency snapshots.
//!
//! This module renders a finalized [`Snapshot`] as a Graphviz DOT graph
//! (file or package resolution) or as JSON for tooling.

pub mod dot;
pub mod json;

use std::io::{self, Write};

use crate::config::{Config, Palette};
use crate::graph::Snapshot;

pub use dot::DotExporter;
pub use json::JsonExporter;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Graphviz DOT - for rendering
    #[default]
    Dot,
    /// JSON format - machine-readable, full snapshot
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dot" | "gv" => Ok(ExportFormat::Dot),
            "json" => Ok(ExportFormat::Json),
            _ => Err(format!(
                "Unknown export format: '{}'. Valid formats: dot, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Dot => write!(f, "dot"),
            ExportFormat::Json => write!(f, "json"),
        }
    }
}

/// Granularity of the rendered graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// One node per file, clustered by package
    #[default]
    File,
    /// One node per package
    Package,
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Resolution::File),
            "package" => Ok(Resolution::Package),
            _ => Err(format!(
                "Unknown resolution: '{}'. Valid resolutions: file, package",
                s
            )),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::File => write!(f, "file"),
            Resolution::Package => write!(f, "package"),
        }
    }
}

/// Rendering settings shared by the exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    pub resolution: Resolution,
    pub palette: Palette,
    /// Draw one edge per referenced declaration instead of one per import
    pub show_multiple_references: bool,
}

impl From<&Config> for RenderOptions {
    fn from(config: &Config) -> Self {
        Self {
            resolution: config.resolution,
            palette: config.palette,
            show_multiple_references: config.show_multiple_references,
        }
    }
}

/// Trait for exporters.
pub trait Exporter {
    /// Export the snapshot to the given writer.
    fn export<W: Write>(&self, snapshot: &Snapshot, writer: &mut W) -> io::Result<()>;
}

/// Export a snapshot in the specified format.
pub fn export<W: Write>(
    format: ExportFormat,
    snapshot: &Snapshot,
    options: &RenderOptions,
    writer: &mut W,
) -> io::Result<()> {
    match format {
        ExportFormat::Dot => DotExporter::new(*options).export(snapshot, writer),
        ExportFormat::Json => JsonExporter.export(snapshot, writer),
    }
}

/// Export a snapshot to a string.
pub fn export_to_string(
    format: ExportFormat,
    snapshot: &Snapshot,
    options: &RenderOptions,
) -> io::Result<String> {
    let mut buffer = Vec::new();
    export(format, snapshot, options, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::graph::{GraphBuilder, Snapshot};
    use crate::parser::{DeclKind, Fact, ModuleInfo};

    /// `a` and `b` import each other; `c` imports `a` and blank-imports `b`;
    /// `main` imports `c`; `a` also uses the external `log`.
    pub(crate) fn sample_snapshot() -> Snapshot {
        let mut builder = GraphBuilder::new(ModuleInfo::new("github.com/fake/fake", "/m"));
        let batches: Vec<Vec<Fact>> = vec![
            vec![
                Fact::package("/m/a", "a"),
                Fact::file("/m/a/a.go"),
                Fact::import("github.com/fake/fake/b"),
                Fact::import("log"),
                Fact::reference("b", "B"),
                Fact::reference("b", "B2"),
                Fact::reference("log", "Println"),
                Fact::decl(DeclKind::Func, "A"),
            ],
            vec![
                Fact::package("/m/b", "b"),
                Fact::file("/m/b/b.go"),
                Fact::import("github.com/fake/fake/a"),
                Fact::reference("a", "A"),
                Fact::decl(DeclKind::Func, "B"),
            ],
            vec![
                Fact::package("/m/b", "b"),
                Fact::file("/m/b/b2.go"),
                Fact::decl(DeclKind::Const, "B2"),
            ],
            vec![
                Fact::package("/m/c", "c"),
                Fact::file("/m/c/c.go"),
                Fact::import("github.com/fake/fake/a"),
                Fact::import_as("github.com/fake/fake/b", "_"),
                Fact::reference("a", "A"),
                Fact::decl(DeclKind::Type, "C"),
            ],
            vec![
                Fact::package("/m", "main"),
                Fact::file("/m/main.go"),
                Fact::import("github.com/fake/fake/c"),
                Fact::reference("c", "C"),
                Fact::decl(DeclKind::Func, "main"),
            ],
        ];
        for batch in batches {
            builder.reset_context();
            builder.submit_all(batch).unwrap();
        }
        builder.finalize().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("dot".parse::<ExportFormat>().unwrap(), ExportFormat::Dot);
        assert_eq!("DOT".parse::<ExportFormat>().unwrap(), ExportFormat::Dot);
        assert_eq!("gv".parse::<ExportFormat>().unwrap(), ExportFormat::Dot);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("csv".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_export_format_display() {
        assert_eq!(format!("{}", ExportFormat::Dot), "dot");
        assert_eq!(format!("{}", ExportFormat::Json), "json");
    }

    #[test]
    fn test_resolution_round_trip() {
        for resolution in [Resolution::File, Resolution::Package] {
            assert_eq!(resolution.to_string().parse::<Resolution>().unwrap(), resolution);
        }
        assert!("module".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_render_options_from_config() {
        let config = Config::from_yaml_str("resolution: package\nshowMultipleReferences: true\n")
            .unwrap();
        let options = RenderOptions::from(&config);
        assert_eq!(options.resolution, Resolution::Package);
        assert!(options.show_multiple_references);
        assert_eq!(options.palette, Palette::default());
    }

    #[test]
    fn test_export_dispatch() {
        let snapshot = fixtures::sample_snapshot();
        let options = RenderOptions::default();

        let dot = export_to_string(ExportFormat::Dot, &snapshot, &options).unwrap();
        assert!(dot.starts_with("digraph {"));

        let json = export_to_string(ExportFormat::Json, &snapshot, &options).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&json).is_ok());
    }
}
