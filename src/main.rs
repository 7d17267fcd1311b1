use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use depscope::analysis::{self, PipelineOptions};
use depscope::config::Config;
use depscope::export::{self, ExportFormat, RenderOptions, Resolution};

#[derive(Parser)]
#[command(name = "depscope")]
#[command(author = "Zachary Woods <143150513+zach-fau@users.noreply.github.com>")]
#[command(version)]
#[command(about = "Go package dependency grapher with import cycle highlighting", long_about = None)]
struct Cli {
    /// Directory to analyze; the enclosing go.mod defines the module
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    /// File to write the graph to (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resolution at which to visualize dependencies: file or package
    #[arg(short, long)]
    resolution: Option<Resolution>,

    /// Output format: dot or json
    #[arg(short, long, default_value = "dot")]
    format: ExportFormat,

    /// Draw one edge per referenced declaration instead of one per import
    #[arg(long)]
    show_multiple_references: bool,

    /// Number of extraction workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Capacity of the fact queue, in files
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Comma-separated build tags, as for `go build -tags`
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Target operating system for build constraints
    #[arg(long)]
    goos: Option<String>,

    /// Target architecture for build constraints
    #[arg(long)]
    goarch: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Configuration file settings, overridden by explicit flags.
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_yaml_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(resolution) = self.resolution {
            config.resolution = resolution;
        }
        if self.show_multiple_references {
            config.show_multiple_references = true;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(goos) = &self.goos {
            config.build.goos = goos.clone();
        }
        if let Some(goarch) = &self.goarch {
            config.build.goarch = goarch.clone();
        }
        config
            .build
            .tags
            .extend(self.tags.iter().filter(|t| !t.is_empty()).cloned());
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.load_config()?;
    let options: PipelineOptions = config.pipeline_options();
    info!(
        path = %cli.path.display(),
        resolution = %config.resolution,
        format = %cli.format,
        workers = options.workers,
        goos = %options.build.goos,
        goarch = %options.build.goarch,
        "depscope starting"
    );

    let snapshot = tokio::select! {
        result = analysis::analyze(&cli.path, options) => {
            result.with_context(|| format!("failed to analyze {}", cli.path.display()))?
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            anyhow::bail!("interrupted");
        }
    };

    let rendered = export::export_to_string(cli.format, &snapshot, &RenderOptions::from(&config))
        .context("failed to render graph")?;

    match &cli.output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => io::stdout()
            .write_all(rendered.as_bytes())
            .context("failed to write output")?,
    }
    Ok(())
}
