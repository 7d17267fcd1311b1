//! The concurrent fact stream pipeline.
//!
//! Extraction producers run on the blocking pool and send one batch of facts
//! per file over a bounded channel. A single consumer task owns the
//! [`GraphBuilder`] and applies batches in arrival order. Every stage shares
//! one cancellation token; the first failure is kept and cancels the rest.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::constraints::BuildContext;
use super::{AnalysisError, AnalysisResult};
use crate::graph::{GraphBuilder, Snapshot};
use crate::parser::{discover_module, FileFacts, GoExtractor, ModuleInfo, SyntaxExtractor};

/// Default bound of the fact queue, in file batches.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &["testdata", "vendor"];

/// Tuning knobs for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Number of extraction producers
    pub workers: usize,
    /// Capacity of the bounded fact queue
    pub queue_capacity: usize,
    /// Platform and tags selecting which files are compiled
    pub build: BuildContext,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            build: BuildContext::default(),
        }
    }
}

/// Available parallelism, falling back to a single worker.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Collects the Go source files under `root` that `build` compiles, sorted.
///
/// Test files are skipped, as are `testdata` and `vendor` directories and
/// files or directories whose names start with `.` or `_`. Remaining files
/// must satisfy their name suffix and `//go:build` constraints.
pub fn enumerate_source_files(root: &Path, build: &BuildContext) -> AnalysisResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !name.ends_with(".go")
            || name.ends_with("_test.go")
            || name.starts_with('.')
            || name.starts_with('_')
        {
            continue;
        }
        if !build.matches_file_name(&name) {
            debug!(path = %entry.path().display(), "excluded by file name");
            continue;
        }
        let text = fs::read_to_string(entry.path())?;
        let included = build
            .matches_source(&text)
            .map_err(|source| AnalysisError::Constraint {
                path: entry.path().display().to_string(),
                source,
            })?;
        if included {
            files.push(entry.into_path());
        } else {
            debug!(path = %entry.path().display(), "excluded by build constraint");
        }
    }
    files.sort();
    Ok(files)
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name.starts_with('_') || SKIPPED_DIRS.contains(&name.as_ref())
}

/// Discovers the module containing `path` and builds its snapshot with the
/// Go extractor.
///
/// When `path` is a directory only the files beneath it are analysed;
/// otherwise the whole module is.
pub async fn analyze(path: &Path, options: PipelineOptions) -> AnalysisResult<Snapshot> {
    let module = discover_module(path)?;
    let root = if path.is_dir() {
        path.canonicalize()?
    } else {
        module.root.clone()
    };
    let files = enumerate_source_files(&root, &options.build)?;
    Pipeline::new(GoExtractor::new(), options)
        .run(module, files)
        .await
}

/// Keeps the first failure of a run and cancels everything else.
struct FirstError {
    slot: Mutex<Option<AnalysisError>>,
    cancel: CancellationToken,
}

impl FirstError {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            slot: Mutex::new(None),
            cancel,
        }
    }

    fn fail(&self, err: AnalysisError) {
        {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                warn!(error = %err, "pipeline failed, cancelling");
                *slot = Some(err);
            } else {
                debug!(error = %err, "dropping error after first failure");
            }
        }
        self.cancel.cancel();
    }

    fn take(&self) -> Option<AnalysisError> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// A reusable pipeline around one extractor.
///
/// # Example
///
/// ```ignore
/// use depscope::analysis::{enumerate_source_files, BuildContext, Pipeline, PipelineOptions};
/// use depscope::parser::{discover_module, GoExtractor};
///
/// let module = discover_module(Path::new("."))?;
/// let files = enumerate_source_files(&module.root, &BuildContext::host())?;
/// let snapshot = Pipeline::new(GoExtractor::new(), PipelineOptions::default())
///     .run(module, files)
///     .await?;
/// ```
pub struct Pipeline<E> {
    extractor: Arc<E>,
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl<E: SyntaxExtractor + 'static> Pipeline<E> {
    pub fn new(extractor: E, options: PipelineOptions) -> Self {
        Self {
            extractor: Arc::new(extractor),
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts every run of this pipeline when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Extracts `files`, builds the graph, and returns the finalized snapshot.
    ///
    /// No snapshot is returned if any stage fails; the error is the first
    /// one recorded.
    pub async fn run(&self, module: ModuleInfo, files: Vec<PathBuf>) -> AnalysisResult<Snapshot> {
        let workers = self.options.workers.max(1).min(files.len().max(1));
        info!(
            module = %module.path,
            files = files.len(),
            workers,
            "starting analysis"
        );

        let cancel = self.cancel.child_token();
        let failure = Arc::new(FirstError::new(cancel.clone()));
        let (tx, mut rx) = mpsc::channel::<FileFacts>(self.options.queue_capacity.max(1));

        let mut producers = JoinSet::new();
        for chunk in round_robin(files, workers) {
            let tx = tx.clone();
            let extractor = Arc::clone(&self.extractor);
            let failure = Arc::clone(&failure);
            let cancel = cancel.clone();
            producers.spawn_blocking(move || {
                for path in chunk {
                    if cancel.is_cancelled() {
                        return;
                    }
                    debug!(path = %path.display(), "extracting");
                    match extractor.extract(&path) {
                        Ok(facts) => {
                            // consumer gone: it either finished or failed
                            if tx.blocking_send(FileFacts::new(path, facts)).is_err() {
                                return;
                            }
                        }
                        Err(source) => {
                            failure.fail(AnalysisError::Extraction {
                                path: path.display().to_string(),
                                source,
                            });
                            return;
                        }
                    }
                }
            });
        }
        drop(tx);

        let consumer = {
            let failure = Arc::clone(&failure);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut builder = GraphBuilder::new(module);
                loop {
                    let batch = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return None,
                        batch = rx.recv() => batch,
                    };
                    let Some(batch) = batch else {
                        return Some(builder);
                    };
                    debug!(
                        path = %batch.path().display(),
                        facts = batch.facts.len(),
                        "applying facts"
                    );
                    builder.reset_context();
                    if let Err(err) = builder.submit_all(batch.facts) {
                        failure.fail(err.into());
                        return None;
                    }
                }
            })
        };

        let builder = match consumer.await {
            Ok(builder) => builder,
            Err(err) => {
                failure.fail(AnalysisError::Task(err.to_string()));
                None
            }
        };

        while let Some(joined) = producers.join_next().await {
            if let Err(err) = joined {
                failure.fail(AnalysisError::Task(err.to_string()));
            }
        }

        if let Some(err) = failure.take() {
            return Err(err);
        }
        let builder = builder.ok_or(AnalysisError::Cancelled)?;
        let snapshot = builder.finalize()?;
        info!(
            packages = snapshot.package_count(),
            files = snapshot.file_count(),
            cycles = snapshot.cycles().len(),
            "analysis complete"
        );
        Ok(snapshot)
    }
}

/// Deals `files` out to `workers` chunks in turn.
fn round_robin(files: Vec<PathBuf>, workers: usize) -> Vec<Vec<PathBuf>> {
    let mut chunks: Vec<Vec<PathBuf>> = vec![Vec::new(); workers];
    for (idx, file) in files.into_iter().enumerate() {
        chunks[idx % workers].push(file);
    }
    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}
