//! Parallel driver for the per-file extraction tool
//!
//! A fixed pool of scoped worker threads pulls file paths from a shared
//! queue, runs the extractor on each and sends back one result per file.
//! Failures are captured in the result, never short-circuit the pool.
//!
//! ```text
//!   files ──▶ [ work queue ] ──▶ worker 0..N ──▶ [ result queue ] ──▶ caller
//! ```

use crossbeam::channel;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;

/// Outcome of extracting one compilation unit
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub file: PathBuf,
    pub output: String,
    pub error: Option<String>,
}

/// Produces declaration text for one compilation unit
pub trait FileExtractor: Sync {
    fn extract(&self, file: &Path) -> Result<String, String>;
}

impl<F> FileExtractor for F
where
    F: Fn(&Path) -> Result<String, String> + Sync,
{
    fn extract(&self, file: &Path) -> Result<String, String> {
        self(file)
    }
}

/// Runs the external extraction binary against a compilation database
#[derive(Debug, Clone)]
pub struct ToolExtractor {
    pub binary: PathBuf,
    pub compile_db: PathBuf,
}

impl ToolExtractor {
    pub fn new(binary: impl Into<PathBuf>, compile_db: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            compile_db: compile_db.into(),
        }
    }
}

impl FileExtractor for ToolExtractor {
    fn extract(&self, file: &Path) -> Result<String, String> {
        // The tool may be built against a different clang than the kernel,
        // which produces extra warnings.
        let output = Command::new(&self.binary)
            .arg("-p")
            .arg(&self.compile_db)
            .arg(file)
            .arg("--extra-arg=-w")
            .output()
            .map_err(|e| format!("failed to run {}: {}", self.binary.display(), e))?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.trim().is_empty() {
            Err(output.status.to_string())
        } else {
            Err(stderr.into_owned())
        }
    }
}

/// Number of workers to use when the caller does not specify one
pub fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Extract every file with `workers` threads; returns results in arrival order
///
/// Blocks until exactly one result per input file has been received.
pub fn run_extraction<E: FileExtractor>(
    extractor: &E,
    files: Vec<PathBuf>,
    workers: usize,
) -> Vec<ExtractionResult> {
    let total = files.len();
    let workers = workers.max(1).min(total.max(1));
    let (file_tx, file_rx) = channel::bounded::<PathBuf>(total.max(1));
    let (out_tx, out_rx) = channel::bounded::<ExtractionResult>(total.max(1));
    tracing::info!("extracting {} files with {} workers", total, workers);

    thread::scope(|scope| {
        for _ in 0..workers {
            let file_rx = file_rx.clone();
            let out_tx = out_tx.clone();
            scope.spawn(move || {
                for file in file_rx.iter() {
                    let result = match extractor.extract(&file) {
                        Ok(output) => ExtractionResult {
                            file,
                            output,
                            error: None,
                        },
                        Err(error) => ExtractionResult {
                            file,
                            output: String::new(),
                            error: Some(error),
                        },
                    };
                    if out_tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(out_tx);

        let queued = enqueue(&file_tx, files);
        drop(file_tx);

        let results: Vec<ExtractionResult> = out_rx.iter().take(queued).collect();
        tracing::debug!("received {} extraction results", results.len());
        results
    })
}

/// Queue files for the workers, returning how many were accepted
///
/// The channel holds every file, so sending only fails once all workers
/// have exited.
fn enqueue(file_tx: &channel::Sender<PathBuf>, files: Vec<PathBuf>) -> usize {
    let total = files.len();
    let mut queued = 0;
    for file in files {
        if let Err(err) = file_tx.send(file) {
            tracing::error!(
                "no extraction workers left; dropping {} and {} more files",
                err.into_inner().display(),
                total - queued - 1
            );
            break;
        }
        queued += 1;
    }
    queued
}
