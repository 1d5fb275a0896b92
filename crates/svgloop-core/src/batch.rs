//! Runs independent refinement loops over many images.
//!
//! Each image gets its own loop instance; nothing mutable is shared between items apart from
//! the progress counter and the stop flag used when `continue_on_error` is off.

use crate::error::{Error, ErrorKind, Result};
use crate::model::{FinalResult, TerminalReason};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchInput {
    Paths(Vec<PathBuf>),
    /// A glob pattern such as `images/*.png`.
    Pattern(String),
}

impl BatchInput {
    pub fn resolve(&self) -> Result<Vec<PathBuf>> {
        match self {
            BatchInput::Paths(paths) => {
                if paths.is_empty() {
                    return Err(Error::input("batch input list is empty"));
                }
                Ok(paths.clone())
            }
            BatchInput::Pattern(pattern) => {
                let entries = glob::glob(pattern).map_err(|err| {
                    Error::input(format!("invalid glob pattern '{pattern}': {err}"))
                })?;
                let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).collect();
                paths.sort();
                if paths.is_empty() {
                    return Err(Error::input(format!(
                        "no files match the pattern '{pattern}'"
                    )));
                }
                Ok(paths)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub parallel: bool,
    pub max_workers: usize,
    pub continue_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: 3,
            continue_on_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub input: PathBuf,
    pub output: PathBuf,
    pub quality_score: f64,
    pub iterations: u32,
    pub terminal_reason: TerminalReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub filename: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Items never started because an earlier failure stopped the batch.
    pub skipped: usize,
    /// A failure stopped the batch (`continue_on_error` was off).
    pub aborted: bool,
    pub results: Vec<BatchItem>,
    pub errors: Vec<BatchFailure>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl BatchResult {
    pub fn average_quality(&self) -> Option<f64> {
        if self.results.is_empty() {
            return None;
        }
        Some(self.results.iter().map(|r| r.quality_score).sum::<f64>() / self.results.len() as f64)
    }

    pub fn average_iterations(&self) -> Option<f64> {
        if self.results.is_empty() {
            return None;
        }
        Some(
            self.results.iter().map(|r| f64::from(r.iterations)).sum::<f64>()
                / self.results.len() as f64,
        )
    }
}

/// `(file name, completed, total, quality)`; quality is 0.0 for failed items.
pub type BatchProgress<'a> = dyn Fn(&str, usize, usize, f64) + Sync + 'a;

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `<dir>/<stem>.svg`; inputs sharing a stem keep their extension to stay distinct.
pub fn output_paths(inputs: &[PathBuf], output_dir: &Path) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string());
            let mut name = format!("{stem}.svg");
            if !seen.insert(name.clone()) {
                let ext = input
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default();
                name = format!("{stem}.{ext}.svg");
                seen.insert(name.clone());
            }
            output_dir.join(name)
        })
        .collect()
}

enum Outcome {
    Done(BatchItem),
    Failed(BatchFailure),
    Skipped,
}

/// Runs `run_one(input, output)` for every resolved input.
pub fn run_batch<F>(
    input: &BatchInput,
    output_dir: &Path,
    options: &BatchOptions,
    run_one: F,
    on_item: Option<&BatchProgress<'_>>,
) -> Result<BatchResult>
where
    F: Fn(&Path, &Path) -> Result<FinalResult> + Sync,
{
    let inputs = input.resolve()?;
    std::fs::create_dir_all(output_dir)?;
    let outputs = output_paths(&inputs, output_dir);
    let total = inputs.len();
    let started = Instant::now();
    let completed = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    info!(
        total,
        parallel = options.parallel,
        workers = options.max_workers,
        output_dir = %output_dir.display(),
        "starting batch"
    );

    let process = |src: &PathBuf, dst: &PathBuf| -> Outcome {
        if stop.load(Ordering::SeqCst) {
            return Outcome::Skipped;
        }
        let name = display_name(src);
        let outcome = match run_one(src.as_path(), dst.as_path()) {
            Ok(result) => Outcome::Done(BatchItem {
                input: src.clone(),
                output: dst.clone(),
                quality_score: result.quality_score,
                iterations: result.iterations,
                terminal_reason: result.terminal_reason,
            }),
            Err(err) => {
                error!(file = %name, kind = %err.kind(), error = %err, "batch item failed");
                if !options.continue_on_error {
                    stop.store(true, Ordering::SeqCst);
                }
                Outcome::Failed(BatchFailure {
                    filename: name.clone(),
                    kind: err.kind(),
                    message: err.to_string(),
                })
            }
        };
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        let quality = match &outcome {
            Outcome::Done(item) => item.quality_score,
            _ => 0.0,
        };
        info!(file = %name, done, total, quality, "batch item finished");
        if let Some(callback) = on_item {
            callback(&name, done, total, quality);
        }
        outcome
    };

    let outcomes: Vec<Outcome> = if options.parallel {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.max_workers.max(1))
            .build()
            .map_err(|err| Error::config(format!("cannot start worker pool: {err}")))?;
        pool.install(|| {
            inputs
                .par_iter()
                .zip(outputs.par_iter())
                .map(|(src, dst)| process(src, dst))
                .collect()
        })
    } else {
        inputs
            .iter()
            .zip(outputs.iter())
            .map(|(src, dst)| process(src, dst))
            .collect()
    };

    let mut result = BatchResult {
        total,
        successful: 0,
        failed: 0,
        skipped: 0,
        aborted: stop.load(Ordering::SeqCst),
        results: Vec::new(),
        errors: Vec::new(),
        elapsed: started.elapsed(),
    };
    for outcome in outcomes {
        match outcome {
            Outcome::Done(item) => {
                result.successful += 1;
                result.results.push(item);
            }
            Outcome::Failed(failure) => {
                result.failed += 1;
                result.errors.push(failure);
            }
            Outcome::Skipped => result.skipped += 1,
        }
    }
    if result.aborted {
        warn!(skipped = result.skipped, "batch stopped after a failure");
    }
    info!(
        successful = result.successful,
        failed = result.failed,
        elapsed_secs = result.elapsed.as_secs_f64(),
        "batch finished"
    );
    Ok(result)
}
