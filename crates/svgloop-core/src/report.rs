//! Observational JSON summaries. Nothing in the crate reads them back.

use crate::batch::{BatchFailure, BatchItem, BatchResult};
use crate::error::Result;
use crate::model::{FinalMetrics, FinalResult, IterationRecord, TerminalReason};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub input: PathBuf,
    pub output: PathBuf,
    pub quality_score: f64,
    pub iterations: u32,
    pub terminal_reason: TerminalReason,
    pub metrics: FinalMetrics,
    pub elapsed_secs: Option<f64>,
    pub history: Vec<IterationRecord>,
}

impl RunReport {
    pub fn new(input: &Path, output: &Path, result: &FinalResult) -> Self {
        Self {
            generated_at: Utc::now(),
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            quality_score: result.quality_score,
            iterations: result.iterations,
            terminal_reason: result.terminal_reason,
            metrics: result.metrics,
            elapsed_secs: result.metadata.get("elapsed_secs").and_then(|v| v.as_f64()),
            history: result.history.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: bool,
    pub elapsed_secs: f64,
    pub average_quality: Option<f64>,
    pub average_iterations: Option<f64>,
    pub results: Vec<BatchItem>,
    pub errors: Vec<BatchFailure>,
}

impl From<&BatchResult> for BatchReport {
    fn from(result: &BatchResult) -> Self {
        Self {
            generated_at: Utc::now(),
            total: result.total,
            successful: result.successful,
            failed: result.failed,
            skipped: result.skipped,
            aborted: result.aborted,
            elapsed_secs: result.elapsed.as_secs_f64(),
            average_quality: result.average_quality(),
            average_iterations: result.average_iterations(),
            results: result.results.clone(),
            errors: result.errors.clone(),
        }
    }
}

/// Pretty-printed JSON; parent directories are created.
pub fn write_json_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut bytes = serde_json::to_vec_pretty(report)?;
    bytes.push(b'\n');
    std::fs::write(path, bytes)?;
    debug!(path = %path.display(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[test]
    fn batch_report_carries_averages() {
        let result = BatchResult {
            total: 3,
            successful: 2,
            failed: 1,
            skipped: 0,
            aborted: false,
            results: vec![
                BatchItem {
                    input: "a.png".into(),
                    output: "out/a.svg".into(),
                    quality_score: 0.8,
                    iterations: 2,
                    terminal_reason: TerminalReason::BudgetExhausted,
                },
                BatchItem {
                    input: "c.png".into(),
                    output: "out/c.svg".into(),
                    quality_score: 0.9,
                    iterations: 4,
                    terminal_reason: TerminalReason::ThresholdReached,
                },
            ],
            errors: vec![BatchFailure {
                filename: "b.png".into(),
                kind: ErrorKind::InputValidation,
                message: "file not found".into(),
            }],
            elapsed: Duration::from_millis(1500),
        };

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reports/batch.json");
        write_json_report(&path, &BatchReport::from(&result)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["total"], 3);
        assert_eq!(value["average_iterations"], 3.0);
        assert!((value["average_quality"].as_f64().unwrap() - 0.85).abs() < 1e-9);
        assert_eq!(value["errors"][0]["kind"], "input_validation");
        assert_eq!(value["elapsed_secs"], 1.5);
        assert_eq!(value["results"][1]["terminal_reason"], "threshold_reached");
    }
}
