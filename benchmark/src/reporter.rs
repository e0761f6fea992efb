// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! JSON reports.
//!
//! Each report is written to `<output>/sabench_<timestamp>.json` and can be
//! loaded back to compare runs.

use crate::metrics::{BenchmarkCategory, BenchmarkReport};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Report I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Writes and reads benchmark reports in one directory.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, ReporterError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save `report` under a name derived from its timestamp.
    pub fn save(&self, report: &BenchmarkReport) -> Result<PathBuf, ReporterError> {
        let filename = format!(
            "sabench_{}.json",
            report.timestamp.format("%Y-%m-%dT%H-%M-%S%.3fZ")
        );
        let filepath = self.output_dir.join(filename);

        let writer = BufWriter::new(File::create(&filepath)?);
        serde_json::to_writer_pretty(writer, report)?;
        Ok(filepath)
    }

    /// Reports in the output directory, oldest first.
    pub fn list_reports(&self) -> Result<Vec<PathBuf>, ReporterError> {
        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.output_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                reports.push(path);
            }
        }
        reports.sort();
        Ok(reports)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<BenchmarkReport, ReporterError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// Median latency of `candidate` relative to `baseline` within one report,
/// e.g. `0.6` when the candidate takes 60% of the baseline's time.
pub fn median_ratio(
    report: &BenchmarkReport,
    baseline: BenchmarkCategory,
    candidate: BenchmarkCategory,
) -> Option<f64> {
    let median = |category: BenchmarkCategory| {
        report
            .results
            .iter()
            .find(|r| r.category == category)
            .map(|r| r.latency.p50_ns)
            .filter(|&ns| ns > 0)
    };
    Some(median(candidate)? as f64 / median(baseline)? as f64)
}
