// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Result types for listener benchmarks.
//!
//! Everything here serializes to the JSON report written by
//! [`crate::JsonReporter`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use sysinfo::System;

use crate::harness::LoadRun;

/// What a benchmark measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkCategory {
    /// Exchanges over the TCP binding
    Tcp,
    /// Exchanges over the Unix domain socket binding
    Unix,
    /// Exchanges with the capture sink enabled
    Capture,
}

impl std::fmt::Display for BenchmarkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchmarkCategory::Tcp => write!(f, "tcp"),
            BenchmarkCategory::Unix => write!(f, "unix"),
            BenchmarkCategory::Capture => write!(f, "capture"),
        }
    }
}

/// Latency distribution of one run, in nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub std_dev_ns: f64,
    /// Sorted samples, downsampled to at most [`MAX_KEPT_SAMPLES`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<u64>>,
}

/// Upper bound on raw samples stored in a report.
pub const MAX_KEPT_SAMPLES: usize = 1000;

/// Nearest-rank percentile of sorted, non-empty `samples`.
fn percentile(sorted: &[u64], q: f64) -> u64 {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl LatencyMetrics {
    pub fn from_samples(mut samples: Vec<u64>, keep_raw: bool) -> Self {
        if samples.is_empty() {
            return Self {
                min_ns: 0,
                max_ns: 0,
                mean_ns: 0.0,
                p50_ns: 0,
                p95_ns: 0,
                p99_ns: 0,
                std_dev_ns: 0.0,
                samples: None,
            };
        }

        samples.sort_unstable();
        let len = samples.len() as f64;
        let mean_ns = samples.iter().map(|&s| s as f64).sum::<f64>() / len;
        let variance = samples
            .iter()
            .map(|&s| (s as f64 - mean_ns).powi(2))
            .sum::<f64>()
            / len;

        let kept = keep_raw.then(|| {
            let step = samples.len().div_ceil(MAX_KEPT_SAMPLES).max(1);
            samples.iter().step_by(step).copied().collect()
        });

        Self {
            min_ns: samples[0],
            max_ns: samples[samples.len() - 1],
            mean_ns,
            p50_ns: percentile(&samples, 0.50),
            p95_ns: percentile(&samples, 0.95),
            p99_ns: percentile(&samples, 0.99),
            std_dev_ns: variance.sqrt(),
            samples: kept,
        }
    }

    /// Human-readable latency (ns, μs, ms or s).
    pub fn format_latency(ns: u64) -> String {
        match ns {
            0..=999 => format!("{}ns", ns),
            1_000..=999_999 => format!("{:.2}μs", ns as f64 / 1e3),
            1_000_000..=999_999_999 => format!("{:.2}ms", ns as f64 / 1e6),
            _ => format!("{:.2}s", ns as f64 / 1e9),
        }
    }
}

/// Exchanges and bytes per second over a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMetrics {
    pub exchanges_per_sec: f64,
    pub bytes_per_sec: f64,
    pub total_exchanges: u64,
    pub total_bytes: u64,
    pub duration_ns: u64,
}

impl ThroughputMetrics {
    pub fn calculate(exchanges: u64, bytes: u64, duration_ns: u64) -> Self {
        let secs = (duration_ns.max(1)) as f64 / 1e9;
        Self {
            exchanges_per_sec: exchanges as f64 / secs,
            bytes_per_sec: bytes as f64 / secs,
            total_exchanges: exchanges,
            total_bytes: bytes,
            duration_ns,
        }
    }

    pub fn format_bytes_per_sec(bps: f64) -> String {
        if bps < 1e3 {
            format!("{:.2} B/s", bps)
        } else if bps < 1e6 {
            format!("{:.2} KB/s", bps / 1e3)
        } else if bps < 1e9 {
            format!("{:.2} MB/s", bps / 1e6)
        } else {
            format!("{:.2} GB/s", bps / 1e9)
        }
    }
}

/// Host the benchmark ran on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub os_version: String,
    pub kernel_version: Option<String>,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub memory_bytes: u64,
    pub hostname: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let unknown = || "Unknown".to_string();
        Self {
            os: System::name().unwrap_or_else(unknown),
            os_version: System::os_version().unwrap_or_else(unknown),
            kernel_version: System::kernel_version(),
            cpu_model: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().to_string())
                .unwrap_or_else(unknown),
            cpu_cores: sys.cpus().len(),
            memory_bytes: sys.total_memory(),
            hostname: System::host_name().unwrap_or_else(unknown),
        }
    }
}

/// One measured configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub name: String,
    pub category: BenchmarkCategory,
    pub latency: LatencyMetrics,
    pub throughput: ThroughputMetrics,
    /// Exchanges that did not produce a response.
    pub failures: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl BenchmarkResult {
    /// Summarize a load run.
    pub fn from_run(
        name: impl Into<String>,
        category: BenchmarkCategory,
        run: LoadRun,
        keep_raw_samples: bool,
    ) -> Self {
        let exchanges = run.samples.len() as u64;
        let duration_ns = run.elapsed.as_nanos() as u64;
        Self {
            name: name.into(),
            category,
            throughput: ThroughputMetrics::calculate(exchanges, run.bytes, duration_ns),
            latency: LatencyMetrics::from_samples(run.samples, keep_raw_samples),
            failures: run.failures,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata value; values that cannot be represented as JSON are skipped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), value);
        }
        self
    }
}

/// Complete suite report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub benchmark_suite: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub results: Vec<BenchmarkResult>,
}

impl BenchmarkReport {
    pub fn new() -> Self {
        Self {
            benchmark_suite: "sabench-listener".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            system_info: SystemInfo::collect(),
            results: Vec::new(),
        }
    }

    pub fn add_result(&mut self, result: BenchmarkResult) {
        self.results.push(result);
    }

    pub fn find(&self, name: &str) -> Option<&BenchmarkResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

impl Default for BenchmarkReport {
    fn default() -> Self {
        Self::new()
    }
}
