// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Sabench Benchmarking Framework
//!
//! Measures the sabench listener over its two transport bindings.
//!
//! # Benchmark Categories
//!
//! - **TCP**: one-exchange connections against the TCP/IP binding
//! - **Unix**: the same load against the Unix domain socket binding
//! - **Capture**: either binding with the capture sink enabled
//!
//! # Data Output
//!
//! Runs are summarized into JSON reports for later comparison.

pub mod harness;
pub mod metrics;
pub mod reporter;

pub use harness::{InProcessListener, LoadGenerator, LoadRun, Target};
pub use metrics::{
    BenchmarkCategory, BenchmarkReport, BenchmarkResult, LatencyMetrics, SystemInfo,
    ThroughputMetrics,
};
pub use reporter::JsonReporter;
