// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI tool to benchmark the listener over both transports and write a report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sabench_benchmark::reporter::median_ratio;
use sabench_benchmark::{
    BenchmarkCategory, BenchmarkReport, BenchmarkResult, InProcessListener, JsonReporter,
    LatencyMetrics, LoadGenerator, ThroughputMetrics,
};
use sabench_core::capture::FileSink;
use sabench_core::{
    ListenAddress, ListenerConfig, ListenerMetrics, ListenerService, ProcessorKind, SocketPath,
};
use tempfile::TempDir;

#[derive(Parser)]
#[command(name = "run_benchmarks")]
#[command(about = "Benchmark the sabench listener over TCP and Unix sockets")]
struct Args {
    /// Output directory for benchmark data
    #[arg(short, long, default_value = "data")]
    output: PathBuf,

    /// Connections per benchmark
    #[arg(short = 'n', long, default_value_t = 2000)]
    connections: u64,

    /// Concurrent client connections
    #[arg(short, long, default_value_t = 16)]
    concurrency: usize,

    /// Request payload size in bytes (newline included)
    #[arg(short, long, default_value_t = 64)]
    payload: usize,

    /// Categories to run (all if not specified)
    #[arg(long)]
    category: Option<Vec<String>>,

    /// Run in quick mode (fewer connections)
    #[arg(long)]
    quick: bool,
}

#[derive(Clone, Copy)]
enum Transport {
    Tcp,
    Unix,
}

impl Transport {
    fn name(self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Unix => "unix",
        }
    }

    fn category(self) -> BenchmarkCategory {
        match self {
            Transport::Tcp => BenchmarkCategory::Tcp,
            Transport::Unix => BenchmarkCategory::Unix,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let connections = if args.quick { 200 } else { args.connections };

    println!("Sabench Listener Benchmark");
    println!("==========================");
    println!("Output directory: {:?}", args.output);
    println!(
        "Connections: {}, concurrency: {}, payload: {}B",
        connections, args.concurrency, args.payload
    );
    println!();

    let reporter = JsonReporter::new(&args.output)?;
    let scratch = TempDir::new().context("creating scratch directory")?;
    let mut report = BenchmarkReport::new();

    let run_all = args.category.is_none();
    let categories = args.category.unwrap_or_default();
    let should_run = |cat: BenchmarkCategory| -> bool {
        run_all
            || categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&cat.to_string()))
    };

    let request = echo_request(args.payload);
    let plan = [
        (Transport::Tcp, false),
        (Transport::Unix, false),
        (Transport::Tcp, true),
        (Transport::Unix, true),
    ];

    for (transport, capture) in plan {
        let category = if capture {
            BenchmarkCategory::Capture
        } else {
            transport.category()
        };
        if !should_run(category) {
            continue;
        }

        let name = format!(
            "{}_roundtrip{}",
            transport.name(),
            if capture { "_capture" } else { "" }
        );
        println!("Running {}...", name);

        let config = match transport {
            Transport::Tcp => ListenerConfig::tcp(ListenAddress::new("127.0.0.1", 0)?),
            Transport::Unix => {
                ListenerConfig::unix(SocketPath::new(scratch.path().join(format!("{}.sock", name)))?)
            }
        };
        let metrics = ListenerMetrics::unregistered()?;
        let mut service = ListenerService::new(config, metrics.clone())
            .with_processor(ProcessorKind::Echo.build());

        let capture_sink = if capture {
            let (sink, writer) = FileSink::create(scratch.path().join(format!("{}.sabcap", name)), metrics)
                .await
                .context("creating capture file")?;
            service = service.with_sink(Arc::new(sink.clone()));
            Some((sink, writer))
        } else {
            None
        };

        let listener = InProcessListener::start(service).await?;
        let run = LoadGenerator::new(listener.target().clone())
            .connections(connections)
            .concurrency(args.concurrency)
            .warmup(connections / 20)
            .request(request.clone())
            .run()
            .await?;
        let summary = listener.stop().await?;

        if let Some((sink, writer)) = capture_sink {
            sink.flush().await.context("flushing capture file")?;
            drop(sink);
            writer.join().await;
        }

        let result = BenchmarkResult::from_run(name.clone(), category, run, true)
            .with_metadata("transport", transport.name())
            .with_metadata("capture", capture)
            .with_metadata("payload_size_bytes", args.payload)
            .with_metadata("concurrency", args.concurrency)
            .with_metadata("listener_failed", summary.failed);
        println!(
            "  ✓ {} (p50={}, {} failures)",
            name,
            LatencyMetrics::format_latency(result.latency.p50_ns),
            result.failures
        );
        report.add_result(result);
    }

    let path = reporter.save(&report)?;
    println!();
    println!("Benchmark report saved to: {:?}", path);
    println!();

    print_summary(&report);
    Ok(())
}

/// Newline-terminated request of exactly `size` bytes.
fn echo_request(size: usize) -> Vec<u8> {
    let mut request = vec![b'x'; size.saturating_sub(1)];
    request.push(b'\n');
    request
}

fn print_summary(report: &BenchmarkReport) {
    println!("Summary");
    println!("-------");
    println!();

    for result in &report.results {
        println!(
            "{}: p50={}, p99={}, {:.0} exchanges/s, {}",
            result.name,
            LatencyMetrics::format_latency(result.latency.p50_ns),
            LatencyMetrics::format_latency(result.latency.p99_ns),
            result.throughput.exchanges_per_sec,
            ThroughputMetrics::format_bytes_per_sec(result.throughput.bytes_per_sec)
        );
    }

    if let Some(ratio) = median_ratio(report, BenchmarkCategory::Tcp, BenchmarkCategory::Unix) {
        println!();
        println!("Unix median latency is {:.0}% of TCP", ratio * 100.0);
    }
}
