// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Sabench CLI
//!
//! Command-line front-end for the sabench listener service.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use sabench_core::config::{DEFAULT_TCP_ADDRESS, DEFAULT_UNIX_SOCKET_PATH};
use sabench_core::ProcessorKind;
use tracing_subscriber::EnvFilter;

mod commands;
mod metrics;

use commands::{serve::ServeOptions, CliError};

/// Sabench - TCP vs Unix domain socket listener benchmark
#[derive(Parser)]
#[command(name = "sabench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Prometheus scrape port
    #[arg(long, default_value_t = 8081)]
    pub promport: u16,

    /// Capture every request and response to the capture file
    #[arg(long)]
    pub capture: bool,

    /// Capture file path (used with --capture)
    #[arg(long, default_value = "cd-capture.sabcap")]
    pub capture_file: PathBuf,

    /// Listener tunables file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Request processor, overrides the config file
    #[arg(long)]
    pub processor: Option<ProcessorKind>,

    /// Runtime worker threads (defaults to the number of CPUs)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Listen on a TCP/IP socket
    Inet {
        /// Listening IP address
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,

        /// Port to use, otherwise the OS will choose
        #[arg(long, default_value_t = 0)]
        port: u16,
    },

    /// Listen on a Unix domain socket
    Unix {
        /// Path of the socket file
        #[arg(long, default_value = DEFAULT_UNIX_SOCKET_PATH)]
        path: PathBuf,

        /// Octal permission bits of the socket file, overrides the config file
        #[arg(long)]
        mode: Option<String>,
    },

    /// Print the records of a capture file
    Inspect {
        /// Path to the capture file
        file: PathBuf,

        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let workers = cli.workers.unwrap_or_else(num_cpus::get).max(1);
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("✗ Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(workers, "Runtime started");

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {}", e);
            if e.is_usage_error() {
                eprintln!();
                let _ = Cli::command().print_help();
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let options = ServeOptions {
        promport: cli.promport,
        capture_file: cli.capture.then_some(cli.capture_file),
        config: cli.config,
        processor: cli.processor,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Inet { ip, port } => commands::serve::inet(&ip, port, &options).await,
        Commands::Unix { path, mode } => {
            commands::serve::unix(&path, mode.as_deref(), &options).await
        }
        Commands::Inspect { file, limit } => commands::inspect::execute(&file, limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_inet_defaults() {
        let cli = Cli::try_parse_from(["sabench", "inet"]).unwrap();
        assert_eq!(cli.promport, 8081);
        assert!(!cli.capture);
        match cli.command {
            Commands::Inet { ip, port } => {
                assert_eq!(format!("{}:{}", ip, port), DEFAULT_TCP_ADDRESS);
            }
            _ => panic!("expected inet"),
        }
    }

    #[test]
    fn test_global_flags_and_unix() {
        let cli = Cli::try_parse_from([
            "sabench",
            "--capture",
            "--processor",
            "echo",
            "--promport",
            "9100",
            "unix",
            "--mode",
            "600",
        ])
        .unwrap();
        assert!(cli.capture);
        assert_eq!(cli.processor, Some(ProcessorKind::Echo));
        assert_eq!(cli.promport, 9100);
        match cli.command {
            Commands::Unix { path, mode } => {
                assert_eq!(path, PathBuf::from(DEFAULT_UNIX_SOCKET_PATH));
                assert_eq!(mode.as_deref(), Some("600"));
            }
            _ => panic!("expected unix"),
        }
    }

    #[test]
    fn test_unknown_processor_rejected() {
        assert!(Cli::try_parse_from(["sabench", "--processor", "xml", "inet"]).is_err());
    }
}
