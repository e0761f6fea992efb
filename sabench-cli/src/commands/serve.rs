// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `sabench inet` and `sabench unix` - run the listener until a signal.
//!
//! Configuration is validated and the capture file opened before any socket
//! is bound. Once the listener stops, the capture sink is flushed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use sabench_core::capture::FileSink;
use sabench_core::config::EndpointConfig;
use sabench_core::{
    ConfigLoader, ListenAddress, ListenerConfig, ListenerError, ListenerMetrics, ListenerService,
    ProcessorKind, Settings, SocketMode, SocketPath,
};

use super::CliError;
use crate::metrics;

/// Flags shared by both transports.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub promport: u16,
    /// `Some` when capture is enabled.
    pub capture_file: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub processor: Option<ProcessorKind>,
}

pub async fn inet(ip: &str, port: u16, options: &ServeOptions) -> Result<(), CliError> {
    // Rejected before anything is bound
    let address = ListenAddress::new(ip, port)?;
    let settings = load_settings(options)?;
    run(EndpointConfig::Tcp(address), settings, options).await
}

pub async fn unix(path: &Path, mode: Option<&str>, options: &ServeOptions) -> Result<(), CliError> {
    let path = SocketPath::new(path)?;
    let mut settings = load_settings(options)?;
    if let Some(mode) = mode {
        settings.socket_mode = SocketMode::parse_octal(mode)?;
    }
    run(
        EndpointConfig::Unix {
            path,
            mode: settings.socket_mode,
        },
        settings,
        options,
    )
    .await
}

fn load_settings(options: &ServeOptions) -> Result<Settings, CliError> {
    let mut settings = match &options.config {
        Some(path) => {
            tracing::info!(config = %path.display(), "Loading listener configuration");
            ConfigLoader::load_file(path)?
        }
        None => Settings::default(),
    };
    if let Some(processor) = options.processor {
        settings.processor = processor;
    }
    Ok(settings)
}

async fn run(
    endpoint: EndpointConfig,
    settings: Settings,
    options: &ServeOptions,
) -> Result<(), CliError> {
    let config = ListenerConfig::with_settings(endpoint, &settings);
    let listener_metrics =
        ListenerMetrics::register(&metrics::REGISTRY).map_err(ListenerError::from)?;

    let capture = match &options.capture_file {
        Some(path) => Some(FileSink::create(path, listener_metrics.clone()).await?),
        None => None,
    };

    let token = CancellationToken::new();
    spawn_signal_watcher(token.clone())?;
    let metrics_server = metrics::spawn_server(options.promport, token.clone());

    let mut service = ListenerService::new(config, listener_metrics)
        .with_processor(settings.processor.build());
    if let Some((sink, _)) = &capture {
        service = service.with_sink(Arc::new(sink.clone()));
    }

    let mut watcher = service.subscribe();
    let announce = tokio::spawn(async move {
        if let Some(endpoint) = watcher.listening().await {
            println!("▶ Listening on {}", endpoint);
            println!("  Press Ctrl+C to stop...");
        }
    });

    let result = service.run(token.clone()).await;
    // Stops the metrics server and the signal watcher.
    token.cancel();
    announce.abort();

    if let Some((sink, writer)) = capture {
        match sink.flush().await {
            Ok(()) => tracing::info!(file = %sink.path().display(), "Capture flushed"),
            Err(e) => tracing::error!(error = %e, "Failed to flush capture file"),
        }
        drop(sink);
        writer.join().await;
    }
    if let Err(e) = metrics_server.await {
        tracing::warn!(error = %e, "Metrics server task failed");
    }

    let summary = result?;
    println!(
        "✓ Stopped: {} accepted, {} failed, {} force-closed",
        summary.accepted, summary.failed, summary.forced_closed
    );
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM.
fn spawn_signal_watcher(token: CancellationToken) -> Result<(), CliError> {
    let mut terminate = signal(SignalKind::terminate()).map_err(|source| CliError::Io {
        context: "installing SIGTERM handler",
        source,
    })?;

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received, shutting down"),
            _ = terminate.recv() => tracing::info!("SIGTERM received, shutting down"),
            _ = token.cancelled() => return,
        }
        token.cancel();
    });
    Ok(())
}
