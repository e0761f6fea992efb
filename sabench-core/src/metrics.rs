// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Prometheus instruments owned by the listener.
//!
//! Registered into a caller-supplied registry; serving them over HTTP is the
//! caller's business.

use prometheus::{
    histogram_opts, opts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Registry,
};

use crate::error::FailureKind;
use crate::types::TransportKind;

/// Buckets focused on sub-millisecond local round trips.
const EXCHANGE_BUCKETS: &[f64] = &[
    0.000_05, 0.000_1, 0.000_25, 0.000_5, 0.001, 0.002_5, 0.005, 0.010, 0.050, 0.250, 1.0,
];

/// Counters, gauges and histograms for one or more listeners.
#[derive(Debug, Clone)]
pub struct ListenerMetrics {
    connections_accepted: IntCounterVec,
    connections_active: IntGaugeVec,
    handler_failures: IntCounterVec,
    accept_errors: IntCounterVec,
    exchange_duration: HistogramVec,
    capture_write_failures: IntCounter,
    drain_forced_closes: IntCounter,
}

impl ListenerMetrics {
    /// Create the instruments and register them with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self::unregistered()?;
        registry.register(Box::new(metrics.connections_accepted.clone()))?;
        registry.register(Box::new(metrics.connections_active.clone()))?;
        registry.register(Box::new(metrics.handler_failures.clone()))?;
        registry.register(Box::new(metrics.accept_errors.clone()))?;
        registry.register(Box::new(metrics.exchange_duration.clone()))?;
        registry.register(Box::new(metrics.capture_write_failures.clone()))?;
        registry.register(Box::new(metrics.drain_forced_closes.clone()))?;
        Ok(metrics)
    }

    /// Create instruments that are not exported anywhere.
    pub fn unregistered() -> Result<Self, prometheus::Error> {
        Ok(Self {
            connections_accepted: IntCounterVec::new(
                opts!(
                    "sabench_connections_accepted_total",
                    "Connections accepted by the listener"
                ),
                &["transport"],
            )?,
            connections_active: IntGaugeVec::new(
                opts!(
                    "sabench_connections_active",
                    "Connections currently being handled"
                ),
                &["transport"],
            )?,
            handler_failures: IntCounterVec::new(
                opts!(
                    "sabench_handler_failures_total",
                    "Connections whose exchange failed"
                ),
                &["transport", "kind"],
            )?,
            accept_errors: IntCounterVec::new(
                opts!("sabench_accept_errors_total", "Errors returned by accept"),
                &["transport"],
            )?,
            exchange_duration: HistogramVec::new(
                histogram_opts!(
                    "sabench_exchange_duration_seconds",
                    "Time from accept to response written",
                    EXCHANGE_BUCKETS.to_vec()
                ),
                &["transport"],
            )?,
            capture_write_failures: IntCounter::with_opts(opts!(
                "sabench_capture_write_failures_total",
                "Capture records that could not be written"
            ))?,
            drain_forced_closes: IntCounter::with_opts(opts!(
                "sabench_drain_forced_closes_total",
                "Connections closed forcibly at the drain deadline"
            ))?,
        })
    }

    pub fn connection_accepted(&self, transport: TransportKind) {
        self.connections_accepted
            .with_label_values(&[transport.as_str()])
            .inc();
        self.connections_active
            .with_label_values(&[transport.as_str()])
            .inc();
    }

    pub fn connection_finished(&self, transport: TransportKind) {
        self.connections_active
            .with_label_values(&[transport.as_str()])
            .dec();
    }

    pub fn handler_failed(&self, transport: TransportKind, kind: FailureKind) {
        self.handler_failures
            .with_label_values(&[transport.as_str(), kind.as_str()])
            .inc();
    }

    pub fn accept_failed(&self, transport: TransportKind) {
        self.accept_errors
            .with_label_values(&[transport.as_str()])
            .inc();
    }

    pub fn observe_exchange(&self, transport: TransportKind, seconds: f64) {
        self.exchange_duration
            .with_label_values(&[transport.as_str()])
            .observe(seconds);
    }

    pub fn capture_write_failed(&self) {
        self.capture_write_failures.inc();
    }

    /// Records the capture writer could not persist.
    pub fn capture_writes_dropped(&self, count: u64) {
        self.capture_write_failures.inc_by(count);
    }

    pub fn forced_closes(&self, count: u64) {
        self.drain_forced_closes.inc_by(count);
    }

    pub fn accepted_total(&self, transport: TransportKind) -> u64 {
        self.connections_accepted
            .with_label_values(&[transport.as_str()])
            .get()
    }

    pub fn active(&self, transport: TransportKind) -> i64 {
        self.connections_active
            .with_label_values(&[transport.as_str()])
            .get()
    }

    pub fn failures(&self, transport: TransportKind, kind: FailureKind) -> u64 {
        self.handler_failures
            .with_label_values(&[transport.as_str(), kind.as_str()])
            .get()
    }

    pub fn accept_errors_total(&self, transport: TransportKind) -> u64 {
        self.accept_errors
            .with_label_values(&[transport.as_str()])
            .get()
    }

    pub fn capture_failures_total(&self) -> u64 {
        self.capture_write_failures.get()
    }

    pub fn forced_closes_total(&self) -> u64 {
        self.drain_forced_closes.get()
    }
}
