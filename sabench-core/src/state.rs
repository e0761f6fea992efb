// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Listener lifecycle state machine.
//!
//! Implements the service lifecycle: Created → Listening → Draining → Stopped.
//! A failed bind goes straight from Created to Stopped. The current state is
//! published on a watch channel so callers can wait for `Listening`.


use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::StateTransitionError;
use crate::types::Endpoint;

/// Service lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    /// Constructed, not yet bound.
    Created,

    /// Bound; the accept loop is running.
    Listening,

    /// Cancellation observed; in-flight connections are finishing.
    Draining,

    /// Accept loop exited and every connection has completed or been closed.
    Stopped,
}

impl ServiceState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Listening => "Listening",
            Self::Draining => "Draining",
            Self::Stopped => "Stopped",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: ServiceState) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Listening)
                | (Self::Created, Self::Stopped)
                | (Self::Listening, Self::Draining)
                | (Self::Draining, Self::Stopped)
        )
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Snapshot published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub state: ServiceState,
    /// Set once bound; for TCP this carries the effective (ephemeral) port.
    pub endpoint: Option<Endpoint>,
}

/// State machine for the listener lifecycle.
#[derive(Debug)]
pub struct ServiceStateMachine {
    current_state: ServiceState,
    transition_count: u64,
    publisher: watch::Sender<LifecycleSnapshot>,
}

impl ServiceStateMachine {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(LifecycleSnapshot {
            state: ServiceState::Created,
            endpoint: None,
        });
        Self {
            current_state: ServiceState::Created,
            transition_count: 0,
            publisher,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.current_state
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Subscribe to lifecycle changes.
    pub fn subscribe(&self) -> LifecycleWatcher {
        LifecycleWatcher {
            rx: self.publisher.subscribe(),
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: ServiceState) -> Result<(), StateTransitionError> {
        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            from = self.current_state.name(),
            to = target.name(),
            "Listener state transition"
        );

        self.current_state = target;
        self.transition_count += 1;
        self.publisher.send_modify(|snapshot| snapshot.state = target);

        Ok(())
    }

    /// Record the bound endpoint and move to `Listening` in one step.
    pub fn mark_listening(&mut self, endpoint: Endpoint) -> Result<(), StateTransitionError> {
        self.publisher
            .send_modify(|snapshot| snapshot.endpoint = Some(endpoint));
        self.transition_to(ServiceState::Listening)
    }
}

impl Default for ServiceStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the lifecycle channel.
#[derive(Debug, Clone)]
pub struct LifecycleWatcher {
    rx: watch::Receiver<LifecycleSnapshot>,
}

impl LifecycleWatcher {
    pub fn current(&self) -> LifecycleSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait until the listener has bound and return its endpoint.
    ///
    /// Returns `None` if the service stopped without ever listening.
    pub async fn listening(&mut self) -> Option<Endpoint> {
        let snapshot = self
            .rx
            .wait_for(|s| s.state != ServiceState::Created)
            .await
            .ok()?;
        match snapshot.state {
            ServiceState::Stopped if snapshot.endpoint.is_none() => None,
            _ => snapshot.endpoint.clone(),
        }
    }
}
