// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

use sabench_core::{BindError, CaptureError, HardValidationError, ListenerError};
use thiserror::Error;

pub mod inspect;
pub mod serve;

/// Anything that makes the process exit non-zero.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] HardValidationError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    /// Whether the usage text should be printed after the error.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::Listener(ListenerError::Bind(BindError::InvalidAddress { .. }))
        )
    }
}
