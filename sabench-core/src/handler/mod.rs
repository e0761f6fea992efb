// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Connection handling: the exchange driver and the processors it calls.

mod connection;
mod processor;

pub use connection::{Connection, ConnectionHandler, Exchange, HandlerLimits};
pub use processor::{JsonLineAck, LineEcho, Processor, ProcessorKind};
