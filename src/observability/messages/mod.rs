// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Messages are organized by subsystem:
//!
//! * `scheduler` - event lifecycle, task dispatch and stall reporting
//!
//! # Usage
//! ```rust
//! use avalanche::observability::messages::{scheduler::EventStarted, StructuredLog};
//!
//! EventStarted { event: 42, slot: 0 }.log();
//! ```

pub mod scheduler;

use tracing::Span;

/// Trait for messages that support structured logging and tracing spans.
///
/// `log()` emits the human-readable message together with machine-readable
/// fields at the level matching the message's severity; `span()` creates a
/// `tracing` span carrying the same fields as attributes.
pub trait StructuredLog {
    /// Emit a log event with structured fields.
    fn log(&self);

    /// Create a span with this message's fields as attributes.
    fn span(&self, name: &str) -> Span;
}
