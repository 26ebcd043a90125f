// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for scheduler lifecycle, task dispatch and failure events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// An event was accepted and assigned to a slot.
///
/// # Log Level
/// `info!`
pub struct EventStarted {
    pub event: u64,
    pub slot: usize,
}

impl Display for EventStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Event {} accepted into slot {}", self.event, self.slot)
    }
}

impl StructuredLog for EventStarted {
    fn log(&self) {
        tracing::info!(event = self.event, slot = self.slot, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("event", span_name = name, event = self.event, slot = self.slot)
    }
}

/// A task was handed to one of the dispatch queues.
///
/// # Log Level
/// `debug!` - high-frequency operational event
pub struct TaskDispatched<'a> {
    pub algorithm: &'a str,
    pub event: u64,
    pub slot: usize,
    pub rank: f32,
    pub queue: &'static str,
}

impl Display for TaskDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatching '{}' (rank {}) for event {} via {} queue",
            self.algorithm, self.rank, self.event, self.queue
        )
    }
}

impl StructuredLog for TaskDispatched<'_> {
    fn log(&self) {
        tracing::debug!(
            algorithm = self.algorithm,
            event = self.event,
            slot = self.slot,
            rank = self.rank,
            queue = self.queue,
            "{}",
            self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "task",
            span_name = name,
            algorithm = self.algorithm,
            event = self.event,
            queue = self.queue,
        )
    }
}

/// A task reported its outcome back to the activation loop.
///
/// # Log Level
/// `debug!` - high-frequency operational event
pub struct TaskCompleted<'a> {
    pub algorithm: &'a str,
    pub event: u64,
    pub outcome: &'a str,
}

impl Display for TaskCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "'{}' finished for event {}: {}",
            self.algorithm, self.event, self.outcome
        )
    }
}

impl StructuredLog for TaskCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            algorithm = self.algorithm,
            event = self.event,
            outcome = self.outcome,
            "{}",
            self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "task_completed",
            span_name = name,
            algorithm = self.algorithm,
            event = self.event,
        )
    }
}

/// An algorithm body failed; its event is failed as a whole.
///
/// # Log Level
/// `error!`
pub struct AlgorithmFailed<'a> {
    pub algorithm: &'a str,
    pub event: u64,
    pub error: &'a str,
}

impl Display for AlgorithmFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Algorithm '{}' failed for event {}: {}",
            self.algorithm, self.event, self.error
        )
    }
}

impl StructuredLog for AlgorithmFailed<'_> {
    fn log(&self) {
        tracing::error!(
            algorithm = self.algorithm,
            event = self.event,
            error = self.error,
            "{}",
            self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "algorithm_failed",
            span_name = name,
            algorithm = self.algorithm,
            event = self.event,
        )
    }
}

/// An event finished and was published to the finished-events queue.
///
/// # Log Level
/// `info!`
pub struct EventFinished {
    pub event: u64,
    pub slot: usize,
    pub failed: bool,
}

impl Display for EventFinished {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Event {} left slot {} ({})",
            self.event,
            self.slot,
            if self.failed { "failed" } else { "ok" }
        )
    }
}

impl StructuredLog for EventFinished {
    fn log(&self) {
        if self.failed {
            tracing::warn!(event = self.event, slot = self.slot, failed = true, "{}", self);
        } else {
            tracing::info!(event = self.event, slot = self.slot, failed = false, "{}", self);
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "event_finished",
            span_name = name,
            event = self.event,
            slot = self.slot,
            failed = self.failed,
        )
    }
}

/// A slot can make no further progress: no candidate work, nothing in
/// flight, control flow unresolved.
///
/// # Log Level
/// `error!` - accompanied by the slot state dump
pub struct StallDetected {
    pub event: u64,
    pub slot: usize,
}

impl Display for StallDetected {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stall detected: event {} in slot {} cannot make progress",
            self.event, self.slot
        )
    }
}

impl StructuredLog for StallDetected {
    fn log(&self) {
        tracing::error!(event = self.event, slot = self.slot, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("stall", span_name = name, event = self.event, slot = self.slot)
    }
}

/// The pre-run simulation of the execution flow converged.
///
/// # Log Level
/// `info!`
pub struct SimulationConverged {
    pub passes: usize,
    pub algorithms: usize,
}

impl Display for SimulationConverged {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Execution flow simulation resolved {} algorithm(s) in {} pass(es)",
            self.algorithms, self.passes
        )
    }
}

impl StructuredLog for SimulationConverged {
    fn log(&self) {
        tracing::info!(passes = self.passes, algorithms = self.algorithms, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "simulation",
            span_name = name,
            passes = self.passes,
            algorithms = self.algorithms,
        )
    }
}
