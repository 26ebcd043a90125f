// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types for the scheduler runtime.

use crate::errors::{GraphError, StateError};
use thiserror::Error;

/// Errors surfaced by the scheduler's public operations and by the
/// activation loop.
///
/// Resource starvation is deliberately absent here: an algorithm with no
/// free instance is parked in the RESOURCELESS state and retried when
/// instances free up, so the condition never reaches a caller.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// `push_new_event` was called with no free event slot.
    /// The caller is expected to retry after draining a finished event.
    #[error("no free event slot available")]
    SlotUnavailable,

    /// A batch push requested more slots than are currently free.
    /// Nothing from the batch is scheduled.
    #[error("not enough free slots for a batch of {requested} events ({available} available)")]
    BatchTooLarge { requested: usize, available: usize },

    /// The scheduler has been deactivated and no longer accepts work.
    #[error("scheduler is shut down")]
    SchedulerShutdown,

    /// The activation loop hit a terminal failure; no further events are
    /// accepted or finished.
    #[error("scheduler is in a failure state")]
    SchedulerFailure,

    /// No active slot is processing the given event.
    #[error("no active slot is processing event {0}")]
    UnknownEvent(u64),

    /// An algorithm body reported an error; its event is failed.
    #[error("algorithm '{algorithm}' failed: {message}")]
    AlgorithmError { algorithm: String, message: String },

    /// A slot can make no further progress and has no work in flight.
    #[error("event {event} stalled: no algorithm can make progress")]
    Stalled { event: u64 },

    /// A state machine violation while mutating slot state.
    #[error(transparent)]
    State(#[from] StateError),

    /// A graph-level error (typically from resolving names at runtime).
    #[error(transparent)]
    Graph(#[from] GraphError),
}
