// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The algorithm contract the scheduler drives.
//!
//! Algorithms are opaque to the scheduler: it only cares about the declared
//! attributes (data dependencies, instance cardinality, blocking and
//! offloading behavior) and the outcome of `execute`. Algorithm bodies run
//! on worker tasks and must not assume any particular thread; accelerated
//! algorithms are free to suspend across `.await` points while waiting for
//! offloaded work.

use crate::slot::EventContext;
use async_trait::async_trait;

/// Outcome of one algorithm execution over one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlgOutcome {
    /// The algorithm ran and accepted the event.
    Accepted,
    /// The algorithm ran and rejected the event.
    Rejected,
    /// The algorithm body failed; the event is failed as a whole.
    Error(String),
}

#[async_trait]
pub trait Algorithm: Send + Sync {
    /// Unique algorithm name; also the key in the resource pool.
    fn name(&self) -> &str;

    /// Fully qualified identifiers of the data objects this algorithm reads.
    fn inputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Fully qualified identifiers of the data objects this algorithm writes.
    fn outputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Maximum number of concurrent instances; 0 means re-entrant
    /// (unlimited concurrent executions of the single instance).
    fn cardinality(&self) -> u32 {
        1
    }

    /// Whether additional instances may be cloned on demand.
    fn is_clonable(&self) -> bool {
        false
    }

    /// CPU-blocking algorithms are dispatched through the dedicated
    /// blocking queue when preemptive blocking scheduling is enabled.
    fn is_blocking(&self) -> bool {
        false
    }

    /// Accelerator-offloaded algorithms run on the offload pool and may
    /// suspend while awaiting external completion.
    fn is_asynchronous(&self) -> bool {
        false
    }

    /// Run the algorithm over one event.
    async fn execute(&self, context: &EventContext) -> AlgOutcome;
}
