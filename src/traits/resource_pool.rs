// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Algorithm resource pool: hands out algorithm instances for execution.
//!
//! An instance is checked out when a task moves to SCHEDULED and returned
//! by the completion closure. When no instance is free the task parks in
//! RESOURCELESS and is retried once instances are released. Pool operations
//! are internally synchronized; the scheduler is effectively the single
//! caller (checkout from the activation loop, return from completion
//! closures running on the same loop).

use crate::graph::PrecedenceGraph;
use crate::traits::Algorithm;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A checked-out algorithm instance.
pub struct AlgHandle {
    /// Name the instance was acquired under.
    pub name: String,
    /// The algorithm to run.
    pub algorithm: Arc<dyn Algorithm>,
}

pub trait AlgResourcePool: Send + Sync {
    /// Check out an instance of the named algorithm, if one is free.
    fn acquire(&self, name: &str) -> Option<AlgHandle>;

    /// Return a previously acquired instance.
    fn release(&self, handle: AlgHandle);
}

struct PoolEntry {
    algorithm: Arc<dyn Algorithm>,
    /// 0 means re-entrant: unlimited concurrent executions.
    cardinality: u32,
    in_use: u32,
}

/// A pool with a fixed number of instances per algorithm, derived from each
/// algorithm's declared cardinality.
pub struct FixedAlgPool {
    entries: Mutex<HashMap<String, PoolEntry>>,
}

impl FixedAlgPool {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register an algorithm under its own name and cardinality.
    pub fn register(&self, algorithm: Arc<dyn Algorithm>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            algorithm.name().to_string(),
            PoolEntry {
                cardinality: algorithm.cardinality(),
                algorithm,
                in_use: 0,
            },
        );
    }

    /// Build a pool holding every algorithm registered in the graph.
    pub fn from_graph(graph: &PrecedenceGraph) -> Self {
        let pool = Self::new();
        for node in graph.algorithm_nodes() {
            pool.register(node.algorithm.clone());
        }
        pool
    }
}

impl Default for FixedAlgPool {
    fn default() -> Self {
        Self::new()
    }
}

impl AlgResourcePool for FixedAlgPool {
    fn acquire(&self, name: &str) -> Option<AlgHandle> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get_mut(name)?;
        if entry.cardinality != 0 && entry.in_use >= entry.cardinality {
            return None;
        }
        entry.in_use += 1;
        Some(AlgHandle {
            name: name.to_string(),
            algorithm: entry.algorithm.clone(),
        })
    }

    fn release(&self, handle: AlgHandle) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(&handle.name) {
            entry.in_use = entry.in_use.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::StubAlgorithm;

    #[test]
    fn cardinality_caps_concurrent_checkouts() {
        let pool = FixedAlgPool::new();
        pool.register(Arc::new(StubAlgorithm::new("a").with_cardinality(2)));

        let h1 = pool.acquire("a").expect("first instance");
        let _h2 = pool.acquire("a").expect("second instance");
        assert!(pool.acquire("a").is_none());

        pool.release(h1);
        assert!(pool.acquire("a").is_some());
    }

    #[test]
    fn reentrant_algorithms_are_unlimited() {
        let pool = FixedAlgPool::new();
        pool.register(Arc::new(StubAlgorithm::new("r").with_cardinality(0)));
        for _ in 0..16 {
            assert!(pool.acquire("r").is_some());
        }
    }

    #[test]
    fn unknown_algorithm_yields_nothing() {
        let pool = FixedAlgPool::new();
        assert!(pool.acquire("ghost").is_none());
    }
}
