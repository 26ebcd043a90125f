//! Rank-ordered task queue for scheduled algorithms.
//!
//! Entries pop in ascending rank order; ties are broken by insertion order,
//! so equal-rank tasks behave as a FIFO. The scheduler keeps one queue per
//! task class (normal / CPU-blocking / accelerator-offloaded) and only the
//! activation loop touches them, so no internal synchronization is needed.

use crate::graph::NodeIndex;
use crate::slot::{EventContext, SlotPath};
use crate::traits::AlgHandle;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Everything the scheduler needs to run one algorithm over one slot view.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub alg_index: usize,
    pub node_index: NodeIndex,
    pub alg_name: String,
    pub rank: f32,
    pub blocking: bool,
    pub accelerated: bool,
    pub slot_index: usize,
    pub path: SlotPath,
    pub context: EventContext,
}

/// A task spec paired with the algorithm instance checked out for it.
pub struct ScheduledTask {
    pub spec: TaskSpec,
    pub handle: AlgHandle,
}

struct Entry {
    task: ScheduledTask,
    seq: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap is a max-heap; reverse both keys so that the smallest
    // rank pops first and equal ranks pop in insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .task
            .spec
            .rank
            .total_cmp(&self.task.spec.rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue keyed by ascending algorithm rank.
pub struct RankedTaskQueue {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

impl RankedTaskQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub fn push(&mut self, task: ScheduledTask) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Entry { task, seq });
    }

    pub fn pop(&mut self) -> Option<ScheduledTask> {
        self.heap.pop().map(|entry| entry.task)
    }

    pub fn peek(&self) -> Option<&TaskSpec> {
        self.heap.peek().map(|entry| &entry.task.spec)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Default for RankedTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::StubAlgorithm;
    use std::sync::Arc;

    fn task(name: &str, rank: f32) -> ScheduledTask {
        ScheduledTask {
            spec: TaskSpec {
                alg_index: 0,
                node_index: NodeIndex(0),
                alg_name: name.to_string(),
                rank,
                blocking: false,
                accelerated: false,
                slot_index: 0,
                path: SlotPath::Whole,
                context: EventContext::new(0),
            },
            handle: AlgHandle {
                name: name.to_string(),
                algorithm: Arc::new(StubAlgorithm::new(name)),
            },
        }
    }

    #[test]
    fn pops_in_ascending_rank_order() {
        let mut queue = RankedTaskQueue::new();
        queue.push(task("high", 5.0));
        queue.push(task("low", 1.0));
        queue.push(task("mid", 3.0));

        assert_eq!(queue.pop().unwrap().spec.alg_name, "low");
        assert_eq!(queue.pop().unwrap().spec.alg_name, "mid");
        assert_eq!(queue.pop().unwrap().spec.alg_name, "high");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn equal_ranks_are_fifo() {
        let mut queue = RankedTaskQueue::new();
        for name in ["first", "second", "third"] {
            queue.push(task(name, 2.0));
        }
        assert_eq!(queue.pop().unwrap().spec.alg_name, "first");
        assert_eq!(queue.pop().unwrap().spec.alg_name, "second");
        assert_eq!(queue.pop().unwrap().spec.alg_name, "third");
    }

    #[test]
    fn peek_does_not_remove() {
        let mut queue = RankedTaskQueue::new();
        queue.push(task("only", 0.0));
        assert_eq!(queue.peek().unwrap().alg_name, "only");
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_empty());
    }
}
