// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Event slots: the per-event workspace the scheduler operates on.
//!
//! A slot bundles the event context, the algorithm state machine, the
//! control flow decision vector and the catalog of data already produced in
//! this event. Slots are allocated from a fixed pool, reset on reuse and
//! never shared between events.
//!
//! A slot may additionally own *sub-slots* (event views): nested slots
//! rooted at a named decision node, used for per-region processing. Sub
//! slots share the precedence graph but carry independent state and
//! decision vectors. They live inside their whole-event slot and are
//! addressed by a [`SlotPath`] instead of parent pointers, which keeps the
//! graph traversals free of aliasing.

use crate::graph::{DataIndex, NodeIndex};
use crate::state::AlgExecStates;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Opaque identity of an event being processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventContext {
    /// Monotonic event number assigned by the driver.
    pub event_number: u64,
    /// Slot the scheduler assigned this event to, once accepted.
    pub slot: Option<usize>,
    /// Sub-slot index when this context belongs to an event view.
    pub sub_slot: Option<usize>,
}

impl EventContext {
    pub fn new(event_number: u64) -> Self {
        Self {
            event_number,
            slot: None,
            sub_slot: None,
        }
    }
}

impl fmt::Display for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {}", self.event_number)?;
        if let Some(slot) = self.slot {
            write!(f, " [slot {}", slot)?;
            if let Some(sub) = self.sub_slot {
                write!(f, ".{}", sub)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// Selects which slot a graph traversal currently operates on: the
/// whole-event slot itself, or one of its sub-slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPath {
    Whole,
    Sub(usize),
}

/// The per-event workspace.
pub struct EventSlot {
    /// Context of the event currently occupying the slot.
    pub context: Option<EventContext>,
    /// Vector of algorithm states.
    pub states: AlgExecStates,
    /// State of the control flow: one entry per graph node, -1 undecided,
    /// 0 negative, 1 positive.
    pub control_flow: Vec<i8>,
    /// Data objects already produced in this slot.
    pub produced: HashSet<DataIndex>,
    /// Flags completion of the event.
    pub complete: bool,
    /// Set when any algorithm of this slot errored; blocks further dispatch.
    pub failed: bool,
    /// Decision node this slot is rooted at; `None` for whole-event slots.
    pub entry_point: Option<NodeIndex>,
    /// Event views spawned within this event. Only whole-event slots own
    /// sub-slots; nesting is one level deep.
    pub sub_slots: Vec<EventSlot>,
    /// Sub-slot indices grouped by the decision node they entered from.
    pub sub_slots_by_node: HashMap<NodeIndex, Vec<usize>>,
    /// Cause/effect pairs observed while tracing is enabled, drained when
    /// the event is signed off.
    pub trace_edges: Vec<(String, String)>,
}

impl EventSlot {
    /// Create an empty slot for a graph with `alg_count` algorithms and
    /// `node_count` control flow nodes.
    pub fn new(alg_count: usize, node_count: usize) -> Self {
        Self {
            context: None,
            states: AlgExecStates::new(alg_count),
            control_flow: vec![-1; node_count],
            produced: HashSet::new(),
            complete: false,
            failed: false,
            entry_point: None,
            sub_slots: Vec::new(),
            sub_slots_by_node: HashMap::new(),
            trace_edges: Vec::new(),
        }
    }

    /// Reset all resources in order to reuse the slot for a new event.
    pub fn reset(&mut self, context: EventContext) {
        self.context = Some(context);
        self.states.reset();
        self.control_flow.fill(-1);
        self.produced.clear();
        self.complete = false;
        self.failed = false;
        self.sub_slots.clear();
        self.sub_slots_by_node.clear();
        self.trace_edges.clear();
    }

    /// Spawn a sub-slot rooted at `node`, registering it under that node's
    /// entry in `sub_slots_by_node`. Returns the sub-slot index.
    pub fn make_sub_slot(&mut self, node: NodeIndex, mut context: EventContext) -> usize {
        let index = self.sub_slots.len();
        context.sub_slot = Some(index);

        let mut sub = EventSlot::new(self.states.len(), self.control_flow.len());
        sub.context = Some(context);
        sub.entry_point = Some(node);

        self.sub_slots.push(sub);
        self.sub_slots_by_node.entry(node).or_default().push(index);
        index
    }

    /// The slot a path selects within this whole-event slot.
    pub fn at(&self, path: SlotPath) -> &EventSlot {
        match path {
            SlotPath::Whole => self,
            SlotPath::Sub(i) => &self.sub_slots[i],
        }
    }

    /// Mutable access to the slot a path selects.
    pub fn at_mut(&mut self, path: SlotPath) -> &mut EventSlot {
        match path {
            SlotPath::Whole => self,
            SlotPath::Sub(i) => &mut self.sub_slots[i],
        }
    }

    /// All slot paths under this whole-event slot, itself first.
    pub fn paths(&self) -> Vec<SlotPath> {
        let mut paths = Vec::with_capacity(1 + self.sub_slots.len());
        paths.push(SlotPath::Whole);
        for i in 0..self.sub_slots.len() {
            paths.push(SlotPath::Sub(i));
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AlgState;

    #[test]
    fn reset_clears_everything() {
        let mut slot = EventSlot::new(2, 3);
        slot.reset(EventContext::new(7));
        slot.states.set(0, AlgState::ControlReady).unwrap();
        slot.control_flow[1] = 1;
        slot.produced.insert(DataIndex(0));
        slot.failed = true;
        slot.make_sub_slot(NodeIndex(2), EventContext::new(7));

        slot.reset(EventContext::new(8));
        assert_eq!(slot.context.as_ref().map(|c| c.event_number), Some(8));
        assert_eq!(slot.states.get(0), AlgState::Initial);
        assert_eq!(slot.control_flow, vec![-1, -1, -1]);
        assert!(slot.produced.is_empty());
        assert!(!slot.failed);
        assert!(slot.sub_slots.is_empty());
        assert!(slot.sub_slots_by_node.is_empty());
    }

    #[test]
    fn sub_slots_are_registered_by_node() {
        let mut slot = EventSlot::new(1, 2);
        slot.reset(EventContext::new(1));
        let a = slot.make_sub_slot(NodeIndex(1), EventContext::new(1));
        let b = slot.make_sub_slot(NodeIndex(1), EventContext::new(1));
        assert_eq!((a, b), (0, 1));
        assert_eq!(slot.sub_slots_by_node[&NodeIndex(1)], vec![0, 1]);
        assert_eq!(slot.sub_slots[0].entry_point, Some(NodeIndex(1)));
        assert_eq!(slot.sub_slots[1].context.as_ref().unwrap().sub_slot, Some(1));
        assert_eq!(slot.paths().len(), 3);
    }

    #[test]
    fn path_selection() {
        let mut slot = EventSlot::new(1, 1);
        slot.reset(EventContext::new(1));
        let i = slot.make_sub_slot(NodeIndex(0), EventContext::new(1));
        slot.at_mut(SlotPath::Sub(i)).control_flow[0] = 1;
        assert_eq!(slot.at(SlotPath::Sub(i)).control_flow[0], 1);
        assert_eq!(slot.at(SlotPath::Whole).control_flow[0], -1);
    }
}
