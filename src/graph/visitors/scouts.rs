// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Lineage scouts: read-only probes that decide whether a decision
//! propagation branch is still active for a slot.
//!
//! A branch is inactive when the parent hub already holds a decision, or
//! when the probing node is out of sequence in a sequential hub (an earlier
//! sibling is still unresolved). The sub-slot variant additionally requires
//! the walk to cross the sub-slot's entry point before it can declare a
//! whole-event lineage active.

use crate::graph::{NodeIndex, PrecedenceGraph};
use crate::slot::{EventSlot, SlotPath};

/// Scout for whole-event slots.
pub struct ActiveLineageScout {
    path: SlotPath,
    start: NodeIndex,
    previous: NodeIndex,
    active: bool,
}

impl ActiveLineageScout {
    pub fn new(path: SlotPath, start: NodeIndex) -> Self {
        Self {
            path,
            start,
            previous: start,
            active: true,
        }
    }

    pub fn reply(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.active = true;
        self.previous = self.start;
    }

    /// Probe one parent hub; returns the final verdict for this lineage.
    pub fn probe(&mut self, graph: &PrecedenceGraph, slot: &EventSlot, parent: NodeIndex) -> bool {
        self.visit(graph, slot, parent);
        self.reply()
    }

    fn visit(&mut self, graph: &PrecedenceGraph, slot: &EventSlot, node: NodeIndex) -> bool {
        // A resolved hub cannot be (re)activated by this lineage
        if slot.at(self.path).control_flow[node.0] != -1 {
            self.active = false;
            return self.active;
        }

        let Some(hub) = graph.decision(node) else {
            self.active = false;
            return self.active;
        };

        // The sender must not be out of sequence within a sequential hub
        if !hub.concurrent {
            for &child in &hub.children {
                if child == self.previous {
                    break;
                }
                if slot.at(self.path).control_flow[child.0] == -1 {
                    self.active = false;
                    return self.active;
                }
            }
        }

        self.visit_parents(graph, slot, node);
        self.reply()
    }

    fn visit_parents(&mut self, graph: &PrecedenceGraph, slot: &EventSlot, node: NodeIndex) {
        let Some(hub) = graph.decision(node) else {
            return;
        };
        for &parent in &hub.parents {
            self.active = true;
            self.previous = node;
            self.visit(graph, slot, parent);
            // Any active parent means this node is active
            if self.reply() {
                break;
            }
        }
    }
}

/// Scout for sub-slot lineages. Active only when the walk crossed the
/// sub-slot's entry point into the whole-event slot.
pub struct SubSlotScout {
    path: SlotPath,
    start: NodeIndex,
    previous: NodeIndex,
    active: bool,
    found_entry_point: bool,
}

impl SubSlotScout {
    pub fn new(path: SlotPath, start: NodeIndex) -> Self {
        Self {
            path,
            start,
            previous: start,
            active: true,
            // Only look for an entry point when starting inside a sub-slot
            found_entry_point: matches!(path, SlotPath::Whole),
        }
    }

    pub fn reply(&self) -> bool {
        self.active && self.found_entry_point
    }

    pub fn reset(&mut self) {
        self.active = true;
        self.found_entry_point = matches!(self.path, SlotPath::Whole);
        self.previous = self.start;
    }

    pub fn probe(&mut self, graph: &PrecedenceGraph, slot: &EventSlot, parent: NodeIndex) -> bool {
        self.visit(graph, slot, parent);
        self.reply()
    }

    fn visit(&mut self, graph: &PrecedenceGraph, slot: &EventSlot, node: NodeIndex) -> bool {
        if slot.at(self.path).control_flow[node.0] != -1 {
            self.active = false;
            return self.reply();
        }

        let Some(hub) = graph.decision(node) else {
            self.active = false;
            return self.reply();
        };

        if !hub.concurrent {
            for &child in &hub.children {
                if child == self.previous {
                    break;
                }
                if slot.at(self.path).control_flow[child.0] == -1 {
                    self.active = false;
                    return self.reply();
                }
            }
        }

        self.visit_parents(graph, slot, node);
        self.reply()
    }

    fn visit_parents(&mut self, graph: &PrecedenceGraph, slot: &EventSlot, node: NodeIndex) {
        // Leave the sub-slot if this is the exit node
        let mut old_path = None;
        if let SlotPath::Sub(_) = self.path {
            if slot.at(self.path).entry_point == Some(node) {
                old_path = Some(self.path);
                self.path = SlotPath::Whole;
                self.found_entry_point = true;
            }
        }

        if let Some(hub) = graph.decision(node) {
            for &parent in &hub.parents {
                self.active = true;
                self.found_entry_point = matches!(self.path, SlotPath::Whole);
                self.previous = node;
                self.visit(graph, slot, parent);
                if self.reply() {
                    break;
                }
            }
        }

        if let Some(path) = old_path {
            self.path = path;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::StubAlgorithm;
    use crate::graph::builder::{BuildOptions, GraphBuilder, HubProps};
    use crate::slot::EventContext;
    use std::sync::Arc;

    // head (sequential AND) with children: first, second
    fn sequential_pair() -> PrecedenceGraph {
        let mut builder = GraphBuilder::new("scout-test");
        builder
            .add_head(
                "head",
                HubProps {
                    concurrent: false,
                    ..HubProps::default()
                },
            )
            .unwrap();
        builder
            .add_algorithm("head", Arc::new(StubAlgorithm::new("first")))
            .unwrap();
        builder
            .add_algorithm("head", Arc::new(StubAlgorithm::new("second")))
            .unwrap();
        builder.build(&BuildOptions::default()).unwrap()
    }

    #[test]
    fn resolved_parent_is_inactive() {
        let graph = sequential_pair();
        let mut slot = EventSlot::new(graph.alg_count(), graph.node_count());
        slot.reset(EventContext::new(1));
        slot.control_flow[graph.head().0] = 1;

        let first = graph.algorithm_node_index("first").unwrap();
        let mut scout = ActiveLineageScout::new(SlotPath::Whole, first);
        assert!(!scout.probe(&graph, &slot, graph.head()));
    }

    #[test]
    fn out_of_sequence_sibling_blocks_lineage() {
        let graph = sequential_pair();
        let mut slot = EventSlot::new(graph.alg_count(), graph.node_count());
        slot.reset(EventContext::new(1));

        // "second" probes while "first" is still unresolved
        let second = graph.algorithm_node_index("second").unwrap();
        let mut scout = ActiveLineageScout::new(SlotPath::Whole, second);
        assert!(!scout.probe(&graph, &slot, graph.head()));

        // Once "first" is resolved the lineage becomes active
        let first = graph.algorithm_node_index("first").unwrap();
        slot.control_flow[first.0] = 1;
        scout.reset();
        assert!(scout.probe(&graph, &slot, graph.head()));
    }

    #[test]
    fn sub_slot_scout_requires_entry_point_crossing() {
        let graph = sequential_pair();
        let mut slot = EventSlot::new(graph.alg_count(), graph.node_count());
        slot.reset(EventContext::new(1));
        let sub = slot.make_sub_slot(graph.head(), EventContext::new(1));

        let first = graph.algorithm_node_index("first").unwrap();
        let mut scout = SubSlotScout::new(SlotPath::Sub(sub), first);
        // The probe climbs to the head, which is also the entry point, so
        // the walk crosses into the whole-event slot and reports active.
        assert!(scout.probe(&graph, &slot, graph.head()));
    }
}
