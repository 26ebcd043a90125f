// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Visitor protocol over the precedence rules graph.
//!
//! Visitors mutate per-event state (never the graph) while traversing it.
//! Dispatch is double: the graph matches on the node variant and the
//! visitor decides, per variant, whether to enter and what to do on visit.
//!
//! The return value of [`PrecedenceGraph::accept`] follows the control flow
//! convention the traversals rely on: `true` means the node is still
//! *unresolved* after the visit (the visitor was accepted and could not, or
//! did not, settle a decision), `false` means the node already carries a
//! decision and the visitor was rejected. Data node acceptance instead
//! answers "is this datum available".

pub mod promoters;
pub mod rankers;
pub mod scouts;
pub mod validators;

pub use promoters::{DataReadyPromoter, DecisionUpdater, RunSimulator, Supervisor};
pub use scouts::{ActiveLineageScout, SubSlotScout};

use crate::graph::{CfNode, DataIndex, DataKind, NodeIndex, PrecedenceGraph};
use crate::slot::{EventSlot, SlotPath};

/// The origin of a scheduling wave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// A new event was pushed; the wave starts at the head node.
    Root,
    /// An upstream task finished; the wave starts at its algorithm node.
    Task {
        /// Name of the finished algorithm.
        algorithm: String,
        /// Slot view the task ran in.
        path: SlotPath,
    },
}

impl Cause {
    /// Name to attribute trace edges to.
    pub fn source_name(&self) -> &str {
        match self {
            Cause::Root => "root",
            Cause::Task { algorithm, .. } => algorithm,
        }
    }
}

/// Visitor over control flow nodes. All hooks default to "enter and do
/// nothing", so concrete visitors override only the variants they act on.
pub trait CfVisitor {
    fn enter_decision(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let _ = (graph, slot, node);
        true
    }

    /// Returns `true` when a decision was aggregated for the node.
    fn visit_decision(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let _ = (graph, slot, node);
        true
    }

    fn enter_algorithm(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let _ = (graph, slot, node);
        true
    }

    fn visit_algorithm(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let _ = (graph, slot, node);
        true
    }
}

/// Visitor over data flow nodes.
pub trait DfVisitor {
    fn enter_data(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        data: DataIndex,
    ) -> bool {
        let _ = (graph, slot, data);
        true
    }

    /// Returns `true` when the datum is available in the visited slot.
    fn visit_data(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        data: DataIndex,
    ) -> bool {
        let _ = (graph, slot, data);
        true
    }

    fn enter_condition(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        data: DataIndex,
    ) -> bool {
        let _ = (graph, slot, data);
        true
    }

    fn visit_condition(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        data: DataIndex,
    ) -> bool {
        let _ = (graph, slot, data);
        true
    }
}

impl PrecedenceGraph {
    /// Dispatch a control flow visitor to a node.
    ///
    /// Returns `true` while the node remains unresolved: a decision hub
    /// that was entered but produced no decision, or an algorithm node that
    /// was entered for promotion. Returns `false` when the node already
    /// holds a decision (the visitor was rejected) or, for decision hubs,
    /// when the visit settled one.
    pub fn accept<V: CfVisitor>(
        &self,
        node: NodeIndex,
        visitor: &mut V,
        slot: &mut EventSlot,
    ) -> bool {
        match &self.cf_nodes[node.0] {
            CfNode::Decision(_) => {
                if visitor.enter_decision(self, slot, node) {
                    let decided = visitor.visit_decision(self, slot, node);
                    !decided
                } else {
                    false
                }
            }
            CfNode::Algorithm(_) => {
                if visitor.enter_algorithm(self, slot, node) {
                    visitor.visit_algorithm(self, slot, node);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Dispatch a data flow visitor to a data node.
    ///
    /// Returns the availability verdict: the visit result when the node is
    /// entered, `true` otherwise (a rejected visitor means the datum needs
    /// no further action, e.g. an already valid condition).
    pub fn accept_data<V: DfVisitor>(
        &self,
        data: DataIndex,
        visitor: &mut V,
        slot: &mut EventSlot,
    ) -> bool {
        match self.data(data).kind {
            DataKind::Plain => {
                if visitor.enter_data(self, slot, data) {
                    visitor.visit_data(self, slot, data)
                } else {
                    true
                }
            }
            DataKind::Condition => {
                if visitor.enter_condition(self, slot, data) {
                    visitor.visit_condition(self, slot, data)
                } else {
                    true
                }
            }
        }
    }
}
