// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The mutating graph visitors that drive algorithm states and control flow
//! decisions forward.
//!
//! * [`DataReadyPromoter`] promotes CONTROLREADY algorithms to DATAREADY
//!   once every input is available.
//! * [`DecisionUpdater`] turns a finished algorithm into a control flow
//!   decision and releases its downstream consumers.
//! * [`Supervisor`] aggregates decisions at decision hubs and cascades
//!   readiness into undecided branches.
//! * [`RunSimulator`] dry-runs the rules without executing anything, for
//!   the pre-run validation pass.
//!
//! All of them carry the [`Cause`] that initiated the traversal and the
//! [`SlotPath`] selecting the slot view they operate on.

use crate::graph::visitors::scouts::{ActiveLineageScout, SubSlotScout};
use crate::graph::visitors::{Cause, CfVisitor, DfVisitor};
use crate::graph::{DataIndex, NodeIndex, PrecedenceGraph};
use crate::slot::{EventSlot, SlotPath};
use crate::state::AlgState;

/// Promotes CONTROLREADY algorithms whose data dependencies are satisfied.
pub struct DataReadyPromoter {
    pub cause: Cause,
    pub path: SlotPath,
    pub trace: bool,
}

impl DataReadyPromoter {
    pub fn new(cause: Cause, path: SlotPath) -> Self {
        Self {
            cause,
            path,
            trace: false,
        }
    }

    pub fn with_trace(cause: Cause, path: SlotPath, trace: bool) -> Self {
        Self { cause, path, trace }
    }
}

impl CfVisitor for DataReadyPromoter {
    fn enter_algorithm(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let Some(alg) = graph.algorithm(node) else {
            return false;
        };
        slot.at(self.path).states.get(alg.alg_index.0) == AlgState::ControlReady
    }

    fn visit_algorithm(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let Some(alg) = graph.algorithm(node) else {
            return true;
        };

        // true if this algorithm has no data inputs
        let mut result = true;
        for &input in &alg.inputs {
            result = graph.accept_data(input, self, slot);
            // skip checking other inputs if this one is not produced yet
            if !result {
                break;
            }
        }

        if result {
            let _ = slot
                .at_mut(self.path)
                .states
                .set(alg.alg_index.0, AlgState::DataReady);

            if self.trace {
                let source = self.cause.source_name().to_string();
                slot.trace_edges.push((source, alg.name.clone()));
            }
        }

        // true only if the algorithm was promoted to DATAREADY
        result
    }
}

impl DfVisitor for DataReadyPromoter {
    fn visit_data(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        data: DataIndex,
    ) -> bool {
        // 'Observer' strategy: only check whether any producer of this
        // datum has already been executed
        let view = slot.at(self.path);
        graph
            .data(data)
            .producers
            .iter()
            .filter_map(|&p| graph.algorithm(p))
            .any(|producer| view.states.get(producer.alg_index.0).is_executed())
    }

    fn enter_condition(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        data: DataIndex,
    ) -> bool {
        // Do not enter when the condition has already been loaded
        let view = slot.at(self.path);
        match (graph.conditions(), view.context.as_ref()) {
            (Some(svc), Some(ctx)) => !svc.is_valid(ctx, &graph.data(data).id),
            _ => false,
        }
    }

    fn visit_condition(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        data: DataIndex,
    ) -> bool {
        // 'Requester' strategy: ask the associated condition algorithms to
        // load this condition
        let mut promoter = Supervisor::with_trace(self.cause.clone(), self.path, self.trace);
        let producers = graph.data(data).producers.clone();
        for producer in producers {
            graph.accept(producer, &mut promoter, slot);
        }

        // this is only reached when the condition is not yet loaded, so by
        // definition it is unavailable at this moment
        false
    }
}

/// Turns a finished algorithm into a control flow decision and propagates
/// the consequences: downstream data consumers are re-examined and the
/// decision climbs the active part of the control flow tree.
pub struct DecisionUpdater {
    pub cause: Cause,
    pub path: SlotPath,
    pub trace: bool,
}

impl DecisionUpdater {
    pub fn new(cause: Cause, path: SlotPath) -> Self {
        Self {
            cause,
            path,
            trace: false,
        }
    }

    pub fn with_trace(cause: Cause, path: SlotPath, trace: bool) -> Self {
        Self { cause, path, trace }
    }
}

impl CfVisitor for DecisionUpdater {
    fn visit_algorithm(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let Some(alg) = graph.algorithm(node) else {
            return true;
        };

        let state = slot.at(self.path).states.get(alg.alg_index.0);
        let decision: i8 = if alg.all_pass {
            1
        } else if state == AlgState::EvtAccepted {
            i8::from(!alg.inverted)
        } else if state == AlgState::EvtRejected {
            i8::from(alg.inverted)
        } else {
            -1
        };

        if decision == -1 {
            return false;
        }

        slot.at_mut(self.path).control_flow[node.0] = decision;

        let mut promoter = DataReadyPromoter::with_trace(self.cause.clone(), self.path, self.trace);
        for &output in &alg.outputs {
            let consumers = graph.data(output).consumers.clone();
            for consumer in consumers {
                graph.accept(consumer, &mut promoter, slot);
            }
        }

        // propagate the decision upward to the active regions of the graph
        let mut supervisor = Supervisor::with_trace(self.cause.clone(), self.path, self.trace);
        supervisor.propagate_upward(graph, slot, node, &alg.parents);

        // true only if the algorithm produced a decision
        true
    }
}

/// Aggregates decisions at decision hubs, short-circuiting under
/// prompt-decision, and cascades readiness into undecided children.
pub struct Supervisor {
    pub cause: Cause,
    pub path: SlotPath,
    pub trace: bool,
}

impl Supervisor {
    pub fn new(cause: Cause, path: SlotPath) -> Self {
        Self {
            cause,
            path,
            trace: false,
        }
    }

    pub fn with_trace(cause: Cause, path: SlotPath, trace: bool) -> Self {
        Self { cause, path, trace }
    }

    /// Climb into each parent whose lineage the scouts report active. A
    /// single parent is entered unconditionally. The scout origin is the
    /// node whose decision is being propagated.
    pub(crate) fn propagate_upward(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        origin: NodeIndex,
        parents: &[NodeIndex],
    ) {
        if parents.len() == 1 {
            graph.accept(parents[0], self, slot);
            return;
        }

        if matches!(self.path, SlotPath::Sub(_)) {
            for &parent in parents {
                let mut scout = SubSlotScout::new(self.path, origin);
                if scout.probe(graph, slot, parent) {
                    graph.accept(parent, self, slot);
                }
            }
        } else {
            for &parent in parents {
                let mut scout = ActiveLineageScout::new(self.path, origin);
                if scout.probe(graph, slot, parent) {
                    graph.accept(parent, self, slot);
                }
            }
        }
    }
}

impl CfVisitor for Supervisor {
    fn enter_decision(
        &mut self,
        _graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        slot.at(self.path).control_flow[node.0] == -1
    }

    fn visit_decision(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let Some(hub) = graph.decision(node) else {
            return true;
        };

        // Leave the sub-slot if this is its exit node
        let mut old_path = None;
        if matches!(self.path, SlotPath::Sub(_)) && slot.at(self.path).entry_point == Some(node) {
            old_path = Some(self.path);
            self.path = SlotPath::Whole;
        }

        let mut found_unresolved = false;
        let mut found_negative = false;
        let mut found_positive = false;
        let mut decision: i8 = -1;

        let sub_ids: Vec<usize> = slot
            .at(self.path)
            .sub_slots_by_node
            .get(&node)
            .cloned()
            .unwrap_or_default();

        if !sub_ids.is_empty() {
            // Children live in sub-slots: monitor them across every view
            'views: for &view_index in &sub_ids {
                let view = &slot.sub_slots[view_index];
                for &child in &hub.children {
                    match view.control_flow[child.0] {
                        -1 => found_unresolved = true,
                        1 => found_positive = true,
                        _ => found_negative = true,
                    }

                    if hub.prompt_decision {
                        if hub.mode_or && found_positive {
                            decision = 1;
                            break 'views;
                        } else if !hub.mode_or && found_negative {
                            decision = 0;
                            break 'views;
                        }
                    } else if found_unresolved {
                        break 'views;
                    }
                }
            }
        } else {
            for &child in &hub.children {
                match slot.at(self.path).control_flow[child.0] {
                    -1 => found_unresolved = true,
                    1 => found_positive = true,
                    _ => found_negative = true,
                }

                if hub.prompt_decision {
                    if hub.mode_or && found_positive {
                        decision = 1;
                        break;
                    } else if !hub.mode_or && found_negative {
                        decision = 0;
                        break;
                    }
                } else if found_unresolved {
                    break;
                }
            }
        }

        if !found_unresolved && decision == -1 {
            decision = if hub.mode_or {
                i8::from(found_positive)
            } else {
                i8::from(!found_negative)
            };
        }

        if hub.inverted && decision == 1 {
            decision = 0;
        } else if hub.inverted && decision == 0 {
            decision = 1;
        }

        // allPass overrides only once every child is resolved
        if hub.all_pass && !found_unresolved {
            decision = 1;
        }

        if decision != -1 {
            slot.at_mut(self.path).control_flow[node.0] = decision;
            let parents = hub.parents.clone();
            self.propagate_upward(graph, slot, node, &parents);
            if let Some(path) = old_path {
                self.path = path;
            }
            return true;
        }

        // No decision can be made yet: request further information from the
        // unresolved children, entering sub-slots where they exist
        if !sub_ids.is_empty() {
            for &view_index in &sub_ids {
                let saved = self.path;
                self.path = SlotPath::Sub(view_index);
                for &child in &hub.children {
                    let unresolved = graph.accept(child, self, slot);
                    // stop on the first unresolved child of a sequential hub
                    if !hub.concurrent && unresolved {
                        break;
                    }
                }
                self.path = saved;
            }
        } else {
            for &child in &hub.children {
                let unresolved = graph.accept(child, self, slot);
                if !hub.concurrent && unresolved {
                    break;
                }
            }
        }

        if let Some(path) = old_path {
            self.path = path;
        }
        false
    }

    fn enter_algorithm(
        &mut self,
        _graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        slot.at(self.path).control_flow[node.0] == -1
    }

    fn visit_algorithm(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let Some(alg) = graph.algorithm(node) else {
            return true;
        };
        let alg_index = alg.alg_index.0;

        // Cascade INITIAL -> CONTROLREADY
        if slot.at(self.path).states.get(alg_index) == AlgState::Initial {
            let _ = slot
                .at_mut(self.path)
                .states
                .set(alg_index, AlgState::ControlReady);
        }

        // Then try CONTROLREADY -> DATAREADY
        if slot.at(self.path).states.get(alg_index) == AlgState::ControlReady {
            let mut promoter =
                DataReadyPromoter::with_trace(self.cause.clone(), self.path, self.trace);
            promoter.visit_algorithm(graph, slot, node)
        } else {
            // the visitor has done everything it could with this algorithm
            true
        }
    }
}

/// Dry-run visitor: forces DATAREADY -> SCHEDULED -> EVTACCEPTED whenever
/// inputs are synthetically available from already-"executed" producers.
/// Counts the algorithms it resolves so callers can detect convergence.
pub struct RunSimulator {
    pub cause: Cause,
    pub path: SlotPath,
    pub nodes_succeeded: usize,
}

impl RunSimulator {
    pub fn new(cause: Cause, path: SlotPath) -> Self {
        Self {
            cause,
            path,
            nodes_succeeded: 0,
        }
    }
}

impl CfVisitor for RunSimulator {
    fn enter_decision(
        &mut self,
        _graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        slot.at(self.path).control_flow[node.0] != 1
    }

    fn visit_decision(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let Some(hub) = graph.decision(node) else {
            return true;
        };

        let mut all_children_resolved = true;
        for &child in &hub.children {
            graph.accept(child, self, slot);

            let child_decision = slot.at(self.path).control_flow[child.0];
            if child_decision == -1 {
                all_children_resolved = false;
            }

            // process children sequentially when the hub is sequential
            if !hub.concurrent && child_decision == -1 {
                return false;
            }

            if child_decision == 1 && hub.mode_or && hub.prompt_decision {
                slot.at_mut(self.path).control_flow[node.0] = 1;
                for &parent in &hub.parents {
                    graph.accept(parent, self, slot);
                }
                return true;
            }
        }

        if all_children_resolved {
            slot.at_mut(self.path).control_flow[node.0] = 1;
            for &parent in &hub.parents {
                graph.accept(parent, self, slot);
            }
        }

        all_children_resolved
    }

    fn enter_algorithm(
        &mut self,
        _graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        slot.at(self.path).control_flow[node.0] != 1
    }

    fn visit_algorithm(
        &mut self,
        graph: &PrecedenceGraph,
        slot: &mut EventSlot,
        node: NodeIndex,
    ) -> bool {
        let Some(alg) = graph.algorithm(node) else {
            return true;
        };
        let alg_index = alg.alg_index.0;
        let mut promoter = DataReadyPromoter::new(self.cause.clone(), self.path);

        let state = slot.at(self.path).states.get(alg_index);
        let promoted = match state {
            AlgState::Initial => {
                let _ = slot
                    .at_mut(self.path)
                    .states
                    .set(alg_index, AlgState::ControlReady);
                promoter.visit_algorithm(graph, slot, node)
            }
            AlgState::ControlReady => promoter.visit_algorithm(graph, slot, node),
            _ => false,
        };

        if promoted {
            let view = slot.at_mut(self.path);
            let _ = view.states.set(alg_index, AlgState::Scheduled);
            let _ = view.states.set(alg_index, AlgState::EvtAccepted);
            view.control_flow[node.0] = 1;
            self.nodes_succeeded += 1;
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::StubAlgorithm;
    use crate::graph::builder::{BuildOptions, GraphBuilder, HubProps};
    use crate::slot::EventContext;
    use std::sync::Arc;

    // head (concurrent AND) with: producer -> d -> consumer
    fn producer_consumer() -> PrecedenceGraph {
        let mut builder = GraphBuilder::new("promoter-test");
        builder
            .add_head(
                "head",
                HubProps {
                    concurrent: true,
                    ..HubProps::default()
                },
            )
            .unwrap();
        builder
            .add_algorithm(
                "head",
                Arc::new(StubAlgorithm::new("producer").with_outputs(&["d"])),
            )
            .unwrap();
        builder
            .add_algorithm(
                "head",
                Arc::new(StubAlgorithm::new("consumer").with_inputs(&["d"])),
            )
            .unwrap();
        builder.build(&BuildOptions::default()).unwrap()
    }

    fn fresh_slot(graph: &PrecedenceGraph) -> EventSlot {
        let mut slot = EventSlot::new(graph.alg_count(), graph.node_count());
        slot.reset(EventContext::new(1));
        slot
    }

    #[test]
    fn supervisor_promotes_ready_algorithms() {
        let graph = producer_consumer();
        let mut slot = fresh_slot(&graph);

        let mut supervisor = Supervisor::new(Cause::Root, SlotPath::Whole);
        graph.accept(graph.head(), &mut supervisor, &mut slot);

        let producer = graph.algorithm_node("producer").unwrap();
        let consumer = graph.algorithm_node("consumer").unwrap();
        // producer has no inputs -> DATAREADY; consumer waits on 'd'
        assert_eq!(slot.states.get(producer.alg_index.0), AlgState::DataReady);
        assert_eq!(
            slot.states.get(consumer.alg_index.0),
            AlgState::ControlReady
        );
    }

    #[test]
    fn decision_updater_releases_consumers() {
        let graph = producer_consumer();
        let mut slot = fresh_slot(&graph);

        let mut supervisor = Supervisor::new(Cause::Root, SlotPath::Whole);
        graph.accept(graph.head(), &mut supervisor, &mut slot);

        // Run the producer to completion by hand
        let producer = graph.algorithm_node("producer").unwrap();
        let producer_node = producer.index;
        let producer_alg = producer.alg_index.0;
        slot.states.set(producer_alg, AlgState::Scheduled).unwrap();
        slot.states.set(producer_alg, AlgState::EvtAccepted).unwrap();

        let cause = Cause::Task {
            algorithm: "producer".to_string(),
            path: SlotPath::Whole,
        };
        let mut updater = DecisionUpdater::new(cause, SlotPath::Whole);
        assert!(updater.visit_algorithm(&graph, &mut slot, producer_node));

        let consumer = graph.algorithm_node("consumer").unwrap();
        assert_eq!(slot.states.get(consumer.alg_index.0), AlgState::DataReady);
        assert_eq!(slot.control_flow[producer_node.0], 1);
        // head still waits for the consumer
        assert_eq!(slot.control_flow[graph.head().0], -1);
    }

    #[test]
    fn decision_updater_is_idempotent_on_control_flow() {
        let graph = producer_consumer();
        let mut slot = fresh_slot(&graph);

        let mut supervisor = Supervisor::new(Cause::Root, SlotPath::Whole);
        graph.accept(graph.head(), &mut supervisor, &mut slot);

        let producer = graph.algorithm_node("producer").unwrap();
        let node = producer.index;
        let alg = producer.alg_index.0;
        slot.states.set(alg, AlgState::Scheduled).unwrap();
        slot.states.set(alg, AlgState::EvtAccepted).unwrap();

        let cause = Cause::Task {
            algorithm: "producer".to_string(),
            path: SlotPath::Whole,
        };
        let mut updater = DecisionUpdater::new(cause.clone(), SlotPath::Whole);
        updater.visit_algorithm(&graph, &mut slot, node);
        let snapshot = slot.control_flow.clone();

        let mut updater = DecisionUpdater::new(cause, SlotPath::Whole);
        updater.visit_algorithm(&graph, &mut slot, node);
        assert_eq!(slot.control_flow, snapshot);
    }

    #[test]
    fn inverted_algorithm_flips_decision() {
        let mut builder = GraphBuilder::new("inverted");
        builder.add_head("head", HubProps::default()).unwrap();
        builder
            .add_algorithm_with("head", Arc::new(StubAlgorithm::new("veto")), true, false)
            .unwrap();
        let graph = builder.build(&BuildOptions::default()).unwrap();
        let mut slot = fresh_slot(&graph);

        let mut supervisor = Supervisor::new(Cause::Root, SlotPath::Whole);
        graph.accept(graph.head(), &mut supervisor, &mut slot);

        let veto = graph.algorithm_node("veto").unwrap();
        let node = veto.index;
        let alg = veto.alg_index.0;
        slot.states.set(alg, AlgState::Scheduled).unwrap();
        slot.states.set(alg, AlgState::EvtAccepted).unwrap();

        let cause = Cause::Task {
            algorithm: "veto".to_string(),
            path: SlotPath::Whole,
        };
        let mut updater = DecisionUpdater::new(cause, SlotPath::Whole);
        updater.visit_algorithm(&graph, &mut slot, node);
        assert_eq!(slot.control_flow[node.0], 0);
    }

    #[test]
    fn simulator_resolves_whole_graph() {
        // Register the consumer ahead of its producer so that one pass
        // cannot resolve everything and convergence takes several waves.
        let mut builder = GraphBuilder::new("simulated");
        builder
            .add_head(
                "head",
                HubProps {
                    concurrent: true,
                    ..HubProps::default()
                },
            )
            .unwrap();
        builder
            .add_algorithm(
                "head",
                Arc::new(StubAlgorithm::new("consumer").with_inputs(&["d"])),
            )
            .unwrap();
        builder
            .add_algorithm(
                "head",
                Arc::new(StubAlgorithm::new("producer").with_outputs(&["d"])),
            )
            .unwrap();
        let graph = builder.build(&BuildOptions::default()).unwrap();
        let mut slot = fresh_slot(&graph);

        let mut passes = 0;
        while slot.control_flow[graph.head().0] != 1 && passes < 10 {
            let mut simulator = RunSimulator::new(Cause::Root, SlotPath::Whole);
            graph.accept(graph.head(), &mut simulator, &mut slot);
            passes += 1;
        }
        assert_eq!(slot.control_flow[graph.head().0], 1);
        assert!(passes >= 2, "data chain needs more than one pass");
    }
}
