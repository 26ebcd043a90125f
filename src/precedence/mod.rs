// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The precedence service: owns the precedence rules graph and resolves the
//! task execution precedence for the scheduler.
//!
//! `iterate` infers the precedence effect of one execution flow event (a
//! new event at the root, or a finished task) by dispatching the matching
//! visitor wave; `simulate` dry-runs the rules to prove they converge. The
//! service also hosts the diagnostic surfaces: the per-slot state dump used
//! on stalls, control/data flow dumps and the GraphML exports of the rules
//! and of observed precedence traces.

use crate::errors::GraphError;
use crate::graph::visitors::{Cause, DecisionUpdater, RunSimulator, Supervisor};
use crate::graph::PrecedenceGraph;
use crate::slot::{EventSlot, SlotPath};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

/// Diagnostic toggles of the service.
#[derive(Debug, Clone, Default)]
pub struct PrecedenceOptions {
    /// Record cause/effect pairs while promoting and dump them per event.
    pub dump_precedence_trace: bool,
    /// Override the default trace file name.
    pub precedence_trace_file: Option<PathBuf>,
    /// Dump the assembled rules once at startup.
    pub dump_precedence_rules: bool,
    /// Override the default rules file name.
    pub precedence_rules_file: Option<PathBuf>,
}

pub struct PrecedenceService {
    graph: PrecedenceGraph,
    options: PrecedenceOptions,
}

impl PrecedenceService {
    pub fn new(graph: PrecedenceGraph) -> Self {
        Self::with_options(graph, PrecedenceOptions::default())
    }

    pub fn with_options(graph: PrecedenceGraph, options: PrecedenceOptions) -> Self {
        let service = Self { graph, options };
        if service.options.dump_precedence_rules {
            service.dump_precedence_rules();
        }
        service
    }

    pub fn graph(&self) -> &PrecedenceGraph {
        &self.graph
    }

    /// Infer the precedence effect caused by an execution flow event.
    pub fn iterate(&self, slot: &mut EventSlot, cause: &Cause) -> Result<(), GraphError> {
        let trace = self.options.dump_precedence_trace;
        match cause {
            Cause::Task { algorithm, path } => {
                let node = self
                    .graph
                    .algorithm_node_index(algorithm)
                    .ok_or_else(|| GraphError::UnknownAlgorithm(algorithm.clone()))?;
                let mut updater = DecisionUpdater::with_trace(cause.clone(), *path, trace);
                self.graph.accept(node, &mut updater, slot);
            }
            Cause::Root => {
                let mut supervisor =
                    Supervisor::with_trace(cause.clone(), SlotPath::Whole, trace);
                self.graph.accept(self.graph.head(), &mut supervisor, slot);
            }
        }
        Ok(())
    }

    /// Dry-run the execution flow on a slot, without executing algorithms,
    /// until the root decision resolves. Returns the number of algorithms
    /// resolved per pass. A pass that resolves nothing before the root is
    /// decided means the topology can never terminate.
    pub fn simulate(&self, slot: &mut EventSlot) -> Result<Vec<usize>, GraphError> {
        let mut passes = Vec::new();
        while !self.cf_rules_resolved(slot) {
            let mut simulator = RunSimulator::new(Cause::Root, SlotPath::Whole);
            self.graph.accept(self.graph.head(), &mut simulator, slot);
            passes.push(simulator.nodes_succeeded);

            if self.cf_rules_resolved(slot) {
                break;
            }
            if simulator.nodes_succeeded == 0 {
                let unresolved = slot.control_flow.iter().filter(|&&d| d == -1).count();
                return Err(GraphError::NonTerminatingTopology { unresolved });
            }
        }
        Ok(passes)
    }

    /// True once the head decision node carries a decision.
    pub fn cf_rules_resolved(&self, slot: &EventSlot) -> bool {
        slot.control_flow[self.graph.head().0] != -1
    }

    /// Rank of an algorithm, as consumed by the task queues.
    pub fn priority(&self, name: &str) -> u32 {
        self.graph
            .algorithm_node(name)
            .map(|a| a.rank.max(0.0) as u32)
            .unwrap_or(0)
    }

    /// Whether a task is CPU-blocking.
    pub fn is_blocking(&self, name: &str) -> bool {
        self.graph
            .algorithm_node(name)
            .map(|a| a.blocking)
            .unwrap_or(false)
    }

    /// Whether a task is accelerator-offloaded.
    pub fn is_asynchronous(&self, name: &str) -> bool {
        self.graph
            .algorithm_node(name)
            .map(|a| a.accelerated)
            .unwrap_or(false)
    }

    /// Per-slot control flow and state dump; the stall diagnostic.
    pub fn print_state(&self, slot: &EventSlot, verbose_sub_slots: bool) -> String {
        self.graph.print_state(slot, verbose_sub_slots)
    }

    pub fn dump_control_flow(&self) -> String {
        self.graph.dump_control_flow()
    }

    pub fn dump_data_flow(&self) -> String {
        self.graph.dump_data_flow()
    }

    /// Append the assembled precedence rules to the GraphML dump file.
    pub fn dump_precedence_rules(&self) {
        let path = self
            .options
            .precedence_rules_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("precedence.rules.graphml"));
        if let Err(error) = append_to(&path, &self.graph.precedence_rules_graphml()) {
            tracing::warn!(path = %path.display(), %error, "failed to dump precedence rules");
        } else {
            tracing::info!(path = %path.display(), "dumped precedence rules");
        }
    }

    /// Drain the trace recorded on a slot and append it to the trace file.
    pub fn dump_precedence_trace(&self, slot: &mut EventSlot) {
        if !self.options.dump_precedence_trace || slot.trace_edges.is_empty() {
            return;
        }
        let edges = std::mem::take(&mut slot.trace_edges);
        let path = self
            .options
            .precedence_trace_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("precedence.trace.graphml"));
        if let Err(error) = append_to(&path, &PrecedenceGraph::precedence_trace_graphml(&edges)) {
            tracing::warn!(path = %path.display(), %error, "failed to dump precedence trace");
        }
    }

}

fn append_to(path: &PathBuf, content: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())
}
