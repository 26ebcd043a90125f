// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The precedence rules graph: one immutable structure describing both the
//! control flow realm (decision hubs and algorithm nodes) and the data flow
//! realm (data and condition nodes) of an event processing configuration.
//!
//! Nodes live in id-indexed arenas: control flow nodes are a tagged variant
//! of `{Decision, Algorithm}` addressed by [`NodeIndex`], data nodes a
//! variant of `{Plain, Condition}` addressed by [`DataIndex`]. Parent and
//! child links are ids, never owning references, which makes the graph
//! trivially shareable across event slots.
//!
//! The graph is assembled once through [`builder::GraphBuilder`] and never
//! mutated afterwards; all per-event state lives in the event slots the
//! visitors carry alongside.

pub mod builder;
pub mod visitors;

use crate::slot::EventSlot;
use crate::state::AlgState;
use crate::traits::{Algorithm, ConditionsService};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Index of a control flow node (decision hub or algorithm node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub usize);

/// Index of an algorithm within the slot state vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlgIndex(pub usize);

/// Index of a data node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataIndex(pub usize);

/// Control flow aggregator with AND/OR semantics and modifier flags.
pub struct DecisionNode {
    pub name: String,
    pub index: NodeIndex,
    /// Whether all children are evaluated concurrently or sequentially.
    pub concurrent: bool,
    /// Whether to evaluate the hub decision as soon as its child decisions
    /// allow it. Applicable to both concurrent and sequential hubs.
    pub prompt_decision: bool,
    /// Whether acting as an "or" (true) or "and" (false) hub.
    pub mode_or: bool,
    /// Whether always passing regardless of child results.
    pub all_pass: bool,
    /// Whether the aggregated decision is negated.
    pub inverted: bool,
    pub children: Vec<NodeIndex>,
    pub parents: Vec<NodeIndex>,
}

/// Leaf of the control flow graph, tied to an algorithm and its data edges.
pub struct AlgorithmNode {
    pub name: String,
    pub index: NodeIndex,
    pub alg_index: AlgIndex,
    /// Whether a positive decision is enforced regardless of the outcome.
    pub all_pass: bool,
    /// Whether the decision logic is inverted.
    pub inverted: bool,
    /// CPU-blocking algorithm.
    pub blocking: bool,
    /// Accelerator-offloaded algorithm.
    pub accelerated: bool,
    /// Static ordering weight consumed by the scheduler's task queues;
    /// produced by the ranking pass at initialization.
    pub rank: f32,
    pub inputs: Vec<DataIndex>,
    pub outputs: Vec<DataIndex>,
    pub parents: Vec<NodeIndex>,
    /// The algorithm behind this node.
    pub algorithm: Arc<dyn Algorithm>,
}

/// Tagged control flow node variant.
pub enum CfNode {
    Decision(DecisionNode),
    Algorithm(AlgorithmNode),
}

impl CfNode {
    pub fn name(&self) -> &str {
        match self {
            CfNode::Decision(n) => &n.name,
            CfNode::Algorithm(n) => &n.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Plain,
    /// Externally validated per event through the conditions service.
    Condition,
}

/// A named datum with its producer and consumer algorithm nodes.
pub struct DataNode {
    pub id: String,
    pub index: DataIndex,
    pub kind: DataKind,
    pub producers: Vec<NodeIndex>,
    pub consumers: Vec<NodeIndex>,
}

/// The assembled graph. Immutable after construction.
pub struct PrecedenceGraph {
    pub(crate) name: String,
    pub(crate) cf_nodes: Vec<CfNode>,
    pub(crate) data_nodes: Vec<DataNode>,
    pub(crate) head: NodeIndex,
    /// Algorithm index -> control flow node index.
    pub(crate) alg_nodes: Vec<NodeIndex>,
    pub(crate) alg_by_name: HashMap<String, NodeIndex>,
    pub(crate) hub_by_name: HashMap<String, NodeIndex>,
    pub(crate) data_by_id: HashMap<String, DataIndex>,
    pub(crate) conditions: Option<Arc<dyn ConditionsService>>,
}

impl PrecedenceGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The single head decision node of the control flow realm.
    pub fn head(&self) -> NodeIndex {
        self.head
    }

    pub fn node(&self, n: NodeIndex) -> &CfNode {
        &self.cf_nodes[n.0]
    }

    /// Total number of control flow nodes.
    pub fn node_count(&self) -> usize {
        self.cf_nodes.len()
    }

    /// Number of algorithm nodes.
    pub fn alg_count(&self) -> usize {
        self.alg_nodes.len()
    }

    pub fn data_count(&self) -> usize {
        self.data_nodes.len()
    }

    pub fn decision(&self, n: NodeIndex) -> Option<&DecisionNode> {
        match &self.cf_nodes[n.0] {
            CfNode::Decision(node) => Some(node),
            CfNode::Algorithm(_) => None,
        }
    }

    pub fn algorithm(&self, n: NodeIndex) -> Option<&AlgorithmNode> {
        match &self.cf_nodes[n.0] {
            CfNode::Algorithm(node) => Some(node),
            CfNode::Decision(_) => None,
        }
    }

    pub fn data(&self, d: DataIndex) -> &DataNode {
        &self.data_nodes[d.0]
    }

    /// Control flow node carrying the given algorithm index.
    pub fn node_for_alg(&self, a: AlgIndex) -> NodeIndex {
        self.alg_nodes[a.0]
    }

    pub fn algorithm_node(&self, name: &str) -> Option<&AlgorithmNode> {
        self.alg_by_name.get(name).and_then(|&n| self.algorithm(n))
    }

    pub fn algorithm_node_index(&self, name: &str) -> Option<NodeIndex> {
        self.alg_by_name.get(name).copied()
    }

    pub fn hub_index(&self, name: &str) -> Option<NodeIndex> {
        self.hub_by_name.get(name).copied()
    }

    pub fn data_index(&self, id: &str) -> Option<DataIndex> {
        self.data_by_id.get(id).copied()
    }

    /// All algorithm nodes, in algorithm index order.
    pub fn algorithm_nodes(&self) -> impl Iterator<Item = &AlgorithmNode> {
        self.alg_nodes.iter().filter_map(|&n| self.algorithm(n))
    }

    pub fn data_nodes(&self) -> impl Iterator<Item = &DataNode> {
        self.data_nodes.iter()
    }

    pub fn conditions(&self) -> Option<&Arc<dyn ConditionsService>> {
        self.conditions.as_ref()
    }

    /// Read-only availability check for a datum in a slot view: a plain
    /// datum is available once any producer executed, a condition datum
    /// once the conditions service validates it for the view's event.
    pub fn data_available(&self, view: &EventSlot, d: DataIndex) -> bool {
        let data = self.data(d);
        match data.kind {
            DataKind::Plain => data
                .producers
                .iter()
                .filter_map(|&p| self.algorithm(p))
                .any(|a| view.states.get(a.alg_index.0).is_executed()),
            DataKind::Condition => match (self.conditions(), view.context.as_ref()) {
                (Some(svc), Some(ctx)) => svc.is_valid(ctx, &data.id),
                _ => false,
            },
        }
    }

    fn decision_label(value: i8) -> &'static str {
        match value {
            0 => "FALSE",
            1 => "TRUE",
            _ => "UNDEFINED",
        }
    }

    /// Render the control flow tree with per-node decisions and
    /// per-algorithm states for one slot. For CONTROLREADY algorithms the
    /// missing inputs are listed together with their candidate producers
    /// and current states; this is the stall diagnostic.
    pub fn print_state(&self, slot: &EventSlot, verbose_sub_slots: bool) -> String {
        let mut out = String::new();
        self.print_node(&mut out, slot, slot, self.head, 0);

        if verbose_sub_slots {
            for (node, subs) in &slot.sub_slots_by_node {
                for &sub in subs {
                    let view = &slot.sub_slots[sub];
                    let _ = writeln!(
                        out,
                        "sub-slot {} entered from {}:",
                        sub,
                        self.node(*node).name()
                    );
                    self.print_node(&mut out, slot, view, *node, 2);
                }
            }
        }
        out
    }

    fn print_node(
        &self,
        out: &mut String,
        top: &EventSlot,
        view: &EventSlot,
        n: NodeIndex,
        level: usize,
    ) {
        let indent = " ".repeat(level);
        match &self.cf_nodes[n.0] {
            CfNode::Decision(hub) => {
                let decision = view.control_flow[n.0];
                let _ = writeln!(
                    out,
                    "{}{} ({}), w/ decision: {}({})",
                    indent,
                    hub.name,
                    n.0,
                    Self::decision_label(decision),
                    decision
                );
                for &child in &hub.children {
                    self.print_node(out, top, view, child, level + 2);
                }
            }
            CfNode::Algorithm(alg) => {
                let decision = view.control_flow[n.0];
                let state = view.states.get(alg.alg_index.0);
                let _ = writeln!(
                    out,
                    "{}{} ({}), w/ decision: {}({}), in state: {}",
                    indent,
                    alg.name,
                    n.0,
                    Self::decision_label(decision),
                    decision,
                    state
                );

                // In a stall, CONTROLREADY nodes are the interesting ones
                if state == AlgState::ControlReady {
                    let _ = writeln!(out, "{}========", indent);
                    for &d in &alg.inputs {
                        if self.data_available(view, d) {
                            continue;
                        }
                        let data = self.data(d);
                        match data.kind {
                            DataKind::Condition => {
                                let _ = writeln!(
                                    out,
                                    "{}missing conditions data: {}",
                                    indent, data.id
                                );
                                if let Some(svc) = self.conditions() {
                                    let ranges = svc.valid_ranges(&data.id);
                                    if ranges.is_empty() {
                                        let _ = writeln!(
                                            out,
                                            "{}no interval(s) of validity",
                                            indent
                                        );
                                    }
                                    for (lo, hi) in ranges {
                                        let _ = writeln!(
                                            out,
                                            "{}interval of validity: [{}, {}]",
                                            indent, lo, hi
                                        );
                                    }
                                }
                            }
                            DataKind::Plain => {
                                let _ = writeln!(out, "{}missing data: {}", indent, data.id);
                                let _ = write!(out, "{}can be produced by alg(s): ", indent);
                                for producer in
                                    data.producers.iter().filter_map(|&p| self.algorithm(p))
                                {
                                    let _ = write!(
                                        out,
                                        "( {} in state: {} ) ",
                                        producer.name,
                                        view.states.get(producer.alg_index.0)
                                    );
                                }
                                let _ = writeln!(out);

                                // Point at other slot views that already hold it
                                if view.entry_point.is_some() && self.data_available(top, d) {
                                    let _ = writeln!(
                                        out,
                                        "{}data is available at whole-event level",
                                        indent
                                    );
                                }
                                let holders: Vec<usize> = top
                                    .sub_slots
                                    .iter()
                                    .enumerate()
                                    .filter(|(_, sub)| self.data_available(sub, d))
                                    .map(|(i, _)| i)
                                    .collect();
                                if !holders.is_empty() {
                                    let _ = writeln!(
                                        out,
                                        "{}data is available in sub-slot(s) {:?}",
                                        indent, holders
                                    );
                                }
                            }
                        }
                    }
                    let _ = writeln!(out, "{}========", indent);
                }
            }
        }
    }

    /// Human-readable dump of the configured control flow.
    pub fn dump_control_flow(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "control flow of graph '{}':", self.name);
        self.dump_control_flow_node(&mut out, self.head, 1);
        out
    }

    fn dump_control_flow_node(&self, out: &mut String, n: NodeIndex, level: usize) {
        let indent = " ".repeat(level * 2);
        match &self.cf_nodes[n.0] {
            CfNode::Decision(hub) => {
                let mut flags = vec![if hub.mode_or { "OR" } else { "AND" }];
                flags.push(if hub.concurrent {
                    "concurrent"
                } else {
                    "sequential"
                });
                if hub.prompt_decision {
                    flags.push("prompt");
                }
                if hub.all_pass {
                    flags.push("allPass");
                }
                if hub.inverted {
                    flags.push("inverted");
                }
                let _ = writeln!(out, "{}{} [{}]", indent, hub.name, flags.join(", "));
                for &child in &hub.children {
                    self.dump_control_flow_node(out, child, level + 1);
                }
            }
            CfNode::Algorithm(alg) => {
                let _ = writeln!(out, "{}{}", indent, alg.name);
            }
        }
    }

    /// Human-readable dump of all data origins and destinations.
    pub fn dump_data_flow(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "data flow of graph '{}':", self.name);
        for alg in self.algorithm_nodes() {
            let _ = writeln!(out, "  {}", alg.name);
            for &d in &alg.inputs {
                let data = self.data(d);
                let producers: Vec<&str> = data
                    .producers
                    .iter()
                    .filter_map(|&p| self.algorithm(p))
                    .map(|a| a.name.as_str())
                    .collect();
                let _ = writeln!(
                    out,
                    "    reads  {} (produced by: {})",
                    data.id,
                    if producers.is_empty() {
                        "none".to_string()
                    } else {
                        producers.join(", ")
                    }
                );
            }
            for &d in &alg.outputs {
                let _ = writeln!(out, "    writes {}", self.data(d).id);
            }
        }
        out
    }

    /// GraphML rendering of the precedence rules. Diagnostic only; the
    /// format is not a normative contract.
    pub fn precedence_rules_graphml(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n");
        out.push_str("  <key id=\"kind\" for=\"node\" attr.name=\"kind\" attr.type=\"string\"/>\n");
        out.push_str("  <key id=\"rank\" for=\"node\" attr.name=\"rank\" attr.type=\"float\"/>\n");
        let _ = writeln!(
            out,
            "  <graph id=\"{}\" edgedefault=\"directed\">",
            xml_escape(&self.name)
        );

        for node in &self.cf_nodes {
            match node {
                CfNode::Decision(hub) => {
                    let _ = writeln!(
                        out,
                        "    <node id=\"{}\"><data key=\"kind\">decision</data></node>",
                        xml_escape(&hub.name)
                    );
                }
                CfNode::Algorithm(alg) => {
                    let _ = writeln!(
                        out,
                        "    <node id=\"{}\"><data key=\"kind\">algorithm</data><data key=\"rank\">{}</data></node>",
                        xml_escape(&alg.name),
                        alg.rank
                    );
                }
            }
        }
        for data in &self.data_nodes {
            let kind = match data.kind {
                DataKind::Plain => "data",
                DataKind::Condition => "condition",
            };
            let _ = writeln!(
                out,
                "    <node id=\"{}\"><data key=\"kind\">{}</data></node>",
                xml_escape(&data.id),
                kind
            );
        }

        for node in &self.cf_nodes {
            if let CfNode::Decision(hub) = node {
                for &child in &hub.children {
                    let _ = writeln!(
                        out,
                        "    <edge source=\"{}\" target=\"{}\"/>",
                        xml_escape(&hub.name),
                        xml_escape(self.node(child).name())
                    );
                }
            }
        }
        for data in &self.data_nodes {
            for producer in data.producers.iter().filter_map(|&p| self.algorithm(p)) {
                let _ = writeln!(
                    out,
                    "    <edge source=\"{}\" target=\"{}\"/>",
                    xml_escape(&producer.name),
                    xml_escape(&data.id)
                );
            }
            for consumer in data.consumers.iter().filter_map(|&c| self.algorithm(c)) {
                let _ = writeln!(
                    out,
                    "    <edge source=\"{}\" target=\"{}\"/>",
                    xml_escape(&data.id),
                    xml_escape(&consumer.name)
                );
            }
        }

        out.push_str("  </graph>\n</graphml>\n");
        out
    }

    /// GraphML rendering of an observed precedence trace.
    pub fn precedence_trace_graphml(edges: &[(String, String)]) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n");
        out.push_str("  <graph id=\"precedence.trace\" edgedefault=\"directed\">\n");
        let mut seen = std::collections::BTreeSet::new();
        for (source, target) in edges {
            seen.insert(source.as_str());
            seen.insert(target.as_str());
        }
        for name in seen {
            let _ = writeln!(out, "    <node id=\"{}\"/>", xml_escape(name));
        }
        for (source, target) in edges {
            let _ = writeln!(
                out,
                "    <edge source=\"{}\" target=\"{}\"/>",
                xml_escape(source),
                xml_escape(target)
            );
        }
        out.push_str("  </graph>\n</graphml>\n");
        out
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
