// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Initialization-time validators for the precedence rules graph.
//!
//! These run once at the end of graph assembly, before any event is
//! accepted:
//!
//! * [`NodePropertiesValidator`] — a hub cannot be both concurrent and
//!   prompt-decision; the prompt flag is discarded with a warning.
//! * [`ConditionalLineageFinder`] — classifies an algorithm's control flow
//!   lineage as conditional (guarded by a prompt-decision ancestor) or
//!   unconditional.
//! * [`ProductionAmbiguityFinder`] — multiple producers for one datum are a
//!   topology error unless every extra producer sits on a conditional
//!   branch.
//! * [`TarjanSccFinder`] — no strongly connected component of size > 1 may
//!   exist in the data dependency realm.

use crate::graph::{CfNode, DataIndex, DataKind, NodeIndex, PrecedenceGraph};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

/// Detects and repairs contradictory hub properties.
pub struct NodePropertiesValidator {
    violations: Vec<String>,
}

impl NodePropertiesValidator {
    pub fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    /// Scan every decision hub; contradictions are repaired in place by
    /// discarding the prompt flag.
    pub fn visit(&mut self, graph: &mut PrecedenceGraph) {
        for node in &mut graph.cf_nodes {
            if let CfNode::Decision(hub) = node {
                if hub.concurrent && hub.prompt_decision {
                    hub.prompt_decision = false;
                    self.violations.push(hub.name.clone());
                }
            }
        }
    }

    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn reply(&self) -> String {
        if self.violations.is_empty() {
            "  No 'Concurrent'/'Prompt' contradictions found".to_string()
        } else {
            format!(
                "  'Concurrent'/'Prompt' contradiction(s) found. Settings are mutually exclusive \
                 within a task group. Discarding 'Prompt' for {}",
                self.violations.join(", ")
            )
        }
    }
}

impl Default for NodePropertiesValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies the control flow lineage of a node as conditional and/or
/// unconditional. A prompt-decision ancestor makes a path conditional; a
/// path reaching a parentless node without one is unconditional.
pub struct ConditionalLineageFinder {
    positive: bool,
    negative: bool,
}

impl ConditionalLineageFinder {
    pub fn new() -> Self {
        Self {
            positive: false,
            negative: false,
        }
    }

    pub fn positive(&self) -> bool {
        self.positive
    }

    pub fn negative(&self) -> bool {
        self.negative
    }

    pub fn reset(&mut self) {
        self.positive = false;
        self.negative = false;
    }

    pub fn visit_algorithm(&mut self, graph: &PrecedenceGraph, node: NodeIndex) {
        let Some(alg) = graph.algorithm(node) else {
            return;
        };
        if alg.parents.is_empty() {
            // detached algorithms (conditions) count as unconditional
            self.negative = true;
            return;
        }
        for &parent in &alg.parents {
            self.visit_decision(graph, parent);
            if self.positive && self.negative {
                break;
            }
        }
    }

    fn visit_decision(&mut self, graph: &PrecedenceGraph, node: NodeIndex) {
        let Some(hub) = graph.decision(node) else {
            return;
        };

        // a prompt hub guards everything below it
        if hub.prompt_decision {
            self.positive = true;
            return;
        }

        if hub.parents.is_empty() {
            self.negative = true;
            return;
        }

        for &parent in &hub.parents {
            self.visit_decision(graph, parent);
            // a node on both kinds of branch settles the conclusion
            if self.positive && self.negative {
                break;
            }
        }
    }
}

impl Default for ConditionalLineageFinder {
    fn default() -> Self {
        Self::new()
    }
}

/// Finds data objects with ambiguous production.
pub struct ProductionAmbiguityFinder {
    unconditional: BTreeMap<DataIndex, BTreeSet<String>>,
    conditional: BTreeMap<DataIndex, BTreeSet<String>>,
    found_violations: bool,
}

impl ProductionAmbiguityFinder {
    pub fn new() -> Self {
        Self {
            unconditional: BTreeMap::new(),
            conditional: BTreeMap::new(),
            found_violations: false,
        }
    }

    pub fn visit(&mut self, graph: &PrecedenceGraph) {
        for data in graph.data_nodes() {
            if data.producers.len() <= 1 {
                continue;
            }
            self.found_violations = true;

            match data.kind {
                DataKind::Condition => {
                    // condition algorithms are detached from the control
                    // flow realm, so their violations are unconditional
                    for producer in data.producers.iter().filter_map(|&p| graph.algorithm(p)) {
                        self.unconditional
                            .entry(data.index)
                            .or_default()
                            .insert(producer.name.clone());
                    }
                }
                DataKind::Plain => {
                    let mut scout = ConditionalLineageFinder::new();
                    for &producer in &data.producers {
                        scout.visit_algorithm(graph, producer);
                        let name = graph
                            .algorithm(producer)
                            .map(|a| a.name.clone())
                            .unwrap_or_default();
                        if scout.negative() {
                            self.unconditional
                                .entry(data.index)
                                .or_default()
                                .insert(name);
                        } else {
                            self.conditional.entry(data.index).or_default().insert(name);
                        }
                        scout.reset();
                    }
                }
            }
        }
    }

    /// Multiple producers are tolerated as long as at most one of them is
    /// on an unconditional branch.
    pub fn passed(&self) -> bool {
        self.unconditional.values().all(|set| set.len() <= 1)
    }

    pub fn reply(&self, graph: &PrecedenceGraph) -> String {
        if !self.found_violations {
            return "  No topology violations found in the DF realm".to_string();
        }

        let mut out =
            String::from("  Conditional (C) and/or unconditional (U) producers found:\n");
        let mut listed: BTreeSet<DataIndex> = BTreeSet::new();

        for (&data, producers) in &self.unconditional {
            listed.insert(data);
            let _ = write!(out, "   {} <---- |", graph.data(data).id);
            for name in producers {
                let _ = write!(out, " {} (U) |", name);
            }
            if let Some(conditional) = self.conditional.get(&data) {
                for name in conditional {
                    let _ = write!(out, " {} (C) |", name);
                }
            }
            let _ = writeln!(out);
        }
        for (&data, producers) in &self.conditional {
            if listed.contains(&data) {
                continue;
            }
            let _ = write!(out, "   {} <---- |", graph.data(data).id);
            for name in producers {
                let _ = write!(out, " {} (C) |", name);
            }
            let _ = writeln!(out);
        }
        out
    }
}

impl Default for ProductionAmbiguityFinder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tarjan's strongly connected component search over the data dependency
/// realm (algorithm -> datum -> consuming algorithm edges).
pub struct TarjanSccFinder {
    node_count: u32,
    lowlinks: HashMap<NodeIndex, (u32, u32)>,
    stack: Vec<NodeIndex>,
    scc: BTreeMap<u32, Vec<NodeIndex>>,
}

impl TarjanSccFinder {
    pub fn new() -> Self {
        Self {
            node_count: 0,
            lowlinks: HashMap::new(),
            stack: Vec::new(),
            scc: BTreeMap::new(),
        }
    }

    pub fn visit(&mut self, graph: &PrecedenceGraph) {
        let starts: Vec<NodeIndex> = graph.algorithm_nodes().map(|a| a.index).collect();
        for node in starts {
            if !self.lowlinks.contains_key(&node) {
                self.visit_algorithm(graph, node);
            }
        }
    }

    fn on_stack(&self, node: NodeIndex) -> bool {
        self.stack.contains(&node)
    }

    fn visit_algorithm(&mut self, graph: &PrecedenceGraph, node: NodeIndex) {
        let Some(alg) = graph.algorithm(node) else {
            return;
        };

        self.stack.push(node);
        self.node_count += 1;
        let lowlink_init = self.node_count;
        self.lowlinks.insert(node, (lowlink_init, lowlink_init));

        for &output in &alg.outputs {
            for &consumer in &graph.data(output).consumers {
                if !self.lowlinks.contains_key(&consumer) {
                    self.visit_algorithm(graph, consumer);
                }
                // propagate the low-link value back
                if self.on_stack(consumer) {
                    let consumer_low = self.lowlinks[&consumer].1;
                    if let Some(entry) = self.lowlinks.get_mut(&node) {
                        if entry.1 > consumer_low {
                            entry.1 = consumer_low;
                        }
                    }
                    // a self-loop (A -> d -> A) is an SCC of its own
                    if consumer == node {
                        let low = self.lowlinks[&node].1;
                        self.scc.entry(low).or_default().push(node);
                    }
                }
            }
        }

        let (init, low) = self.lowlinks[&node];
        if init == low {
            let members = self.scc.entry(low).or_default();
            while let Some(top) = self.stack.pop() {
                if self.lowlinks[&top].1 == low && !members.contains(&top) {
                    members.push(top);
                }
                if top == node {
                    break;
                }
            }
        }
    }

    pub fn passed(&self) -> bool {
        !self.scc.values().any(|members| members.len() > 1)
    }

    pub fn reply(&self, graph: &PrecedenceGraph) -> String {
        if self.passed() {
            return "  No strongly connected components found in DF realm".to_string();
        }

        let mut out = String::from("  Strongly connected components found in DF realm:");
        for (lowlink, members) in &self.scc {
            if members.len() <= 1 {
                continue;
            }
            let mut names: Vec<&str> = members
                .iter()
                .filter_map(|&n| graph.algorithm(n))
                .map(|a| a.name.as_str())
                .collect();
            names.sort_unstable();
            let _ = write!(out, "\n   o [lowlink:{}] |", lowlink);
            for name in names {
                let _ = write!(out, " {} |", name);
            }
        }
        out
    }
}

impl Default for TarjanSccFinder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::StubAlgorithm;
    use crate::graph::builder::{BuildOptions, GraphBuilder, HubProps};
    use std::sync::Arc;

    fn lenient_options() -> BuildOptions {
        BuildOptions {
            verify_rules: false,
            ..BuildOptions::default()
        }
    }

    #[test]
    fn concurrent_prompt_contradiction_is_repaired() {
        let mut builder = GraphBuilder::new("contradiction");
        builder
            .add_head(
                "head",
                HubProps {
                    concurrent: true,
                    prompt_decision: true,
                    ..HubProps::default()
                },
            )
            .unwrap();
        builder
            .add_algorithm("head", Arc::new(StubAlgorithm::new("a")))
            .unwrap();
        let mut graph = builder.build(&lenient_options()).unwrap();

        let mut validator = NodePropertiesValidator::new();
        validator.visit(&mut graph);
        assert!(!validator.passed());
        assert!(validator.reply().contains("head"));
        assert!(!graph.decision(graph.head()).unwrap().prompt_decision);
    }

    #[test]
    fn lineage_classification() {
        let mut builder = GraphBuilder::new("lineage");
        builder.add_head("head", HubProps::default()).unwrap();
        builder
            .add_decision_hub(
                "head",
                "guarded",
                HubProps {
                    prompt_decision: true,
                    ..HubProps::default()
                },
            )
            .unwrap();
        builder
            .add_algorithm("guarded", Arc::new(StubAlgorithm::new("conditional_alg")))
            .unwrap();
        builder
            .add_algorithm("head", Arc::new(StubAlgorithm::new("unconditional_alg")))
            .unwrap();
        let graph = builder.build(&lenient_options()).unwrap();

        let mut finder = ConditionalLineageFinder::new();
        finder.visit_algorithm(&graph, graph.algorithm_node_index("conditional_alg").unwrap());
        assert!(finder.positive());
        assert!(!finder.negative());

        finder.reset();
        finder.visit_algorithm(
            &graph,
            graph.algorithm_node_index("unconditional_alg").unwrap(),
        );
        assert!(finder.negative());
        assert!(!finder.positive());
    }

    #[test]
    fn unconditional_double_production_fails() {
        let mut builder = GraphBuilder::new("ambiguous");
        builder.add_head("head", HubProps::default()).unwrap();
        builder
            .add_algorithm("head", Arc::new(StubAlgorithm::new("p1").with_outputs(&["d"])))
            .unwrap();
        builder
            .add_algorithm("head", Arc::new(StubAlgorithm::new("p2").with_outputs(&["d"])))
            .unwrap();
        let graph = builder.build(&lenient_options()).unwrap();

        let mut finder = ProductionAmbiguityFinder::new();
        finder.visit(&graph);
        assert!(!finder.passed());
        let report = finder.reply(&graph);
        assert!(report.contains("p1 (U)"));
        assert!(report.contains("p2 (U)"));
    }

    #[test]
    fn guarded_double_production_passes() {
        let mut builder = GraphBuilder::new("guarded-ambiguity");
        builder.add_head("head", HubProps::default()).unwrap();
        for (branch, producer) in [("b1", "p1"), ("b2", "p2")] {
            builder
                .add_decision_hub(
                    "head",
                    branch,
                    HubProps {
                        prompt_decision: true,
                        ..HubProps::default()
                    },
                )
                .unwrap();
            builder
                .add_algorithm(
                    branch,
                    Arc::new(StubAlgorithm::new(producer).with_outputs(&["d"])),
                )
                .unwrap();
        }
        let graph = builder.build(&lenient_options()).unwrap();

        let mut finder = ProductionAmbiguityFinder::new();
        finder.visit(&graph);
        assert!(finder.passed());
    }

    #[test]
    fn data_flow_cycle_is_found() {
        let mut builder = GraphBuilder::new("cyclic");
        builder.add_head("head", HubProps::default()).unwrap();
        builder
            .add_algorithm(
                "head",
                Arc::new(StubAlgorithm::new("a").with_inputs(&["y"]).with_outputs(&["x"])),
            )
            .unwrap();
        builder
            .add_algorithm(
                "head",
                Arc::new(StubAlgorithm::new("b").with_inputs(&["x"]).with_outputs(&["y"])),
            )
            .unwrap();
        let graph = builder.build(&lenient_options()).unwrap();

        let mut finder = TarjanSccFinder::new();
        finder.visit(&graph);
        assert!(!finder.passed());
        let report = finder.reply(&graph);
        assert!(report.contains("a"));
        assert!(report.contains("b"));
    }

    #[test]
    fn acyclic_data_flow_passes() {
        let mut builder = GraphBuilder::new("acyclic");
        builder.add_head("head", HubProps::default()).unwrap();
        builder
            .add_algorithm("head", Arc::new(StubAlgorithm::new("a").with_outputs(&["x"])))
            .unwrap();
        builder
            .add_algorithm("head", Arc::new(StubAlgorithm::new("b").with_inputs(&["x"])))
            .unwrap();
        let graph = builder.build(&lenient_options()).unwrap();

        let mut finder = TarjanSccFinder::new();
        finder.visit(&graph);
        assert!(finder.passed());
    }
}
