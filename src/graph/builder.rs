// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Staged construction of the precedence rules graph.
//!
//! The builder accepts the head decision node, then nested hubs and
//! algorithms; `build` materializes the data flow realm, attributes
//! loader-injected data, and runs the initialization validators. The
//! resulting [`PrecedenceGraph`] is immutable.
//!
//! Registering an already-known hub or algorithm under a second parent
//! links the existing node instead of duplicating it, so one algorithm may
//! sit under several decision hubs.

use crate::errors::GraphError;
use crate::graph::visitors::rankers::{rank_algorithms, RankingStrategy};
use crate::graph::visitors::validators::{
    NodePropertiesValidator, ProductionAmbiguityFinder, TarjanSccFinder,
};
use crate::graph::{
    AlgIndex, AlgorithmNode, CfNode, DataIndex, DataKind, DataNode, DecisionNode, NodeIndex,
    PrecedenceGraph,
};
use crate::traits::{Algorithm, ConditionsService};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Properties of a decision hub.
#[derive(Debug, Clone, Copy, Default)]
pub struct HubProps {
    pub concurrent: bool,
    pub prompt_decision: bool,
    pub mode_or: bool,
    pub all_pass: bool,
    pub inverted: bool,
}

/// Options consulted while finalizing the graph.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Algorithm attributed as producer of any otherwise-unproduced input.
    pub data_loader: Option<String>,
    /// Ranking strategy applied at the end of construction.
    pub optimizer: Option<RankingStrategy>,
    /// Average runtimes per algorithm, for the timing-based ranker.
    pub timing_hints: HashMap<String, f32>,
    /// Fail construction when an input has no producer and no data loader
    /// stands in.
    pub check_dependencies: bool,
    /// Warn about outputs nothing consumes.
    pub check_output_usage: bool,
    /// Algorithms whose outputs are exempt from the usage check.
    pub check_output_usage_ignore: Vec<String>,
    /// Run the topology validators.
    pub verify_rules: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            data_loader: None,
            optimizer: None,
            timing_hints: HashMap::new(),
            check_dependencies: false,
            check_output_usage: false,
            check_output_usage_ignore: Vec::new(),
            verify_rules: true,
        }
    }
}

pub struct GraphBuilder {
    name: String,
    cf_nodes: Vec<CfNode>,
    head: Option<NodeIndex>,
    alg_nodes: Vec<NodeIndex>,
    alg_by_name: HashMap<String, NodeIndex>,
    hub_by_name: HashMap<String, NodeIndex>,
    condition_nodes: HashSet<NodeIndex>,
    conditions: Option<Arc<dyn ConditionsService>>,
}

impl GraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cf_nodes: Vec::new(),
            head: None,
            alg_nodes: Vec::new(),
            alg_by_name: HashMap::new(),
            hub_by_name: HashMap::new(),
            condition_nodes: HashSet::new(),
            conditions: None,
        }
    }

    /// Attach a conditions service; outputs of condition algorithms become
    /// condition nodes validated through it.
    pub fn with_conditions(&mut self, service: Arc<dyn ConditionsService>) -> &mut Self {
        self.conditions = Some(service);
        self
    }

    /// Register the single head decision node.
    pub fn add_head(&mut self, name: &str, props: HubProps) -> Result<NodeIndex, GraphError> {
        if self.head.is_some() {
            return Err(GraphError::DuplicateNode(name.to_string()));
        }
        let index = self.new_hub(name, props)?;
        self.head = Some(index);
        Ok(index)
    }

    /// Register a decision hub under `parent`. A hub already known is
    /// linked to the additional parent instead of being recreated.
    pub fn add_decision_hub(
        &mut self,
        parent: &str,
        name: &str,
        props: HubProps,
    ) -> Result<NodeIndex, GraphError> {
        let parent_index = self.resolve_parent(parent)?;
        let index = match self.hub_by_name.get(name) {
            Some(&existing) => existing,
            None => self.new_hub(name, props)?,
        };
        self.link(parent_index, index);
        Ok(index)
    }

    /// Register an algorithm under `parent` with default decision flags.
    pub fn add_algorithm(
        &mut self,
        parent: &str,
        algorithm: Arc<dyn Algorithm>,
    ) -> Result<NodeIndex, GraphError> {
        self.add_algorithm_with(parent, algorithm, false, false)
    }

    /// Register an algorithm under `parent`. An algorithm already known is
    /// linked to the additional parent; the flags of the first registration
    /// win.
    pub fn add_algorithm_with(
        &mut self,
        parent: &str,
        algorithm: Arc<dyn Algorithm>,
        inverted: bool,
        all_pass: bool,
    ) -> Result<NodeIndex, GraphError> {
        let parent_index = self.resolve_parent(parent)?;
        let index = match self.alg_by_name.get(algorithm.name()) {
            Some(&existing) => existing,
            None => self.new_algorithm(algorithm, inverted, all_pass),
        };
        self.link(parent_index, index);
        Ok(index)
    }

    /// Register a condition algorithm. Condition algorithms live outside
    /// the control flow realm: they keep their data edges but have no
    /// parent decision hubs, and their outputs become condition nodes.
    pub fn add_condition_algorithm(
        &mut self,
        algorithm: Arc<dyn Algorithm>,
    ) -> Result<NodeIndex, GraphError> {
        if self.alg_by_name.contains_key(algorithm.name()) {
            return Err(GraphError::DuplicateNode(algorithm.name().to_string()));
        }
        let index = self.new_algorithm(algorithm, false, false);
        self.condition_nodes.insert(index);
        Ok(index)
    }

    fn resolve_parent(&self, parent: &str) -> Result<NodeIndex, GraphError> {
        if self.head.is_none() {
            return Err(GraphError::MissingHead(self.name.clone()));
        }
        self.hub_by_name
            .get(parent)
            .copied()
            .ok_or_else(|| GraphError::UnknownParent(parent.to_string()))
    }

    fn new_hub(&mut self, name: &str, props: HubProps) -> Result<NodeIndex, GraphError> {
        if self.hub_by_name.contains_key(name) || self.alg_by_name.contains_key(name) {
            return Err(GraphError::DuplicateNode(name.to_string()));
        }
        let index = NodeIndex(self.cf_nodes.len());
        self.cf_nodes.push(CfNode::Decision(DecisionNode {
            name: name.to_string(),
            index,
            concurrent: props.concurrent,
            prompt_decision: props.prompt_decision,
            mode_or: props.mode_or,
            all_pass: props.all_pass,
            inverted: props.inverted,
            children: Vec::new(),
            parents: Vec::new(),
        }));
        self.hub_by_name.insert(name.to_string(), index);
        Ok(index)
    }

    fn new_algorithm(
        &mut self,
        algorithm: Arc<dyn Algorithm>,
        inverted: bool,
        all_pass: bool,
    ) -> NodeIndex {
        let index = NodeIndex(self.cf_nodes.len());
        let alg_index = AlgIndex(self.alg_nodes.len());
        let name = algorithm.name().to_string();
        self.cf_nodes.push(CfNode::Algorithm(AlgorithmNode {
            name: name.clone(),
            index,
            alg_index,
            all_pass,
            inverted,
            blocking: algorithm.is_blocking(),
            accelerated: algorithm.is_asynchronous(),
            rank: -1.0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            parents: Vec::new(),
            algorithm,
        }));
        self.alg_nodes.push(index);
        self.alg_by_name.insert(name, index);
        index
    }

    fn link(&mut self, parent: NodeIndex, child: NodeIndex) {
        if let CfNode::Decision(hub) = &mut self.cf_nodes[parent.0] {
            if !hub.children.contains(&child) {
                hub.children.push(child);
            }
        }
        match &mut self.cf_nodes[child.0] {
            CfNode::Decision(hub) => {
                if !hub.parents.contains(&parent) {
                    hub.parents.push(parent);
                }
            }
            CfNode::Algorithm(alg) => {
                if !alg.parents.contains(&parent) {
                    alg.parents.push(parent);
                }
            }
        }
    }

    /// Finalize the graph: build the data flow realm, attribute unproduced
    /// inputs, validate, rank.
    pub fn build(self, options: &BuildOptions) -> Result<PrecedenceGraph, GraphError> {
        let head = self.head.ok_or_else(|| GraphError::MissingHead(self.name.clone()))?;

        let mut graph = PrecedenceGraph {
            name: self.name,
            cf_nodes: self.cf_nodes,
            data_nodes: Vec::new(),
            head,
            alg_nodes: self.alg_nodes,
            alg_by_name: self.alg_by_name,
            hub_by_name: self.hub_by_name,
            data_by_id: HashMap::new(),
            conditions: self.conditions,
        };

        build_data_realm(&mut graph, &self.condition_nodes, options)?;

        if options.verify_rules {
            // Property repair must precede the lineage classification the
            // ambiguity finder performs.
            let mut properties = NodePropertiesValidator::new();
            properties.visit(&mut graph);
            if !properties.passed() {
                tracing::warn!("{}", properties.reply());
            }

            let mut ambiguity = ProductionAmbiguityFinder::new();
            ambiguity.visit(&graph);
            if !ambiguity.passed() {
                return Err(GraphError::ProductionAmbiguity {
                    report: ambiguity.reply(&graph),
                });
            }

            let mut tarjan = TarjanSccFinder::new();
            tarjan.visit(&graph);
            if !tarjan.passed() {
                return Err(GraphError::DataFlowCycle {
                    report: tarjan.reply(&graph),
                });
            }
        }

        if options.check_output_usage {
            check_output_usage(&graph, options);
        }

        if let Some(strategy) = options.optimizer {
            rank_algorithms(&mut graph, strategy, &options.timing_hints);
        }

        tracing::info!(
            graph = %graph.name,
            nodes = graph.node_count(),
            algorithms = graph.alg_count(),
            data_nodes = graph.data_count(),
            "assembled precedence rules graph"
        );

        Ok(graph)
    }
}

fn intern_data(
    graph: &mut PrecedenceGraph,
    id: &str,
    kind: DataKind,
) -> DataIndex {
    if let Some(&existing) = graph.data_by_id.get(id) {
        return existing;
    }
    let index = DataIndex(graph.data_nodes.len());
    graph.data_nodes.push(DataNode {
        id: id.to_string(),
        index,
        kind,
        producers: Vec::new(),
        consumers: Vec::new(),
    });
    graph.data_by_id.insert(id.to_string(), index);
    index
}

fn build_data_realm(
    graph: &mut PrecedenceGraph,
    condition_nodes: &HashSet<NodeIndex>,
    options: &BuildOptions,
) -> Result<(), GraphError> {
    let alg_nodes = graph.alg_nodes.clone();

    // First pass: register every produced datum
    for &node in &alg_nodes {
        let (outputs, is_condition) = match graph.algorithm(node) {
            Some(alg) => (alg.algorithm.outputs(), condition_nodes.contains(&node)),
            None => continue,
        };
        let kind = if is_condition && graph.conditions.is_some() {
            DataKind::Condition
        } else {
            DataKind::Plain
        };
        for id in outputs {
            let data = intern_data(graph, &id, kind);
            if !graph.data_nodes[data.0].producers.contains(&node) {
                graph.data_nodes[data.0].producers.push(node);
            }
            if let CfNode::Algorithm(alg) = &mut graph.cf_nodes[node.0] {
                if !alg.outputs.contains(&data) {
                    alg.outputs.push(data);
                }
            }
        }
    }

    // Second pass: wire consumers, attributing unproduced inputs to the
    // data loader when one is configured
    let loader_node = match &options.data_loader {
        Some(name) => Some(
            graph
                .alg_by_name
                .get(name)
                .copied()
                .ok_or_else(|| GraphError::UnknownAlgorithm(name.clone()))?,
        ),
        None => None,
    };

    for &node in &alg_nodes {
        let (inputs, consumer_name) = match graph.algorithm(node) {
            Some(alg) => (alg.algorithm.inputs(), alg.name.clone()),
            None => continue,
        };
        for id in inputs {
            let data = intern_data(graph, &id, DataKind::Plain);
            if graph.data_nodes[data.0].producers.is_empty() {
                match loader_node {
                    Some(loader) if loader != node => {
                        tracing::debug!(
                            data = %id,
                            consumer = %consumer_name,
                            "attributing unproduced input to the data loader"
                        );
                        graph.data_nodes[data.0].producers.push(loader);
                        if let CfNode::Algorithm(alg) = &mut graph.cf_nodes[loader.0] {
                            if !alg.outputs.contains(&data) {
                                alg.outputs.push(data);
                            }
                        }
                    }
                    _ if options.check_dependencies => {
                        return Err(GraphError::MissingDependency {
                            consumer: consumer_name,
                            data: id,
                        });
                    }
                    _ => {
                        tracing::warn!(
                            data = %id,
                            consumer = %consumer_name,
                            "input has no producer; the consumer can stall at runtime"
                        );
                    }
                }
            }
            if !graph.data_nodes[data.0].consumers.contains(&node) {
                graph.data_nodes[data.0].consumers.push(node);
            }
            if let CfNode::Algorithm(alg) = &mut graph.cf_nodes[node.0] {
                if !alg.inputs.contains(&data) {
                    alg.inputs.push(data);
                }
            }
        }
    }

    Ok(())
}

fn check_output_usage(graph: &PrecedenceGraph, options: &BuildOptions) {
    for alg in graph.algorithm_nodes() {
        if options
            .check_output_usage_ignore
            .iter()
            .any(|ignored| ignored == &alg.name)
        {
            continue;
        }
        if options.data_loader.as_deref() == Some(alg.name.as_str()) {
            continue;
        }
        for &output in &alg.outputs {
            let data = graph.data(output);
            if data.consumers.is_empty() {
                tracing::warn!(
                    algorithm = %alg.name,
                    data = %data.id,
                    "output is never consumed"
                );
            }
        }
    }
}
