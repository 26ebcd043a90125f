// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Ranking visitors: assign the static `rank` attribute on algorithm nodes
//! that the scheduler's task queues order by.
//!
//! One strategy runs at initialization, selected by the `optimizer`
//! scheduler option:
//!
//! | mode | strategy |
//! |------|----------|
//! | PCE  | by product consumption: how many consumers the outputs have |
//! | COD  | by cumulative out-degree: transitively reachable consumers |
//! | DRE  | by data realm eccentricity: recursive downstream depth |
//! | E    | by eccentricity: longest downstream path, memoized |
//! | T    | by timing: average runtimes supplied as configuration hints |

use crate::errors::GraphError;
use crate::graph::{CfNode, NodeIndex, PrecedenceGraph};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingStrategy {
    ProductConsumption,
    CumulativeOutDegree,
    DataRealmEccentricity,
    Eccentricity,
    Timing,
}

impl RankingStrategy {
    /// Parse the scheduler's `optimizer` option. An empty string selects no
    /// ranking pass at all.
    pub fn from_mode(mode: &str) -> Result<Option<Self>, GraphError> {
        match mode {
            "" => Ok(None),
            "PCE" => Ok(Some(RankingStrategy::ProductConsumption)),
            "COD" => Ok(Some(RankingStrategy::CumulativeOutDegree)),
            "DRE" => Ok(Some(RankingStrategy::DataRealmEccentricity)),
            "E" => Ok(Some(RankingStrategy::Eccentricity)),
            "T" => Ok(Some(RankingStrategy::Timing)),
            other => Err(GraphError::UnknownOptimizer(other.to_string())),
        }
    }
}

/// Apply a ranking strategy to every algorithm node.
pub fn rank_algorithms(
    graph: &mut PrecedenceGraph,
    strategy: RankingStrategy,
    timing_hints: &HashMap<String, f32>,
) {
    let nodes: Vec<NodeIndex> = graph.alg_nodes.clone();
    for node in nodes {
        let rank = match strategy {
            RankingStrategy::ProductConsumption => product_consumption(graph, node),
            RankingStrategy::CumulativeOutDegree => cumulative_out_degree(graph, node),
            RankingStrategy::DataRealmEccentricity => data_realm_eccentricity(graph, node),
            RankingStrategy::Eccentricity => {
                let mut memo = HashMap::new();
                longest_downstream_path(graph, node, &mut memo)
            }
            RankingStrategy::Timing => graph
                .algorithm(node)
                .and_then(|a| timing_hints.get(&a.name))
                .copied()
                .unwrap_or(0.0),
        };

        if let CfNode::Algorithm(alg) = &mut graph.cf_nodes[node.0] {
            alg.rank = rank;
            tracing::debug!(algorithm = %alg.name, rank, "ranked algorithm node");
        }
    }
}

fn product_consumption(graph: &PrecedenceGraph, node: NodeIndex) -> f32 {
    let Some(alg) = graph.algorithm(node) else {
        return 0.0;
    };
    alg.outputs
        .iter()
        .map(|&d| graph.data(d).consumers.len())
        .sum::<usize>() as f32
}

fn cumulative_out_degree(graph: &PrecedenceGraph, node: NodeIndex) -> f32 {
    let mut visited = HashSet::new();
    collect_downstream(graph, node, &mut visited);
    visited.len() as f32
}

fn collect_downstream(graph: &PrecedenceGraph, node: NodeIndex, visited: &mut HashSet<NodeIndex>) {
    let Some(alg) = graph.algorithm(node) else {
        return;
    };
    for &output in &alg.outputs {
        for &consumer in &graph.data(output).consumers {
            if visited.insert(consumer) {
                collect_downstream(graph, consumer, visited);
            }
        }
    }
}

fn data_realm_eccentricity(graph: &PrecedenceGraph, node: NodeIndex) -> f32 {
    fn recurse(graph: &PrecedenceGraph, node: NodeIndex, depth: usize, max_depth: &mut usize) {
        let Some(alg) = graph.algorithm(node) else {
            return;
        };
        let mut is_leaf = true;
        for &output in &alg.outputs {
            for &consumer in &graph.data(output).consumers {
                is_leaf = false;
                recurse(graph, consumer, depth + 1, max_depth);
            }
        }
        if is_leaf && depth > *max_depth {
            *max_depth = depth;
        }
    }

    let mut max_depth = 0;
    recurse(graph, node, 0, &mut max_depth);
    max_depth as f32
}

fn longest_downstream_path(
    graph: &PrecedenceGraph,
    node: NodeIndex,
    memo: &mut HashMap<NodeIndex, f32>,
) -> f32 {
    if let Some(&cached) = memo.get(&node) {
        return cached;
    }
    let Some(alg) = graph.algorithm(node) else {
        return 0.0;
    };

    let mut longest: f32 = 0.0;
    for &output in &alg.outputs {
        for &consumer in &graph.data(output).consumers {
            let depth = 1.0 + longest_downstream_path(graph, consumer, memo);
            if depth > longest {
                longest = depth;
            }
        }
    }

    memo.insert(node, longest);
    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::StubAlgorithm;
    use crate::graph::builder::{BuildOptions, GraphBuilder, HubProps};
    use std::sync::Arc;

    // chain: a -> d1 -> b -> d2 -> c, with d1 also read by c
    fn chain() -> PrecedenceGraph {
        let mut builder = GraphBuilder::new("ranked");
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
            .add_algorithm("head", Arc::new(StubAlgorithm::new("a").with_outputs(&["d1"])))
            .unwrap();
        builder
            .add_algorithm(
                "head",
                Arc::new(StubAlgorithm::new("b").with_inputs(&["d1"]).with_outputs(&["d2"])),
            )
            .unwrap();
        builder
            .add_algorithm(
                "head",
                Arc::new(StubAlgorithm::new("c").with_inputs(&["d1", "d2"])),
            )
            .unwrap();
        builder.build(&BuildOptions::default()).unwrap()
    }

    fn rank_of(graph: &PrecedenceGraph, name: &str) -> f32 {
        graph.algorithm_node(name).unwrap().rank
    }

    #[test]
    fn product_consumption_counts_direct_consumers() {
        let mut graph = chain();
        rank_algorithms(
            &mut graph,
            RankingStrategy::ProductConsumption,
            &HashMap::new(),
        );
        assert_eq!(rank_of(&graph, "a"), 2.0); // d1 read by b and c
        assert_eq!(rank_of(&graph, "b"), 1.0);
        assert_eq!(rank_of(&graph, "c"), 0.0);
    }

    #[test]
    fn cumulative_out_degree_counts_reachable() {
        let mut graph = chain();
        rank_algorithms(
            &mut graph,
            RankingStrategy::CumulativeOutDegree,
            &HashMap::new(),
        );
        assert_eq!(rank_of(&graph, "a"), 2.0); // reaches b and c
        assert_eq!(rank_of(&graph, "b"), 1.0);
        assert_eq!(rank_of(&graph, "c"), 0.0);
    }

    #[test]
    fn eccentricity_measures_longest_path() {
        let mut graph = chain();
        rank_algorithms(&mut graph, RankingStrategy::Eccentricity, &HashMap::new());
        assert_eq!(rank_of(&graph, "a"), 2.0); // a -> b -> c
        assert_eq!(rank_of(&graph, "b"), 1.0);
        assert_eq!(rank_of(&graph, "c"), 0.0);

        let mut graph = chain();
        rank_algorithms(
            &mut graph,
            RankingStrategy::DataRealmEccentricity,
            &HashMap::new(),
        );
        assert_eq!(rank_of(&graph, "a"), 2.0);
    }

    #[test]
    fn timing_rank_uses_hints() {
        let mut graph = chain();
        let hints = HashMap::from([("a".to_string(), 12.5_f32)]);
        rank_algorithms(&mut graph, RankingStrategy::Timing, &hints);
        assert_eq!(rank_of(&graph, "a"), 12.5);
        assert_eq!(rank_of(&graph, "b"), 0.0);
    }

    #[test]
    fn optimizer_modes_parse() {
        assert!(RankingStrategy::from_mode("").unwrap().is_none());
        assert_eq!(
            RankingStrategy::from_mode("PCE").unwrap(),
            Some(RankingStrategy::ProductConsumption)
        );
        assert!(RankingStrategy::from_mode("bogus").is_err());
    }
}
