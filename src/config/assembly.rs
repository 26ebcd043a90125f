// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Turns a parsed configuration into a populated graph builder and the
//! option structs the graph and service constructors consume.

use crate::algorithms::StubAlgorithm;
use crate::config::{Config, NodeConfig, SchedulerOptions};
use crate::errors::GraphError;
use crate::graph::builder::{BuildOptions, GraphBuilder, HubProps};
use crate::graph::visitors::rankers::RankingStrategy;
use crate::precedence::PrecedenceOptions;
use std::path::PathBuf;
use std::sync::Arc;

/// Populate a [`GraphBuilder`] from the configured control flow tree,
/// instantiating a stub algorithm per algorithm node.
pub fn assemble(config: &Config) -> Result<GraphBuilder, GraphError> {
    let mut builder = GraphBuilder::new("precedence.rules");

    for node in &config.control_flow {
        match node {
            NodeConfig::Hub {
                name,
                parent,
                concurrent,
                prompt_decision,
                mode_or,
                all_pass,
                inverted,
            } => {
                let props = HubProps {
                    concurrent: *concurrent,
                    prompt_decision: *prompt_decision,
                    mode_or: *mode_or,
                    all_pass: *all_pass,
                    inverted: *inverted,
                };
                match parent {
                    None => {
                        builder.add_head(name, props)?;
                    }
                    Some(parent) => {
                        builder.add_decision_hub(parent, name, props)?;
                    }
                }
            }
            NodeConfig::Algorithm {
                name,
                parent,
                inputs,
                outputs,
                inverted,
                all_pass,
                blocking,
                accelerated,
                behavior,
                sleep_ms,
                cardinality,
            } => {
                let input_refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
                let output_refs: Vec<&str> = outputs.iter().map(String::as_str).collect();
                let mut algorithm = StubAlgorithm::new(name)
                    .with_inputs(&input_refs)
                    .with_outputs(&output_refs)
                    .with_behavior(*behavior)
                    .with_cardinality(*cardinality);
                if *blocking {
                    algorithm = algorithm.blocking();
                }
                if *accelerated {
                    algorithm = algorithm.accelerated();
                }
                if *sleep_ms > 0 {
                    algorithm = algorithm.sleeping(*sleep_ms);
                }
                builder.add_algorithm_with(parent, Arc::new(algorithm), *inverted, *all_pass)?;
            }
        }
    }

    Ok(builder)
}

/// Graph build options derived from the scheduler options.
pub fn build_options(options: &SchedulerOptions) -> Result<BuildOptions, GraphError> {
    Ok(BuildOptions {
        data_loader: if options.data_loader_alg.is_empty() {
            None
        } else {
            Some(options.data_loader_alg.clone())
        },
        optimizer: RankingStrategy::from_mode(&options.optimizer)?,
        timing_hints: options.timing_hints.clone(),
        check_dependencies: options.check_dependencies,
        check_output_usage: options.check_output_usage,
        check_output_usage_ignore: options.check_output_usage_ignore_list.clone(),
        verify_rules: options.verify_rules,
    })
}

/// Precedence service options derived from the scheduler options.
pub fn precedence_options(options: &SchedulerOptions) -> PrecedenceOptions {
    PrecedenceOptions {
        dump_precedence_trace: options.dump_precedence_trace,
        precedence_trace_file: options.precedence_trace_file.clone().map(PathBuf::from),
        dump_precedence_rules: options.dump_precedence_rules,
        precedence_rules_file: options.precedence_rules_file.clone().map(PathBuf::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_a_configured_tree() {
        let yaml = r#"
scheduler:
  optimizer: "PCE"
control_flow:
  - kind: hub
    name: top
    concurrent: true
  - kind: hub
    name: selection
    parent: top
    mode_or: true
    prompt_decision: true
  - kind: algorithm
    name: producer
    parent: top
    outputs: [hits]
  - kind: algorithm
    name: filter
    parent: selection
    inputs: [hits]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let builder = assemble(&config).unwrap();
        let graph = builder
            .build(&build_options(&config.scheduler).unwrap())
            .unwrap();

        assert_eq!(graph.alg_count(), 2);
        assert!(graph.hub_index("selection").is_some());
        // PCE ranking ran: producer feeds one consumer
        assert_eq!(graph.algorithm_node("producer").unwrap().rank, 1.0);
        let selection = graph.hub_index("selection").unwrap();
        assert!(graph.decision(selection).unwrap().mode_or);
    }

    #[test]
    fn bad_optimizer_surfaces_as_graph_error() {
        let options = SchedulerOptions {
            optimizer: "NOPE".to_string(),
            ..SchedulerOptions::default()
        };
        assert!(matches!(
            build_options(&options),
            Err(GraphError::UnknownOptimizer(_))
        ));
    }
}
