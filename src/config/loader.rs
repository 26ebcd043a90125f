// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! YAML configuration for the scheduler and, for the demo driver, the
//! control flow tree it runs.
//!
//! # Example
//! ```yaml
//! scheduler:
//!   event_slots: 2
//!   thread_pool_size: -1
//!   optimizer: "PCE"
//! control_flow:
//!   - kind: hub
//!     name: top
//!     concurrent: true
//!   - kind: algorithm
//!     name: producer
//!     parent: top
//!     outputs: [hits]
//!   - kind: algorithm
//!     name: consumer
//!     parent: top
//!     inputs: [hits]
//! ```

use crate::algorithms::StubBehavior;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Main configuration: scheduler options plus the control flow description.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerOptions,
    pub control_flow: Vec<NodeConfig>,
}

fn d_true() -> bool {
    true
}

fn d_thread_pool_size() -> i32 {
    -1
}

fn d_offload_threads() -> usize {
    2
}

fn d_event_slots() -> usize {
    1
}

/// Scheduler options.
///
/// Defaults match an unconfigured production setup: all hardware threads,
/// no blocking cap, two offload threads, validators on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerOptions {
    /// Number of event slots (and whiteboard stores) to run with.
    pub event_slots: usize,
    /// Worker threads in the arena; -1 requests all available hardware
    /// threads, -100 bypasses the arena and runs every algorithm inline in
    /// the scheduler's own loop.
    pub thread_pool_size: i32,
    /// Extra parallelism on top of `thread_pool_size + 1`.
    pub max_parallelism_extra: i32,
    /// Cap on concurrently running CPU-blocking algorithms; 0 = unlimited.
    pub max_blocking_algos_in_flight: u32,
    /// Size of the offload pool for accelerator-offloaded algorithms.
    pub num_offload_threads: usize,
    /// Route blocking algorithms through their own queue and cap.
    pub preemptive_blocking_tasks: bool,
    /// Dry-run the execution flow once before accepting events.
    pub simulate_execution: bool,
    /// Task priority rule: "", "PCE", "COD", "DRE", "E" or "T".
    pub optimizer: String,
    /// Algorithm attributed as producer of otherwise-unproduced inputs.
    pub data_loader_alg: String,
    /// Fail at initialization on inputs nothing produces.
    pub check_dependencies: bool,
    /// Warn about outputs nothing consumes.
    pub check_output_usage: bool,
    /// Algorithms exempt from the output usage check.
    pub check_output_usage_ignore_list: Vec<String>,
    /// Verify the precedence rules for common errors at initialization.
    pub verify_rules: bool,
    /// Log the input/output dependencies of every algorithm at startup.
    pub show_data_dependencies: bool,
    /// Log the configured data flow at startup.
    pub show_data_flow: bool,
    /// Log the configured control flow at startup.
    pub show_control_flow: bool,
    /// Include sub-slot states in state dumps.
    pub verbose_sub_slots: bool,
    /// Append run-simulation convergence to a CSV file.
    pub dump_intra_event_dynamics: bool,
    /// Dump the assembled precedence rules as GraphML.
    pub dump_precedence_rules: bool,
    pub precedence_rules_file: Option<String>,
    /// Record and dump per-event precedence traces as GraphML.
    pub dump_precedence_trace: bool,
    pub precedence_trace_file: Option<String>,
    /// Average runtimes per algorithm, consumed by the "T" optimizer.
    pub timing_hints: HashMap<String, f32>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            event_slots: d_event_slots(),
            thread_pool_size: d_thread_pool_size(),
            max_parallelism_extra: 0,
            max_blocking_algos_in_flight: 0,
            num_offload_threads: d_offload_threads(),
            preemptive_blocking_tasks: false,
            simulate_execution: false,
            optimizer: String::new(),
            data_loader_alg: String::new(),
            check_dependencies: false,
            check_output_usage: false,
            check_output_usage_ignore_list: Vec::new(),
            verify_rules: d_true(),
            show_data_dependencies: d_true(),
            show_data_flow: false,
            show_control_flow: false,
            verbose_sub_slots: false,
            dump_intra_event_dynamics: false,
            dump_precedence_rules: false,
            precedence_rules_file: None,
            dump_precedence_trace: false,
            precedence_trace_file: None,
            timing_hints: HashMap::new(),
        }
    }
}

/// One node of the configured control flow tree.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    /// A decision hub. Exactly one hub, the head, has no parent.
    Hub {
        name: String,
        parent: Option<String>,
        #[serde(default)]
        concurrent: bool,
        #[serde(default)]
        prompt_decision: bool,
        #[serde(default)]
        mode_or: bool,
        #[serde(default)]
        all_pass: bool,
        #[serde(default)]
        inverted: bool,
    },
    /// A (stub) algorithm under a hub.
    Algorithm {
        name: String,
        parent: String,
        #[serde(default)]
        inputs: Vec<String>,
        #[serde(default)]
        outputs: Vec<String>,
        #[serde(default)]
        inverted: bool,
        #[serde(default)]
        all_pass: bool,
        #[serde(default)]
        blocking: bool,
        #[serde(default)]
        accelerated: bool,
        #[serde(default)]
        behavior: StubBehavior,
        #[serde(default)]
        sleep_ms: u64,
        #[serde(default = "default_cardinality")]
        cardinality: u32,
    },
}

fn default_cardinality() -> u32 {
    1
}

/// Load a config from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Structural checks on a parsed config: a single head hub, parents defined
/// before their children, no duplicate names, a known optimizer mode.
pub fn validate_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use crate::graph::visitors::rankers::RankingStrategy;

    let mut issues: Vec<String> = Vec::new();
    let mut hubs: Vec<&str> = Vec::new();
    let mut names: Vec<&str> = Vec::new();
    let mut heads = 0usize;

    for node in &config.control_flow {
        match node {
            NodeConfig::Hub { name, parent, .. } => {
                if names.contains(&name.as_str()) {
                    issues.push(format!("duplicate node name '{}'", name));
                }
                match parent {
                    None => heads += 1,
                    Some(parent) if !hubs.contains(&parent.as_str()) => {
                        issues.push(format!(
                            "hub '{}' references undefined parent '{}'",
                            name, parent
                        ));
                    }
                    Some(_) => {}
                }
                hubs.push(name.as_str());
                names.push(name.as_str());
            }
            NodeConfig::Algorithm { name, parent, .. } => {
                if !names.contains(&name.as_str()) {
                    names.push(name.as_str());
                }
                if !hubs.contains(&parent.as_str()) {
                    issues.push(format!(
                        "algorithm '{}' references undefined parent '{}'",
                        name, parent
                    ));
                }
            }
        }
    }

    if heads != 1 {
        issues.push(format!(
            "expected exactly one head hub (a hub without a parent), found {}",
            heads
        ));
    }
    if let Err(error) = RankingStrategy::from_mode(&config.scheduler.optimizer) {
        issues.push(error.to_string());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(format!("Configuration validation failed:\n{}", issues.join("\n")).into())
    }
}

/// Load and validate a config from a YAML file.
pub fn load_and_validate_config<P: AsRef<Path>>(
    path: P,
) -> Result<Config, Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    validate_config(&config)?;
    Ok(config)
}
