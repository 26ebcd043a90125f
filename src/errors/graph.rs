// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types for precedence rules graph construction and validation.
//!
//! All of these are raised during graph assembly, before any event runs.
//! A graph that fails to build is terminal for the scheduler: there is no
//! partial-degradation mode for a broken topology.

use thiserror::Error;

/// Errors raised while assembling or validating the precedence rules graph.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Nodes were added before a head decision node was registered.
    #[error("no head decision node registered for graph '{0}'")]
    MissingHead(String),

    /// A child node referenced a decision hub that does not exist.
    #[error("unknown parent decision hub '{0}'")]
    UnknownParent(String),

    /// A decision hub with the same name was registered twice.
    #[error("decision hub '{0}' is already registered")]
    DuplicateNode(String),

    /// A control flow node name could not be resolved.
    #[error("unknown control flow node '{0}'")]
    UnknownNode(String),

    /// An algorithm name could not be resolved.
    #[error("unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// The configured task priority rule is not one of the known modes.
    #[error("unknown optimizer mode '{0}' (expected one of: PCE, COD, DRE, E, T)")]
    UnknownOptimizer(String),

    /// A data object has more than one unconditional producer.
    #[error("topology violations found in the data flow realm:\n{report}")]
    ProductionAmbiguity { report: String },

    /// The data dependency realm contains a strongly connected component.
    #[error("strongly connected components found in the data flow realm:\n{report}")]
    DataFlowCycle { report: String },

    /// An algorithm consumes data that nothing produces and no data loader
    /// is configured to stand in as the producer.
    #[error("input '{data}' of algorithm '{consumer}' has no producer and no data loader is configured")]
    MissingDependency { consumer: String, data: String },

    /// Execution flow simulation made no progress before resolving the root
    /// decision, which means the rules can never converge at runtime.
    #[error("control flow simulation is not converging: {unresolved} node(s) cannot be resolved")]
    NonTerminatingTopology { unresolved: usize },
}
