//! Error types for the evolution engine.

use thiserror::Error;

use crate::label::NodeLabel;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while configuring or running an evolution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The topology was neither an adjacency matrix nor a connectivity map.
    #[error("unsupported topology representation: {reason}")]
    UnsupportedTopology { reason: String },

    /// Initial conditions do not cover the nodes of the topology.
    #[error("initial conditions specify {actual} nodes but the topology has {expected}")]
    InitialConditionMismatch { expected: usize, actual: usize },

    /// Neither a step count nor an input source was supplied.
    #[error("either a number of timesteps or an input source must be provided")]
    MissingTermination,

    /// A rule asked for a past activity beyond the configured window.
    #[error("past activity depth {requested} exceeds the history window of {window}")]
    PastDepthExceeded { requested: usize, window: usize },

    /// A node referenced by label was not found.
    #[error("node not found: {label}")]
    NodeNotFound { label: NodeLabel },

    /// A node insertion used a label that is already live.
    #[error("node already exists: {label}")]
    DuplicateNode { label: NodeLabel },

    /// Per-node input did not contain a value for a visited node.
    #[error("no input supplied for node {label} at timestep {timestep}")]
    MissingNodeInput { label: NodeLabel, timestep: u64 },

    /// A stateful rule was combined with a concurrent execution strategy.
    #[error("rule {rule:?} keeps internal state and cannot run under {execution}")]
    ParallelIncompatible { rule: String, execution: String },

    /// A caller-supplied rule rejected its input.
    #[error("rule failed at timestep {timestep}{}: {message}", on_node(.node))]
    RuleFailed {
        node: Option<NodeLabel>,
        timestep: u64,
        message: String,
    },

    /// Snapshot serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (file operations).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

fn on_node(node: &Option<NodeLabel>) -> String {
    node.as_ref()
        .map(|n| format!(" on node {n}"))
        .unwrap_or_default()
}

impl EngineError {
    /// Shorthand for a rule failure that is not tied to a particular node.
    pub fn rule(timestep: u64, message: impl Into<String>) -> Self {
        Self::RuleFailed {
            node: None,
            timestep,
            message: message.into(),
        }
    }

    /// Shorthand for a rule failure on a specific node.
    pub fn rule_at(node: NodeLabel, timestep: u64, message: impl Into<String>) -> Self {
        Self::RuleFailed {
            node: Some(node),
            timestep,
            message: message.into(),
        }
    }
}
