//! Run configuration and serializable run descriptions.
//!
//! [`EvolutionConfig`] carries the knobs of the driver itself (execution
//! strategy, random seed). [`RunDescription`] is the JSON document form of a
//! whole run: initial conditions, topology, termination and past conditions.
//! Rules are code and never part of a description; the caller supplies them
//! on the builder returned by [`RunDescription::into_builder`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::evolution::{Evolution, EvolutionBuilder};
use crate::input::StepInput;
use crate::label::NodeLabel;
use crate::state::{ActivityMap, IntoActivityMap};
use crate::topology::Topology;

/// How the activity pass visits nodes within one timestep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Execution {
    /// Ascending label order on the calling thread.
    #[default]
    Sequential,
    /// A seeded random permutation of the nodes, on the calling thread.
    Shuffled { seed: u64 },
    /// Fan out over the rayon thread pool (`parallel` feature).
    Parallel,
}

impl Execution {
    /// Whether the strategy may only be used with stateless rules.
    pub fn requires_stateless(&self) -> bool {
        !matches!(self, Execution::Sequential)
    }
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Execution::Sequential => f.write_str("sequential"),
            Execution::Shuffled { seed } => write!(f, "shuffled(seed={seed})"),
            Execution::Parallel => f.write_str("parallel"),
        }
    }
}

/// Which half of a timestep sees the other's result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOrder {
    /// Activity pass on the previous topology, then the connectivity rule
    /// over the new activities.
    #[default]
    ActivitiesFirst,
    /// Connectivity rule over the previous activities, then the activity
    /// pass on the new topology.
    TopologyFirst,
    /// Both read only the previous state.
    Synchronous,
}

impl fmt::Display for UpdateOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOrder::ActivitiesFirst => f.write_str("activities_first"),
            UpdateOrder::TopologyFirst => f.write_str("topology_first"),
            UpdateOrder::Synchronous => f.write_str("synchronous"),
        }
    }
}

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Node visitation strategy for the activity pass.
    #[serde(default)]
    pub execution: Execution,

    /// Ordering of the activity pass and the connectivity rule.
    #[serde(default)]
    pub update_order: UpdateOrder,

    /// Seed of the random source handed to perturbations and connectivity rules.
    #[serde(default)]
    pub seed: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            execution: Execution::Sequential,
            update_order: UpdateOrder::ActivitiesFirst,
            seed: 0,
        }
    }
}

impl EvolutionConfig {
    /// Sequential execution with the given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Visit nodes in a seeded random order each timestep.
    pub fn shuffled(order_seed: u64) -> Self {
        Self {
            execution: Execution::Shuffled { seed: order_seed },
            ..Default::default()
        }
    }

    /// Evaluate nodes on the rayon thread pool.
    pub fn parallel() -> Self {
        Self {
            execution: Execution::Parallel,
            ..Default::default()
        }
    }

    /// Replace the update order.
    pub fn with_update_order(mut self, update_order: UpdateOrder) -> Self {
        self.update_order = update_order;
        self
    }

    /// Replace the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Initial or past conditions as they appear in a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Conditions<A> {
    /// Positional: element `i` is the activity of node `i`.
    List(Vec<A>),
    /// Keyed by node label.
    Map(BTreeMap<NodeLabel, A>),
}

impl<A> IntoActivityMap<A> for Conditions<A> {
    fn into_activity_map(self) -> ActivityMap<A> {
        match self {
            Conditions::List(values) => values.into_activity_map(),
            Conditions::Map(values) => values,
        }
    }
}

/// Metadata about a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    /// Name of the run.
    #[serde(default)]
    pub name: String,
    /// Version of the description schema.
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for RunMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: default_version(),
        }
    }
}

/// A complete, rule-less description of a run.
///
/// ```json
/// {
///   "meta": { "name": "ring" },
///   "initial_conditions": [0, 1, 0],
///   "topology": [[1, 1, 1], [1, 1, 1], [1, 1, 1]],
///   "timesteps": 10,
///   "config": { "execution": { "strategy": "sequential" }, "seed": 7 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "A: Deserialize<'de>, I: Deserialize<'de>"))]
pub struct RunDescription<A, I = Value> {
    #[serde(default)]
    pub meta: RunMeta,
    pub initial_conditions: Conditions<A>,
    /// Adjacency matrix or connectivity map, detected on load.
    pub topology: Value,
    /// Fixed step count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timesteps: Option<u64>,
    /// Per-step inputs, each broadcast to every node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Vec<I>>,
    /// Historical snapshots before timestep 0, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub past_conditions: Vec<Conditions<A>>,
    #[serde(default)]
    pub config: EvolutionConfig,
}

impl<A, I> RunDescription<A, I>
where
    A: for<'de> Deserialize<'de>,
    I: for<'de> Deserialize<'de>,
{
    /// Parse a description from JSON text.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a description from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }
}

impl<A, I> RunDescription<A, I> {
    /// The topology, checked for a supported shape.
    pub fn topology(&self) -> EngineResult<Topology> {
        Topology::from_json(&self.topology)
    }

    /// Turn the description into a builder awaiting its rules.
    ///
    /// An input sequence takes precedence over `timesteps` when both are set.
    pub fn into_builder(self) -> EngineResult<EvolutionBuilder<A, I>> {
        let topology = self.topology()?;
        let mut builder = Evolution::builder(self.initial_conditions, topology)
            .past_conditions(self.past_conditions)
            .config(self.config);
        builder = match (self.input, self.timesteps) {
            (Some(inputs), _) => builder.input_sequence(inputs.into_iter().map(StepInput::Value)),
            (None, Some(n)) => builder.timesteps(n),
            (None, None) => return Err(EngineError::MissingTermination),
        };
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvolutionConfig::default();
        assert_eq!(config.execution, Execution::Sequential);
        assert!(!config.execution.requires_stateless());
        assert!(EvolutionConfig::shuffled(3).execution.requires_stateless());
        assert_eq!(EvolutionConfig::seeded(9).seed, 9);
    }

    #[test]
    fn test_execution_serialization() {
        let json = serde_json::to_value(Execution::Shuffled { seed: 4 }).unwrap();
        assert_eq!(json, serde_json::json!({ "strategy": "shuffled", "seed": 4 }));

        let config: EvolutionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EvolutionConfig::default());
    }

    #[test]
    fn test_update_order_from_json() {
        let config: EvolutionConfig =
            serde_json::from_str(r#"{"update_order": "topology_first", "seed": 2}"#).unwrap();
        assert_eq!(config.update_order, UpdateOrder::TopologyFirst);
        assert_eq!(EvolutionConfig::default().update_order, UpdateOrder::ActivitiesFirst);
        assert_eq!(UpdateOrder::Synchronous.to_string(), "synchronous");
    }

    #[test]
    fn test_description_from_json() {
        let description: RunDescription<u8> = RunDescription::from_json_str(
            r#"{
                "initial_conditions": {"0": 1, "1": 0},
                "topology": [[0, 1], [1, 0]],
                "timesteps": 4,
                "config": {"seed": 11}
            }"#,
        )
        .unwrap();

        assert_eq!(description.meta.version, "1.0");
        assert_eq!(description.config.seed, 11);
        assert!(description.topology().unwrap().is_matrix());

        let initial = description.initial_conditions.clone().into_activity_map();
        assert_eq!(initial.get(&NodeLabel::Index(0)), Some(&1));
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Spin(i8);

    #[test]
    fn test_description_with_non_default_types() {
        let description: RunDescription<Spin, Spin> = RunDescription::from_json_str(
            r#"{
                "initial_conditions": [1, -1],
                "topology": [[1, 1], [1, 1]],
                "input": [1, -1, 1],
                "past_conditions": [[-1, -1]]
            }"#,
        )
        .unwrap();

        assert_eq!(description.input.as_ref().map(Vec::len), Some(3));
        assert_eq!(
            description.past_conditions,
            vec![Conditions::List(vec![Spin(-1), Spin(-1)])]
        );
    }

    #[test]
    fn test_description_without_termination() {
        let description: RunDescription<u8> = RunDescription::from_json_str(
            r#"{"initial_conditions": [0], "topology": [[1]]}"#,
        )
        .unwrap();
        assert!(matches!(
            description.into_builder(),
            Err(EngineError::MissingTermination)
        ));
    }

    #[test]
    fn test_description_rejects_scalar_topology() {
        let description: RunDescription<u8> = RunDescription::from_json_str(
            r#"{"initial_conditions": [0], "topology": 3, "timesteps": 2}"#,
        )
        .unwrap();
        assert!(matches!(
            description.topology(),
            Err(EngineError::UnsupportedTopology { .. })
        ));
    }
}
