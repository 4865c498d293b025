//! Driving input and termination policy.
//!
//! A run ends in one of two ways: after a fixed number of timesteps, or when
//! its input source is exhausted. The input source is either a finite
//! sequence of per-step inputs or a callable consulted before every step.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::label::NodeLabel;
use crate::state::ActivityMap;
use crate::topology::ConnectivityMap;

/// Input driving one timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepInput<I> {
    /// End the run before this timestep executes.
    Stop,
    /// No external data; only the timestep number is meaningful.
    Timestep,
    /// One value broadcast to every node.
    Value(I),
    /// One value per node, looked up by label.
    PerNode(BTreeMap<NodeLabel, I>),
}

impl<I> StepInput<I> {
    /// Whether this input ends the run.
    pub fn is_stop(&self) -> bool {
        matches!(self, StepInput::Stop)
    }

    /// Resolve the input seen by one node.
    pub(crate) fn for_node(&self, label: &NodeLabel, timestep: u64) -> EngineResult<NodeInput<'_, I>> {
        match self {
            StepInput::Stop | StepInput::Timestep => Ok(NodeInput::Timestep),
            StepInput::Value(v) => Ok(NodeInput::Value(v)),
            StepInput::PerNode(values) => values
                .get(label)
                .map(NodeInput::Value)
                .ok_or_else(|| EngineError::MissingNodeInput {
                    label: label.clone(),
                    timestep,
                }),
        }
    }
}

/// Input as seen by a single node.
#[derive(Debug, PartialEq)]
pub enum NodeInput<'a, I> {
    /// The timestep marker: no external input was provided.
    Timestep,
    /// The value supplied for this node.
    Value(&'a I),
}

impl<I> Clone for NodeInput<'_, I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I> Copy for NodeInput<'_, I> {}

impl<'a, I> NodeInput<'a, I> {
    /// The supplied value, if any.
    pub fn value(&self) -> Option<&'a I> {
        match self {
            NodeInput::Timestep => None,
            NodeInput::Value(v) => Some(v),
        }
    }

    /// Whether this is the timestep marker.
    pub fn is_timestep(&self) -> bool {
        matches!(self, NodeInput::Timestep)
    }
}

/// Callable input source: `(t, activities, topology) -> input`.
pub type InputFn<A, I> =
    Box<dyn FnMut(u64, &ActivityMap<A>, &ConnectivityMap) -> EngineResult<StepInput<I>> + Send>;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The input sequence ran out or the input callable returned `Stop`.
    InputExhausted,
    /// The configured number of timesteps was reached.
    StepLimitReached,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::InputExhausted => f.write_str("input exhausted"),
            StopReason::StepLimitReached => f.write_str("step limit reached"),
        }
    }
}

/// Termination policy of a run.
pub(crate) enum Termination<A, I> {
    /// Stop once the loop reaches this timestep.
    Steps(u64),
    /// Feed one element per step, stop after the last.
    Sequence(Vec<StepInput<I>>),
    /// Ask the callable before every step.
    Callable(InputFn<A, I>),
}

impl<A, I: Clone> Termination<A, I> {
    /// Determine the input for timestep `t`, or the reason to stop.
    pub(crate) fn next(
        &mut self,
        t: u64,
        activities: &ActivityMap<A>,
        connectivity: &ConnectivityMap,
    ) -> EngineResult<Result<StepInput<I>, StopReason>> {
        let input = match self {
            Termination::Steps(n) => {
                if t >= *n {
                    return Ok(Err(StopReason::StepLimitReached));
                }
                StepInput::Timestep
            }
            Termination::Sequence(inputs) => match inputs.get((t - 1) as usize) {
                Some(input) => input.clone(),
                None => return Ok(Err(StopReason::InputExhausted)),
            },
            Termination::Callable(f) => f(t, activities, connectivity)?,
        };
        if input.is_stop() {
            return Ok(Err(StopReason::InputExhausted));
        }
        Ok(Ok(input))
    }
}

impl<A, I> fmt::Debug for Termination<A, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Steps(n) => f.debug_tuple("Steps").field(n).finish(),
            Termination::Sequence(inputs) => {
                f.debug_tuple("Sequence").field(&inputs.len()).finish()
            }
            Termination::Callable(_) => f.write_str("Callable"),
        }
    }
}
