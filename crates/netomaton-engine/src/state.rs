//! Per-timestep states and the trajectory that collects them.
//!
//! ```text
//! Trajectory = [State(t=0), State(t=1), ...]
//! State      = (ActivityMap, ConnectivityMap)
//! ```
//!
//! Snapshots are held behind `Arc`: a timestep that leaves the topology
//! untouched shares the previous snapshot, while a changed topology is
//! recorded as a fresh copy of the live map. Nothing the driver does after a
//! state is appended can reach it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::label::NodeLabel;
use crate::topology::{to_adjacency_matrix, AdjacencyMatrix, ConnectivityMap};

/// Activities of all nodes at one timestep.
pub type ActivityMap<A> = BTreeMap<NodeLabel, A>;

/// Accepted forms of initial and past conditions.
///
/// A positional sequence labels its elements `0..n`; maps keep their labels.
pub trait IntoActivityMap<A> {
    fn into_activity_map(self) -> ActivityMap<A>;
}

impl<A> IntoActivityMap<A> for ActivityMap<A> {
    fn into_activity_map(self) -> ActivityMap<A> {
        self
    }
}

impl<A> IntoActivityMap<A> for HashMap<NodeLabel, A> {
    fn into_activity_map(self) -> ActivityMap<A> {
        self.into_iter().collect()
    }
}

impl<A> IntoActivityMap<A> for Vec<A> {
    fn into_activity_map(self) -> ActivityMap<A> {
        self.into_iter()
            .enumerate()
            .map(|(i, a)| (NodeLabel::from(i), a))
            .collect()
    }
}

impl<A, const N: usize> IntoActivityMap<A> for [A; N] {
    fn into_activity_map(self) -> ActivityMap<A> {
        Vec::from(self).into_activity_map()
    }
}

/// The pair (activities, connectivity) recorded for one timestep.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct State<A> {
    activities: Arc<ActivityMap<A>>,
    connectivity: Arc<ConnectivityMap>,
}

// Cloning shares both snapshots.
impl<A> Clone for State<A> {
    fn clone(&self) -> Self {
        Self {
            activities: Arc::clone(&self.activities),
            connectivity: Arc::clone(&self.connectivity),
        }
    }
}

impl<A> State<A> {
    pub(crate) fn new(activities: Arc<ActivityMap<A>>, connectivity: Arc<ConnectivityMap>) -> Self {
        Self {
            activities,
            connectivity,
        }
    }

    /// Activity snapshot.
    pub fn activities(&self) -> &ActivityMap<A> {
        &self.activities
    }

    /// Connectivity snapshot.
    pub fn connectivity(&self) -> &ConnectivityMap {
        &self.connectivity
    }

    /// Activity of one node.
    pub fn activity_of(&self, label: &NodeLabel) -> Option<&A> {
        self.activities.get(label)
    }

    pub(crate) fn shared_activities(&self) -> &Arc<ActivityMap<A>> {
        &self.activities
    }

    pub(crate) fn shared_connectivity(&self) -> &Arc<ConnectivityMap> {
        &self.connectivity
    }
}

/// Ordered states of one run, indexed by timestep.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Trajectory<A> {
    states: Vec<State<A>>,
}

impl<A> Clone for Trajectory<A> {
    fn clone(&self) -> Self {
        Self {
            states: self.states.clone(),
        }
    }
}

impl<A> Default for Trajectory<A> {
    fn default() -> Self {
        Self { states: Vec::new() }
    }
}

impl<A> Trajectory<A> {
    pub(crate) fn push(&mut self, state: State<A>) {
        self.states.push(state);
    }

    /// All states, timestep 0 first.
    pub fn states(&self) -> &[State<A>] {
        &self.states
    }

    /// State at a timestep.
    pub fn get(&self, timestep: usize) -> Option<&State<A>> {
        self.states.get(timestep)
    }

    /// Most recent state.
    pub fn last(&self) -> Option<&State<A>> {
        self.states.last()
    }

    /// Number of recorded states (timestep 0 included).
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterate states in timestep order.
    pub fn iter(&self) -> std::slice::Iter<'_, State<A>> {
        self.states.iter()
    }

    /// Activity of one node across all timesteps, `None` where it was absent.
    pub fn activities_of(&self, label: &NodeLabel) -> Vec<Option<&A>> {
        self.states.iter().map(|s| s.activity_of(label)).collect()
    }

    /// Consume the trajectory.
    pub fn into_states(self) -> Vec<State<A>> {
        self.states
    }
}

impl<A: Clone> Trajectory<A> {
    /// Per-timestep activity lists, nodes in ascending label order.
    pub fn activity_lists(&self) -> Vec<Vec<A>> {
        self.states
            .iter()
            .map(|s| s.activities.values().cloned().collect())
            .collect()
    }

    /// Matrix form of the trajectory.
    ///
    /// Returns per-timestep activity lists alongside per-timestep adjacency
    /// matrices, both with node order fixed by ascending label sort. Fails if
    /// a timestep's activities and connectivity disagree on the node set,
    /// since rows of the two lists would then not line up.
    pub fn to_matrices(&self) -> EngineResult<MatrixTrajectory<A>> {
        let mut activities = Vec::with_capacity(self.states.len());
        let mut adjacencies = Vec::with_capacity(self.states.len());
        for state in &self.states {
            if let Some(label) = state
                .connectivity
                .labels()
                .find(|l| !state.activities.contains_key(*l))
            {
                return Err(EngineError::NodeNotFound {
                    label: label.clone(),
                });
            }
            activities.push(state.activities.values().cloned().collect());
            adjacencies.push(to_adjacency_matrix(&state.connectivity));
        }
        Ok(MatrixTrajectory {
            activities,
            adjacencies,
        })
    }
}

impl<'a, A> IntoIterator for &'a Trajectory<A> {
    type Item = &'a State<A>;
    type IntoIter = std::slice::Iter<'a, State<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.states.iter()
    }
}

/// Trajectory expressed as plain lists and dense matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixTrajectory<A> {
    /// Activities per timestep, ascending label order.
    pub activities: Vec<Vec<A>>,
    /// Adjacency matrix per timestep, ascending label order.
    pub adjacencies: Vec<AdjacencyMatrix>,
}
