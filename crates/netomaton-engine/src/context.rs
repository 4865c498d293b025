//! Read-only views handed to rule callables.
//!
//! A [`NodeContext`] is built for every node on every timestep. It borrows
//! the frozen previous-timestep snapshot, so whichever order nodes are
//! visited in, each rule sees the same activities and the same topology.
//! Structural changes a rule asks for are only recorded here; the driver
//! applies them once the whole activity pass is over.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::input::NodeInput;
use crate::label::NodeLabel;
use crate::state::ActivityMap;
use crate::topology::{Connection, ConnectivityMap, IncomingConnections};

/// Outgoing links of a node being inserted: target → connection records.
pub type OutgoingLinks = BTreeMap<NodeLabel, Vec<Connection>>;

/// A node insertion requested during the activity pass.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAddition<A> {
    /// Activity of the new node at the current timestep.
    pub activity: A,
    /// Connections from the new node to existing nodes.
    pub outgoing_links: OutgoingLinks,
    /// Explicit label; the next unused integer is assigned when `None`.
    pub label: Option<NodeLabel>,
}

/// Structural changes recorded on a context, applied after the activity pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutations<A> {
    pub additions: Vec<NodeAddition<A>>,
    pub removals: Vec<NodeLabel>,
}

impl<A> Default for PendingMutations<A> {
    fn default() -> Self {
        Self {
            additions: Vec::new(),
            removals: Vec::new(),
        }
    }
}

impl<A> PendingMutations<A> {
    /// Whether nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    /// Append another batch of requests, preserving order.
    pub fn extend(&mut self, other: PendingMutations<A>) {
        self.additions.extend(other.additions);
        self.removals.extend(other.removals);
    }
}

/// Everything an activity rule may read about one node at one timestep.
#[derive(Debug)]
pub struct NodeContext<'a, A, I> {
    node_label: &'a NodeLabel,
    timestep: u64,
    activities: &'a ActivityMap<A>,
    neighbour_labels: Vec<&'a NodeLabel>,
    neighbourhood_activities: Vec<&'a A>,
    connection_states: &'a IncomingConnections,
    current_activity: &'a A,
    past_activities: &'a [Arc<ActivityMap<A>>],
    input: NodeInput<'a, I>,
    pending: PendingMutations<A>,
}

impl<'a, A, I> NodeContext<'a, A, I> {
    /// Assemble the context of `label` from the previous-timestep snapshot.
    pub fn build(
        label: &'a NodeLabel,
        timestep: u64,
        activities: &'a ActivityMap<A>,
        connectivity: &'a ConnectivityMap,
        past_activities: &'a [Arc<ActivityMap<A>>],
        input: NodeInput<'a, I>,
    ) -> EngineResult<Self> {
        let connection_states = connectivity
            .incoming(label)
            .ok_or_else(|| EngineError::NodeNotFound {
                label: label.clone(),
            })?;
        let current_activity = lookup(activities, label)?;

        let neighbour_labels: Vec<&'a NodeLabel> = connection_states.keys().collect();
        let neighbourhood_activities = neighbour_labels
            .iter()
            .map(|n| lookup(activities, n))
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Self {
            node_label: label,
            timestep,
            activities,
            neighbour_labels,
            neighbourhood_activities,
            connection_states,
            current_activity,
            past_activities,
            input,
            pending: PendingMutations::default(),
        })
    }

    /// Label of the node being updated.
    pub fn node_label(&self) -> &'a NodeLabel {
        self.node_label
    }

    /// Timestep being computed (the previous snapshot is `timestep - 1`).
    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    /// Full previous-timestep activity snapshot.
    pub fn activities(&self) -> &'a ActivityMap<A> {
        self.activities
    }

    /// Previous activity of any node.
    pub fn activity_of(&self, label: &NodeLabel) -> EngineResult<&'a A> {
        lookup(self.activities, label)
    }

    /// Sources of the node's incoming connections, ascending.
    pub fn neighbour_labels(&self) -> &[&'a NodeLabel] {
        &self.neighbour_labels
    }

    /// Previous activities of the neighbours, in `neighbour_labels` order.
    ///
    /// Includes the node itself when it is connected to itself.
    pub fn neighbourhood_activities(&self) -> &[&'a A] {
        &self.neighbourhood_activities
    }

    /// Incoming connection records keyed by neighbour label.
    pub fn connection_states(&self) -> &'a IncomingConnections {
        self.connection_states
    }

    /// An attribute of the `index`-th connection from `neighbour`.
    pub fn edge_data(&self, neighbour: &NodeLabel, attr: &str, index: usize) -> Option<&'a Value> {
        self.connection_states
            .get(neighbour)
            .and_then(|records| records.get(index))
            .and_then(|record| record.get(attr))
    }

    /// Previous activity of the node itself.
    pub fn current_activity(&self) -> &'a A {
        self.current_activity
    }

    /// Earlier snapshots, oldest first, one per lag in the history window.
    pub fn past_activities(&self) -> &'a [Arc<ActivityMap<A>>] {
        self.past_activities
    }

    /// Activity of `label` `depth` steps before the previous snapshot.
    ///
    /// `depth == 1` is timestep `t - 2`. Fails with `PastDepthExceeded` when
    /// `depth` is zero or beyond the history window.
    pub fn past_activity_of(&self, label: &NodeLabel, depth: usize) -> EngineResult<&'a A> {
        let window = self.past_activities.len();
        if depth == 0 || depth > window {
            return Err(EngineError::PastDepthExceeded {
                requested: depth,
                window,
            });
        }
        lookup(&self.past_activities[window - depth], label)
    }

    /// Input for this node at this timestep.
    pub fn input(&self) -> NodeInput<'a, I> {
        self.input
    }

    /// Request a new node, inserted after the activity pass.
    pub fn request_node_addition(
        &mut self,
        activity: A,
        outgoing_links: OutgoingLinks,
        label: Option<NodeLabel>,
    ) {
        self.pending.additions.push(NodeAddition {
            activity,
            outgoing_links,
            label,
        });
    }

    /// Request removal of this node after the activity pass.
    pub fn request_removal(&mut self) {
        self.pending.removals.push(self.node_label.clone());
    }

    /// Request removal of another node after the activity pass.
    pub fn request_removal_of(&mut self, label: NodeLabel) {
        self.pending.removals.push(label);
    }

    /// Requests recorded so far.
    pub fn pending(&self) -> &PendingMutations<A> {
        &self.pending
    }

    pub(crate) fn into_pending(self) -> PendingMutations<A> {
        self.pending
    }
}

fn lookup<'a, A>(activities: &'a ActivityMap<A>, label: &NodeLabel) -> EngineResult<&'a A> {
    activities
        .get(label)
        .ok_or_else(|| EngineError::NodeNotFound {
            label: label.clone(),
        })
}

/// View handed to a connectivity rule.
///
/// The rule receives ownership of the live map and returns its replacement.
#[derive(Debug)]
pub struct ConnectivityContext<'a, A> {
    /// Live topology. After the activity pass it includes this timestep's
    /// insertions and removals.
    pub connectivity: ConnectivityMap,
    /// Post-perturbation activities of this timestep, or those of the
    /// previous one when the rule runs before the activity pass.
    pub activities: &'a ActivityMap<A>,
    /// Timestep being computed.
    pub timestep: u64,
    /// Random source of the run.
    pub rng: &'a mut StdRng,
}

/// View handed to a perturbation.
#[derive(Debug)]
pub struct PerturbationContext<'a, A, I> {
    /// Node whose activity is being adjusted.
    pub node_label: &'a NodeLabel,
    /// Activity the rule just computed.
    pub activity: A,
    /// Timestep being computed.
    pub timestep: u64,
    /// Input the node saw this timestep.
    pub input: NodeInput<'a, I>,
    /// Random source of the run.
    pub rng: &'a mut StdRng,
}
