//! Evolution engine for network automata.
//!
//! A network automaton is a directed, attributed multigraph whose nodes carry
//! an activity. At every timestep an activity rule computes each node's next
//! activity from a read-only view of the previous timestep, and an optional
//! connectivity rule rewrites the graph itself. The engine records the full
//! trajectory of (activities, topology) pairs.
//!
//! ## Core Concepts
//!
//! - **ConnectivityMap**: canonical topology, target → source → connection records
//! - **NodeContext**: what a rule may read about one node at one timestep
//! - **ActivityRule**: per-node update, shared across nodes and threads
//! - **Evolution**: the driver; steps until a step limit or the input runs out
//! - **Trajectory**: every recorded `State`, timestep 0 first
//!
//! ## One Timestep
//!
//! ```text
//! input(t) ─► activity pass over snapshot(t-1) ─► apply node additions/removals
//!          ─► perturbation ─► connectivity rule ─► State(t)
//! ```
//!
//! Rules only ever read the frozen previous snapshot, so the visitation order
//! of nodes cannot change the outcome of a timestep.
//!
//! ## Features
//!
//! - `parallel` - Evaluate the activity pass on the [rayon](https://docs.rs/rayon) thread pool

pub mod adapters;
pub mod config;
mod context;
mod error;
mod evolution;
pub mod init;
mod input;
mod label;
pub mod persistence;
mod rule;
mod state;
pub mod topology;

pub use adapters::{AsynchronousRule, CycleState, ReversibleRule};
pub use config::{Conditions, EvolutionConfig, Execution, RunDescription, RunMeta, UpdateOrder};
pub use context::{
    ConnectivityContext, NodeAddition, NodeContext, OutgoingLinks, PendingMutations,
    PerturbationContext,
};
pub use error::{EngineError, EngineResult};
pub use evolution::{Evolution, EvolutionBuilder, RunStatus};
pub use input::{InputFn, NodeInput, StepInput, StopReason};
pub use label::NodeLabel;
pub use rule::{activity_fn, ActivityRule, ConnectivityRule, FnRule, IdentityRule, Perturbation};
pub use state::{ActivityMap, IntoActivityMap, MatrixTrajectory, State, Trajectory};

// Topology
pub use topology::{
    cellular_automaton, cellular_automaton_2d, cellular_automaton_2d_with, cellular_automaton_with,
    deep_copy, disconnected, lattice, to_adjacency_matrix, to_connectivity_map, watts_strogatz,
    AdjacencyMatrix, Boundary, Connection, ConnectivityMap, IncomingConnections, Neighbourhood,
    Topology,
};

// Persistence
pub use persistence::{TrajectoryMetadata, TrajectoryStore, STORE_DIR};
