//! The evolution driver.
//!
//! One timestep runs these phases in order:
//!
//! ```text
//! input → past window → activity pass → structural mutation
//!       → perturbation → connectivity rule → record State(t)
//! ```
//!
//! That is the default [`UpdateOrder::ActivitiesFirst`]. Under
//! [`UpdateOrder::TopologyFirst`] the connectivity rule runs first on the
//! `t - 1` activities and the activity pass reads the rewired map. Under
//! [`UpdateOrder::Synchronous`] both read the `t - 1` state.
//!
//! Every per-node read during the activity pass comes from a frozen
//! snapshot, so the result does not depend on visitation order.
//! Structural changes requested by rules are collected and applied only once
//! the pass is over.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{EvolutionConfig, Execution, UpdateOrder};
use crate::context::{
    ConnectivityContext, NodeContext, PendingMutations, PerturbationContext,
};
use crate::error::{EngineError, EngineResult};
use crate::input::{StepInput, StopReason, Termination};
use crate::label::NodeLabel;
use crate::rule::{ActivityRule, ConnectivityRule, FnRule, Perturbation};
use crate::state::{ActivityMap, IntoActivityMap, MatrixTrajectory, State, Trajectory};
use crate::topology::{deep_copy, ConnectivityMap, Topology};

/// Lifecycle of an evolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunStatus {
    /// Built; no timestep attempted yet.
    Initializing,
    /// At least one timestep attempted and the run has not ended.
    Running,
    /// The run ended; further steps are no-ops.
    Stopped(StopReason),
}

impl RunStatus {
    /// Whether the run has ended.
    pub fn is_stopped(&self) -> bool {
        matches!(self, RunStatus::Stopped(_))
    }
}

/// Configures an [`Evolution`].
pub struct EvolutionBuilder<A, I = ()> {
    initial_conditions: ActivityMap<A>,
    topology: Topology,
    activity_rule: Option<Box<dyn ActivityRule<A, I>>>,
    connectivity_rule: Option<ConnectivityRule<A>>,
    perturbation: Option<Perturbation<A, I>>,
    past_conditions: Vec<ActivityMap<A>>,
    termination: Option<Termination<A, I>>,
    config: EvolutionConfig,
}

impl<A, I> EvolutionBuilder<A, I> {
    /// Set the per-node activity rule.
    pub fn activity_rule<R>(mut self, rule: R) -> Self
    where
        R: ActivityRule<A, I> + 'static,
    {
        self.activity_rule = Some(Box::new(rule));
        self
    }

    /// Set the activity rule from a closure.
    pub fn activity_fn<F>(self, f: F) -> Self
    where
        F: Fn(&mut NodeContext<'_, A, I>) -> EngineResult<A> + Send + Sync + 'static,
    {
        self.activity_rule(FnRule::new("activity_fn", f))
    }

    /// Set the rule rewriting the topology after each activity pass.
    pub fn connectivity_rule<F>(mut self, f: F) -> Self
    where
        F: for<'a> FnMut(ConnectivityContext<'a, A>) -> EngineResult<ConnectivityMap>
            + Send
            + 'static,
    {
        self.connectivity_rule = Some(Box::new(f));
        self
    }

    /// Set the perturbation applied to rule-computed activities.
    pub fn perturbation<F>(mut self, f: F) -> Self
    where
        F: for<'a> FnMut(PerturbationContext<'a, A, I>) -> EngineResult<A> + Send + 'static,
    {
        self.perturbation = Some(Box::new(f));
        self
    }

    /// Seed the history window with snapshots before timestep 0, oldest first.
    pub fn past_conditions<P>(mut self, past: impl IntoIterator<Item = P>) -> Self
    where
        P: IntoActivityMap<A>,
    {
        self.past_conditions = past.into_iter().map(P::into_activity_map).collect();
        self
    }

    /// Stop once the loop reaches timestep `n` (`n` states recorded).
    ///
    /// Replaces any input source set earlier.
    pub fn timesteps(mut self, n: u64) -> Self {
        self.termination = Some(Termination::Steps(n));
        self
    }

    /// Drive each timestep with the next element; stop after the last.
    ///
    /// Replaces any step count or input source set earlier.
    pub fn input_sequence(mut self, inputs: impl IntoIterator<Item = StepInput<I>>) -> Self {
        self.termination = Some(Termination::Sequence(inputs.into_iter().collect()));
        self
    }

    /// Like [`input_sequence`](Self::input_sequence), each value broadcast to every node.
    pub fn input_values(self, values: impl IntoIterator<Item = I>) -> Self {
        self.input_sequence(values.into_iter().map(StepInput::Value))
    }

    /// Ask `f(t, activities, topology)` for the input before every timestep.
    ///
    /// Returning [`StepInput::Stop`] ends the run.
    pub fn input_fn<F>(mut self, f: F) -> Self
    where
        F: FnMut(u64, &ActivityMap<A>, &ConnectivityMap) -> EngineResult<StepInput<I>>
            + Send
            + 'static,
    {
        self.termination = Some(Termination::Callable(Box::new(f)));
        self
    }

    /// Set the driver configuration.
    pub fn config(mut self, config: EvolutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and record timestep 0.
    pub fn build(self) -> EngineResult<Evolution<A, I>> {
        let matrix_input = self.topology.is_matrix();
        let live = self.topology.into_connectivity_map()?;
        let termination = self.termination.ok_or(EngineError::MissingTermination)?;

        if let Some(rule) = &self.activity_rule {
            if self.initial_conditions.len() != live.node_count() {
                return Err(EngineError::InitialConditionMismatch {
                    expected: live.node_count(),
                    actual: self.initial_conditions.len(),
                });
            }
            if self.config.execution.requires_stateless() && !rule.is_stateless() {
                return Err(EngineError::ParallelIncompatible {
                    rule: rule.name().to_string(),
                    execution: self.config.execution.to_string(),
                });
            }
        }

        if cfg!(not(feature = "parallel")) && self.config.execution == Execution::Parallel {
            warn!("parallel execution unavailable without the `parallel` feature, running sequentially");
        }

        let order_seed = match self.config.execution {
            Execution::Shuffled { seed } => seed,
            _ => self.config.seed,
        };
        let next_index = live.max_index().map_or(0, |i| i + 1);
        let head = State::new(
            Arc::new(self.initial_conditions),
            Arc::new(deep_copy(&live)),
        );
        let mut trajectory = Trajectory::default();
        trajectory.push(head.clone());

        debug!(
            nodes = live.node_count(),
            edges = live.edge_count(),
            execution = %self.config.execution,
            "evolution_initialized"
        );

        Ok(Evolution {
            live,
            head,
            trajectory,
            past_conditions: self.past_conditions.into_iter().map(Arc::new).collect(),
            activity_rule: self.activity_rule,
            connectivity_rule: self.connectivity_rule,
            perturbation: self.perturbation,
            termination,
            rng: StdRng::seed_from_u64(self.config.seed),
            order_rng: StdRng::seed_from_u64(order_seed),
            config: self.config,
            next_index,
            timestep: 0,
            status: RunStatus::Initializing,
            matrix_input,
        })
    }
}

/// A network automaton evolving through time.
///
/// ```
/// use netomaton_engine::{Evolution, StepInput};
///
/// // Collatz on a single node, stopping once the value reaches 1.
/// let mut evolution = Evolution::<u64, ()>::builder(vec![3u64], vec![vec![1.0]])
///     .activity_fn(|ctx| {
///         let n = *ctx.current_activity();
///         Ok(if n % 2 == 0 { n / 2 } else { 3 * n + 1 })
///     })
///     .input_fn(|_, activities, _| {
///         Ok(if activities.values().next() == Some(&1) {
///             StepInput::Stop
///         } else {
///             StepInput::Timestep
///         })
///     })
///     .build()
///     .unwrap();
///
/// let trajectory = evolution.run().unwrap();
/// let values: Vec<u64> = trajectory.activity_lists().into_iter().map(|s| s[0]).collect();
/// assert_eq!(values, vec![3, 10, 5, 16, 8, 4, 2, 1]);
/// ```
pub struct Evolution<A, I = ()> {
    /// Live topology, mutated in place; never aliased by a recorded state.
    live: ConnectivityMap,
    /// Most recently recorded state.
    head: State<A>,
    trajectory: Trajectory<A>,
    past_conditions: Vec<Arc<ActivityMap<A>>>,
    activity_rule: Option<Box<dyn ActivityRule<A, I>>>,
    connectivity_rule: Option<ConnectivityRule<A>>,
    perturbation: Option<Perturbation<A, I>>,
    termination: Termination<A, I>,
    config: EvolutionConfig,
    rng: StdRng,
    order_rng: StdRng,
    /// Smallest integer label never handed out.
    next_index: u64,
    /// Timestep of `head`.
    timestep: u64,
    status: RunStatus,
    matrix_input: bool,
}

impl<A, I> Evolution<A, I> {
    /// Start configuring a run from initial conditions and a topology.
    pub fn builder(
        initial_conditions: impl IntoActivityMap<A>,
        topology: impl Into<Topology>,
    ) -> EvolutionBuilder<A, I> {
        EvolutionBuilder {
            initial_conditions: initial_conditions.into_activity_map(),
            topology: topology.into(),
            activity_rule: None,
            connectivity_rule: None,
            perturbation: None,
            past_conditions: Vec::new(),
            termination: None,
            config: EvolutionConfig::default(),
        }
    }

    /// States recorded so far, including timestep 0.
    pub fn trajectory(&self) -> &Trajectory<A> {
        &self.trajectory
    }

    /// Consume the driver, keeping the trajectory.
    pub fn into_trajectory(self) -> Trajectory<A> {
        self.trajectory
    }

    /// Current lifecycle status.
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Timestep of the most recent state.
    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    /// The live topology.
    pub fn connectivity(&self) -> &ConnectivityMap {
        &self.live
    }

    /// Driver configuration.
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Whether the topology was supplied as an adjacency matrix.
    pub fn was_matrix(&self) -> bool {
        self.matrix_input
    }

    /// Activities `P - 1 - i` steps before `t - 1` for `i in 0..P`, oldest first.
    fn past_window(&self, t: u64) -> Vec<Arc<ActivityMap<A>>> {
        let window = self.past_conditions.len() as i64;
        let states = self.trajectory.states();
        (0..window)
            .map(|i| {
                let at = t as i64 - 1 - window + i;
                if at < 0 {
                    Arc::clone(&self.past_conditions[(window + at) as usize])
                } else {
                    Arc::clone(states[at as usize].shared_activities())
                }
            })
            .collect()
    }
}

/// Activity and mutation requests produced for one node.
struct NodeOutcome<A> {
    label: NodeLabel,
    activity: A,
    pending: PendingMutations<A>,
}

impl<A, I> Evolution<A, I>
where
    A: Clone + Send + Sync,
    I: Clone + Send + Sync,
{
    /// Advance one timestep.
    ///
    /// Returns `Ok(true)` when a state was appended and `Ok(false)` once the
    /// run has stopped. A failing step records nothing and puts the live
    /// topology, the label counter and both random sources back to where they
    /// were after the last recorded state. State held inside rules (such as
    /// the adapters) is not rolled back.
    pub fn step(&mut self) -> EngineResult<bool> {
        if self.status.is_stopped() {
            return Ok(false);
        }
        self.status = RunStatus::Running;
        let t = self.timestep + 1;

        let input = match self
            .termination
            .next(t, self.head.activities(), self.head.connectivity())?
        {
            Ok(input) => input,
            Err(reason) => {
                self.status = RunStatus::Stopped(reason);
                info!(timestep = self.timestep, states = self.trajectory.len(), %reason, "evolution_stopped");
                return Ok(false);
            }
        };

        let next_index = self.next_index;
        let rng = self.rng.clone();
        let order_rng = self.order_rng.clone();

        match self.advance(t, &input) {
            Ok(state) => {
                self.trajectory.push(state.clone());
                self.head = state;
                self.timestep = t;
                Ok(true)
            }
            Err(e) => {
                self.live = deep_copy(self.head.connectivity());
                self.next_index = next_index;
                self.rng = rng;
                self.order_rng = order_rng;
                warn!(timestep = t, error = %e, "evolution_step_failed");
                Err(e)
            }
        }
    }

    /// Step until the run stops and return the trajectory.
    pub fn run(&mut self) -> EngineResult<&Trajectory<A>> {
        info!(execution = %self.config.execution, "evolution_run_start");
        while self.step()? {}
        Ok(&self.trajectory)
    }

    /// Run to completion and return the trajectory in matrix form.
    ///
    /// Node order is ascending by label in both the activity lists and the
    /// adjacency matrices.
    pub fn run_matrices(&mut self) -> EngineResult<MatrixTrajectory<A>> {
        self.run()?.to_matrices()
    }

    fn advance(&mut self, t: u64, input: &StepInput<I>) -> EngineResult<State<A>> {
        let started = Instant::now();
        debug!(
            timestep = t,
            nodes = self.head.connectivity().node_count(),
            update_order = %self.config.update_order,
            "evolution_step_start"
        );

        let past = self.past_window(t);
        let Self {
            live,
            head,
            activity_rule,
            connectivity_rule,
            perturbation,
            config,
            rng,
            order_rng,
            next_index,
            ..
        } = self;
        let order = config.update_order;

        // Topology first and synchronous: the connectivity rule reads t - 1.
        let mut rewired = false;
        if order != UpdateOrder::ActivitiesFirst {
            if let Some(rule) = connectivity_rule.as_mut() {
                rewrite_topology(rule, live, head.activities(), t, &mut *rng, next_index)?;
                rewired = true;
            }
        }
        let pass_connectivity = match order {
            UpdateOrder::TopologyFirst if rewired => Arc::new(deep_copy(live)),
            _ => Arc::clone(head.shared_connectivity()),
        };

        let mut mutated = false;
        let activities = match activity_rule.as_deref() {
            None => Arc::clone(head.shared_activities()),
            Some(rule) => {
                let outcomes = activity_pass(
                    rule,
                    config.execution,
                    order_rng,
                    t,
                    head.activities(),
                    &pass_connectivity,
                    &past,
                    input,
                )?;

                let mut activities = ActivityMap::new();
                let mut computed = Vec::with_capacity(outcomes.len());
                let mut pending = PendingMutations::default();
                for outcome in outcomes {
                    activities.insert(outcome.label.clone(), outcome.activity);
                    computed.push(outcome.label);
                    pending.extend(outcome.pending);
                }

                if order == UpdateOrder::Synchronous && rewired {
                    // Nodes the connectivity rule dropped are not part of State(t).
                    activities.retain(|label, _| live.contains(label));
                }

                if !pending.is_empty() {
                    apply_mutations(live, next_index, &mut activities, pending, t)?;
                    mutated = true;
                }

                if let Some(perturb) = perturbation.as_mut() {
                    for label in &computed {
                        let Some(activity) = activities.remove(label) else {
                            continue;
                        };
                        let adjusted = perturb(PerturbationContext {
                            node_label: label,
                            activity,
                            timestep: t,
                            input: input.for_node(label, t)?,
                            rng: &mut *rng,
                        })?;
                        activities.insert(label.clone(), adjusted);
                    }
                }
                Arc::new(activities)
            }
        };

        if order == UpdateOrder::ActivitiesFirst {
            if let Some(rule) = connectivity_rule.as_mut() {
                rewrite_topology(rule, live, &activities, t, &mut *rng, next_index)?;
                rewired = true;
            }
        }

        let connectivity = match (rewired, mutated, order) {
            (false, false, _) => Arc::clone(head.shared_connectivity()),
            (true, false, UpdateOrder::TopologyFirst) => pass_connectivity,
            _ => Arc::new(deep_copy(live)),
        };

        debug!(
            timestep = t,
            nodes = connectivity.node_count(),
            topology_changed = rewired || mutated,
            duration_ms = started.elapsed().as_millis() as u64,
            "evolution_step_complete"
        );

        Ok(State::new(activities, connectivity))
    }
}

/// Replace the live map with the connectivity rule's output.
fn rewrite_topology<A>(
    rule: &mut ConnectivityRule<A>,
    live: &mut ConnectivityMap,
    activities: &ActivityMap<A>,
    t: u64,
    rng: &mut StdRng,
    next_index: &mut u64,
) -> EngineResult<()> {
    let current = std::mem::take(live);
    *live = rule(ConnectivityContext {
        connectivity: current,
        activities,
        timestep: t,
        rng,
    })?;
    if let Some(max) = live.max_index() {
        *next_index = (*next_index).max(max + 1);
    }
    Ok(())
}

/// Evaluate the activity rule for every node of `connectivity`, reading `activities`.
///
/// Outcomes come back in ascending label order whatever the visitation order.
#[allow(clippy::too_many_arguments)]
fn activity_pass<A, I>(
    rule: &dyn ActivityRule<A, I>,
    execution: Execution,
    order_rng: &mut StdRng,
    t: u64,
    activities: &ActivityMap<A>,
    connectivity: &ConnectivityMap,
    past: &[Arc<ActivityMap<A>>],
    input: &StepInput<I>,
) -> EngineResult<Vec<NodeOutcome<A>>>
where
    A: Send + Sync,
    I: Sync,
{
    let evaluate = |label: &NodeLabel| -> EngineResult<NodeOutcome<A>> {
        let node_input = input.for_node(label, t)?;
        let mut ctx = NodeContext::build(label, t, activities, connectivity, past, node_input)?;
        let activity = rule.apply(&mut ctx)?;
        Ok(NodeOutcome {
            label: label.clone(),
            activity,
            pending: ctx.into_pending(),
        })
    };

    match execution {
        Execution::Sequential => connectivity.labels().map(evaluate).collect(),
        Execution::Shuffled { .. } => {
            let mut labels: Vec<&NodeLabel> = connectivity.labels().collect();
            labels.shuffle(order_rng);
            let mut outcomes = labels
                .into_iter()
                .map(evaluate)
                .collect::<EngineResult<Vec<_>>>()?;
            outcomes.sort_by(|a, b| a.label.cmp(&b.label));
            Ok(outcomes)
        }
        Execution::Parallel => parallel_pass(connectivity, evaluate),
    }
}

#[cfg(feature = "parallel")]
fn parallel_pass<A, F>(connectivity: &ConnectivityMap, evaluate: F) -> EngineResult<Vec<NodeOutcome<A>>>
where
    A: Send,
    F: Fn(&NodeLabel) -> EngineResult<NodeOutcome<A>> + Send + Sync,
{
    use rayon::prelude::*;

    let labels: Vec<&NodeLabel> = connectivity.labels().collect();
    labels.par_iter().map(|label| evaluate(*label)).collect()
}

#[cfg(not(feature = "parallel"))]
fn parallel_pass<A, F>(connectivity: &ConnectivityMap, evaluate: F) -> EngineResult<Vec<NodeOutcome<A>>>
where
    F: Fn(&NodeLabel) -> EngineResult<NodeOutcome<A>>,
{
    connectivity.labels().map(evaluate).collect()
}

/// Apply removals, then additions, to the live map and the new activities.
fn apply_mutations<A>(
    live: &mut ConnectivityMap,
    next_index: &mut u64,
    activities: &mut ActivityMap<A>,
    pending: PendingMutations<A>,
    t: u64,
) -> EngineResult<()> {
    let removed = pending.removals.len();
    let added = pending.additions.len();

    for label in &pending.removals {
        live.remove_node(label);
        activities.remove(label);
    }

    let mut inserted = Vec::with_capacity(added);
    for addition in pending.additions {
        let label = match addition.label {
            Some(label) if live.contains(&label) => {
                return Err(EngineError::DuplicateNode { label });
            }
            Some(label) => label,
            None => NodeLabel::Index(*next_index),
        };
        if let Some(i) = label.index() {
            *next_index = (*next_index).max(i + 1);
        }
        live.insert_node(label.clone());
        activities.insert(label.clone(), addition.activity);
        inserted.push((label, addition.outgoing_links));
    }

    // Links go in once every new node exists, so new nodes may link to each other.
    for (source, links) in inserted {
        for (target, records) in links {
            let incoming = live
                .incoming_mut(&target)
                .ok_or_else(|| EngineError::NodeNotFound {
                    label: target.clone(),
                })?;
            incoming.entry(source.clone()).or_default().extend(records);
        }
    }

    debug!(timestep = t, added, removed, "structural_mutation_applied");
    Ok(())
}
