//! Rule adapters that keep state between applications.
//!
//! Both adapters depend on being applied to every node exactly once per
//! timestep in the sequential order, and report themselves as stateful so
//! the driver refuses to pair them with shuffled or parallel execution.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::BitXor;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::context::NodeContext;
use crate::error::{EngineError, EngineResult};
use crate::label::NodeLabel;
use crate::rule::ActivityRule;
use crate::state::{ActivityMap, IntoActivityMap};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inspectable progress of an [`AsynchronousRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleState {
    /// Nodes in the order they get updated, one per timestep.
    pub update_order: Vec<NodeLabel>,
    /// Index into `update_order` of the node updated this timestep.
    pub position: usize,
    /// Order members visited since the position last advanced.
    pub processed: usize,
}

struct CycleInner {
    state: CycleState,
    members: BTreeSet<NodeLabel>,
    rng: StdRng,
}

impl CycleInner {
    fn step_position(&mut self, reshuffle: bool) {
        self.state.position += 1;
        if self.state.position == self.state.update_order.len() {
            self.state.position = 0;
            if reshuffle {
                self.state.update_order.shuffle(&mut self.rng);
            }
        }
    }

    fn advance(&mut self, reshuffle: bool) {
        self.state.processed = 0;
        self.step_position(reshuffle);
    }

    /// Move past order entries that are no longer in the network.
    fn skip_absent<A>(&mut self, activities: &ActivityMap<A>, reshuffle: bool) {
        for _ in 0..self.state.update_order.len() {
            if activities.contains_key(&self.state.update_order[self.state.position]) {
                return;
            }
            self.step_position(reshuffle);
        }
    }

    /// Order members present in `activities`.
    fn live_members<A>(&self, activities: &ActivityMap<A>) -> usize {
        self.members
            .iter()
            .filter(|label| activities.contains_key(*label))
            .count()
    }
}

/// Updates one node per timestep, cycling through an update order.
///
/// Every other node keeps its previous activity. The position moves on once
/// each node in the order has been visited during the current timestep.
/// Nodes outside the order are never updated and do not count as visits.
/// Order entries whose node has been removed are skipped and stop counting
/// towards a full cycle.
pub struct AsynchronousRule<R> {
    inner: R,
    cycle: Mutex<CycleInner>,
    randomize_each_cycle: bool,
}

impl<R> AsynchronousRule<R> {
    /// Cycle through an explicit order.
    pub fn with_order(inner: R, update_order: Vec<NodeLabel>) -> EngineResult<Self> {
        Self::build(inner, update_order, StdRng::seed_from_u64(0))
    }

    /// Cycle through nodes `0..num_cells` in a seeded random order.
    pub fn shuffled(inner: R, num_cells: usize, seed: u64) -> EngineResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<NodeLabel> = (0..num_cells).map(NodeLabel::from).collect();
        order.shuffle(&mut rng);
        Self::build(inner, order, rng)
    }

    fn build(inner: R, update_order: Vec<NodeLabel>, rng: StdRng) -> EngineResult<Self> {
        if update_order.is_empty() {
            return Err(EngineError::rule(0, "asynchronous update order is empty"));
        }
        let members = update_order.iter().cloned().collect();
        Ok(Self {
            inner,
            cycle: Mutex::new(CycleInner {
                state: CycleState {
                    update_order,
                    position: 0,
                    processed: 0,
                },
                members,
                rng,
            }),
            randomize_each_cycle: false,
        })
    }

    /// Reshuffle the order, from `seed`, every time a cycle completes.
    pub fn randomize_each_cycle(mut self, seed: u64) -> Self {
        self.randomize_each_cycle = true;
        lock(&self.cycle).rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Snapshot of the cycle progress.
    pub fn cycle_state(&self) -> CycleState {
        lock(&self.cycle).state.clone()
    }

    /// The wrapped rule.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<A, I, R> ActivityRule<A, I> for AsynchronousRule<R>
where
    A: Clone,
    R: ActivityRule<A, I>,
{
    fn name(&self) -> &str {
        "asynchronous"
    }

    fn is_stateless(&self) -> bool {
        false
    }

    fn apply(&self, ctx: &mut NodeContext<'_, A, I>) -> EngineResult<A> {
        let label = ctx.node_label();
        let selected = {
            let mut guard = lock(&self.cycle);
            let cycle = &mut *guard;
            cycle.skip_absent(ctx.activities(), self.randomize_each_cycle);
            let selected = cycle.state.update_order.get(cycle.state.position) == Some(label);
            if cycle.members.contains(label) {
                cycle.state.processed += 1;
                if cycle.state.processed >= cycle.live_members(ctx.activities()) {
                    cycle.advance(self.randomize_each_cycle);
                }
            }
            selected
        };

        if selected {
            self.inner.apply(ctx)
        } else {
            Ok(ctx.current_activity().clone())
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for AsynchronousRule<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsynchronousRule")
            .field("inner", &self.inner)
            .field("cycle", &self.cycle_state())
            .field("randomize_each_cycle", &self.randomize_each_cycle)
            .finish()
    }
}

/// Second-order reversible wrapper: `next = rule(current) XOR previous`.
///
/// Seeded with the activities of the timestep before the initial one. To run
/// backwards, swap the last two states: start from `s_t` with `s_{t+1}` as the
/// seed and the trajectory retraces `s_{t-1}, s_{t-2}, ...`.
pub struct ReversibleRule<R, A> {
    inner: R,
    previous: Mutex<ActivityMap<A>>,
}

impl<R, A> ReversibleRule<R, A> {
    /// Wrap `inner`, seeding the previous activities.
    pub fn new(inner: R, previous: impl IntoActivityMap<A>) -> Self {
        Self {
            inner,
            previous: Mutex::new(previous.into_activity_map()),
        }
    }

    /// The wrapped rule.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R, A: Clone> ReversibleRule<R, A> {
    /// Activities the next application will XOR against.
    pub fn previous_activities(&self) -> ActivityMap<A> {
        lock(&self.previous).clone()
    }
}

impl<A, I, R> ActivityRule<A, I> for ReversibleRule<R, A>
where
    A: BitXor<Output = A> + Clone + Send,
    R: ActivityRule<A, I>,
{
    fn name(&self) -> &str {
        "reversible"
    }

    fn is_stateless(&self) -> bool {
        false
    }

    fn apply(&self, ctx: &mut NodeContext<'_, A, I>) -> EngineResult<A> {
        let regular = self.inner.apply(ctx)?;
        let label = ctx.node_label();
        let before = lock(&self.previous)
            .insert(label.clone(), ctx.current_activity().clone())
            .ok_or_else(|| EngineError::NodeNotFound {
                label: label.clone(),
            })?;
        Ok(regular ^ before)
    }
}

impl<R: fmt::Debug, A> fmt::Debug for ReversibleRule<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReversibleRule")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::NodeInput;
    use crate::rule::{activity_fn, IdentityRule};
    use crate::evolution::Evolution;
    use crate::topology::{cellular_automaton, disconnected, to_connectivity_map, ConnectivityMap};

    fn ring(n: usize) -> ConnectivityMap {
        to_connectivity_map(cellular_automaton(n, 1).unwrap()).unwrap()
    }

    /// One synchronous pass of `rule` over `activities`.
    fn pass<R: ActivityRule<u8, ()>>(
        rule: &R,
        map: &ConnectivityMap,
        activities: &ActivityMap<u8>,
    ) -> ActivityMap<u8> {
        map.labels()
            .map(|label| {
                let mut ctx =
                    NodeContext::build(label, 1, activities, map, &[], NodeInput::Timestep)
                        .unwrap();
                (label.clone(), rule.apply(&mut ctx).unwrap())
            })
            .collect()
    }

    fn flip() -> impl ActivityRule<u8, ()> {
        activity_fn::<u8, (), _>(|ctx| Ok(1 - *ctx.current_activity()))
    }

    #[test]
    fn test_asynchronous_updates_one_node_per_pass() {
        let map = ring(3);
        let rule = AsynchronousRule::with_order(
            flip(),
            vec![NodeLabel::Index(2), NodeLabel::Index(0), NodeLabel::Index(1)],
        )
        .unwrap();
        assert!(!ActivityRule::<u8, ()>::is_stateless(&rule));

        let mut activities = vec![0u8, 0, 0].into_activity_map();
        let mut history = Vec::new();
        for _ in 0..4 {
            activities = pass(&rule, &map, &activities);
            history.push(activities.values().copied().collect::<Vec<_>>());
        }
        assert_eq!(
            history,
            vec![vec![0, 0, 1], vec![1, 0, 1], vec![1, 1, 1], vec![1, 1, 0]]
        );
        let state = rule.cycle_state();
        assert_eq!(state.position, 1);
        assert_eq!(state.processed, 0);
    }

    #[test]
    fn test_asynchronous_ignores_nodes_outside_order() {
        let map = ring(4);
        let rule = AsynchronousRule::with_order(flip(), vec![NodeLabel::Index(1)]).unwrap();

        let mut activities = vec![0u8, 0, 0, 0].into_activity_map();
        activities = pass(&rule, &map, &activities);
        assert_eq!(activities.values().copied().collect::<Vec<_>>(), vec![0, 1, 0, 0]);
        activities = pass(&rule, &map, &activities);
        assert_eq!(activities.values().copied().collect::<Vec<_>>(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_asynchronous_skips_removed_nodes() {
        let inner = activity_fn::<i32, (), _>(|ctx| {
            if ctx.node_label().index() == Some(0) && ctx.timestep() == 1 {
                ctx.request_removal_of(NodeLabel::Index(1));
            }
            Ok(ctx.current_activity() + 1)
        });
        let order = (0..4u64).map(NodeLabel::Index).collect();
        let rule = AsynchronousRule::with_order(inner, order).unwrap();

        let mut evolution = Evolution::<i32, ()>::builder(vec![0i32; 4], disconnected(4))
            .activity_rule(rule)
            .timesteps(5)
            .build()
            .unwrap();
        let trajectory = evolution.run().unwrap();

        // node 1 leaves after the first timestep; its turn is skipped
        assert_eq!(
            trajectory.activity_lists(),
            vec![
                vec![0, 0, 0, 0],
                vec![1, 0, 0],
                vec![1, 1, 0],
                vec![1, 1, 1],
                vec![2, 1, 1],
            ]
        );
    }

    #[test]
    fn test_shuffled_order_is_seeded() {
        let a = AsynchronousRule::shuffled(IdentityRule, 10, 7).unwrap();
        let b = AsynchronousRule::shuffled(IdentityRule, 10, 7).unwrap();
        assert_eq!(a.cycle_state().update_order, b.cycle_state().update_order);

        let mut sorted = a.cycle_state().update_order;
        sorted.sort();
        assert_eq!(sorted, (0..10usize).map(NodeLabel::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_order_rejected() {
        assert!(AsynchronousRule::with_order(IdentityRule, Vec::new()).is_err());
    }

    #[test]
    fn test_reversible_rule_runs_backwards() {
        let map = ring(5);
        let parity = || {
            activity_fn::<u8, (), _>(|ctx| {
                Ok(ctx.neighbourhood_activities().iter().fold(0u8, |acc, a| acc ^ **a))
            })
        };

        let s0 = vec![0u8, 1, 1, 0, 1].into_activity_map();
        let seed = vec![1u8, 0, 0, 1, 0].into_activity_map();
        let forward = ReversibleRule::new(parity(), seed.clone());
        let mut states = vec![seed, s0.clone()];
        for _ in 0..4 {
            let next = pass(&forward, &map, states.last().unwrap());
            states.push(next);
        }

        let n = states.len();
        let backward = ReversibleRule::new(parity(), states[n - 1].clone());
        let mut current = states[n - 2].clone();
        for expected in states[..n - 2].iter().rev() {
            current = pass(&backward, &map, &current);
            assert_eq!(&current, expected);
        }
    }

    #[test]
    fn test_reversible_rule_needs_previous_activity() {
        let map = ring(3);
        let rule = ReversibleRule::new(IdentityRule, vec![0u8, 0]);
        let activities = vec![1u8, 1, 1].into_activity_map();
        let label = NodeLabel::Index(2);
        let mut ctx =
            NodeContext::<u8, ()>::build(&label, 1, &activities, &map, &[], NodeInput::Timestep)
                .unwrap();
        assert!(matches!(
            rule.apply(&mut ctx),
            Err(EngineError::NodeNotFound { .. })
        ));
    }
}
