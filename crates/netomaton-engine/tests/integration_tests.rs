//! End-to-end runs of the evolution engine.

use netomaton_engine::init::init_simple;
use netomaton_engine::{
    cellular_automaton, disconnected, to_adjacency_matrix, to_connectivity_map,
    ActivityMap, AsynchronousRule, Connection, EngineError, EngineResult, Evolution,
    EvolutionConfig, NodeContext, NodeLabel, OutgoingLinks, ReversibleRule, RunStatus, StepInput,
    StopReason, TrajectoryStore,
};
use proptest::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

/// Elementary CA rule computed from label arithmetic on a ring.
fn eca(rule: u8) -> impl Fn(&mut NodeContext<'_, u8, ()>) -> EngineResult<u8> + Send + Sync {
    move |ctx| {
        let n = ctx.activities().len() as u64;
        let i = ctx
            .node_label()
            .index()
            .ok_or_else(|| EngineError::rule(ctx.timestep(), "ring cells need integer labels"))?;
        let left = *ctx.activity_of(&NodeLabel::Index((i + n - 1) % n))?;
        let centre = *ctx.current_activity();
        let right = *ctx.activity_of(&NodeLabel::Index((i + 1) % n))?;
        let pattern = (left << 2) | (centre << 1) | right;
        Ok((rule >> pattern) & 1)
    }
}

fn eca_run(rule: u8, initial: Vec<u8>, steps: u64, config: EvolutionConfig) -> Vec<Vec<u8>> {
    let n = initial.len();
    let mut evolution = Evolution::<u8, ()>::builder(initial, cellular_automaton(n, 1).unwrap())
        .activity_fn(eca(rule))
        .timesteps(steps)
        .config(config)
        .build()
        .unwrap();
    evolution.run().unwrap().activity_lists()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_collatz_sequence() {
    let mut evolution = Evolution::<u64, u8>::builder(vec![3u64], vec![vec![1.0]])
        .activity_fn(|ctx| {
            let n = *ctx.current_activity();
            Ok(if n % 2 == 0 { n / 2 } else { 3 * n + 1 })
        })
        .input_fn(|_, activities, _| {
            Ok(if activities[&NodeLabel::Index(0)] == 1 {
                StepInput::Stop
            } else {
                StepInput::Value(1)
            })
        })
        .build()
        .unwrap();

    let values: Vec<u64> = evolution
        .run()
        .unwrap()
        .activity_lists()
        .into_iter()
        .map(|s| s[0])
        .collect();
    assert_eq!(values, vec![3, 10, 5, 16, 8, 4, 2, 1]);
}

#[test]
fn test_logistic_map() {
    let mut evolution = Evolution::<f64, ()>::builder(vec![0.5], vec![vec![2.5]])
        .activity_fn(|ctx| {
            let x = *ctx.current_activity();
            let weight = ctx
                .edge_data(ctx.node_label(), "weight", 0)
                .and_then(|w| w.as_f64())
                .unwrap_or(1.0);
            Ok(weight * x * (1.0 - x))
        })
        .timesteps(20)
        .build()
        .unwrap();

    let expected = [
        0.5,
        0.625,
        0.5859375,
        0.606536865234375,
        0.5966247408650815,
        0.6016591486318896,
        0.5991635437485985,
        0.6004164789780495,
        0.5997913268741273,
        0.6001042277017528,
        0.599947858990589,
        0.6000260637079934,
        0.5999869664477111,
        0.6000065163514607,
        0.5999967417181126,
        0.6000016291144027,
        0.5999991854361636,
        0.6000004072802594,
        0.5999997963594557,
        0.6000001018201685,
    ];
    let actual: Vec<f64> = evolution
        .run()
        .unwrap()
        .activity_lists()
        .into_iter()
        .map(|s| s[0])
        .collect();
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-12, "{a} != {e}");
    }
}

#[test]
fn test_finite_state_machine_driven_by_input() {
    // turnstile: a push locks it (0), a coin unlocks it (1)
    let mut evolution = Evolution::<u8, char>::builder(vec![0u8], disconnected(1))
        .activity_fn(|ctx| match ctx.input().value() {
            Some('p') => Ok(0),
            Some('c') => Ok(1),
            other => Err(EngineError::rule(
                ctx.timestep(),
                format!("unrecognized symbol {other:?}"),
            )),
        })
        .input_values("cpcpp".chars())
        .build()
        .unwrap();

    let trajectory = evolution.run().unwrap();
    assert_eq!(
        trajectory.activity_lists(),
        vec![vec![0], vec![1], vec![0], vec![1], vec![0], vec![0]]
    );
    assert_eq!(
        evolution.status(),
        RunStatus::Stopped(StopReason::InputExhausted)
    );
}

#[test]
fn test_rejecting_machine_halts_the_run() {
    let mut evolution = Evolution::<u8, char>::builder(vec![0u8], disconnected(1))
        .activity_fn(|ctx| match ctx.input().value() {
            Some('a') => Ok(1),
            _ => Err(EngineError::rule_at(ctx.node_label().clone(), ctx.timestep(), "reject")),
        })
        .input_values("aab".chars())
        .build()
        .unwrap();

    let err = evolution.run().unwrap_err();
    assert!(matches!(err, EngineError::RuleFailed { timestep: 3, .. }));
    assert_eq!(evolution.trajectory().len(), 3);
}

#[test]
fn test_rule_30_from_single_cell() {
    let rows = eca_run(30, init_simple(7, 1u8), 4, EvolutionConfig::default());
    assert_eq!(
        rows,
        vec![
            vec![0, 0, 0, 1, 0, 0, 0],
            vec![0, 0, 1, 1, 1, 0, 0],
            vec![0, 1, 1, 0, 0, 1, 0],
            vec![1, 1, 0, 1, 1, 1, 1],
        ]
    );
}

#[test]
fn test_reversible_rule_recovers_the_past() {
    let n = 9;
    let rule = 90;
    let before: Vec<u8> = vec![0, 1, 0, 0, 1, 1, 0, 1, 0];
    let start: Vec<u8> = vec![1, 0, 0, 1, 0, 1, 1, 0, 0];

    let mut forward = Evolution::<u8, ()>::builder(start.clone(), cellular_automaton(n, 1).unwrap())
        .activity_rule(ReversibleRule::new(netomaton_engine::activity_fn(eca(rule)), before.clone()))
        .timesteps(6)
        .build()
        .unwrap();
    let states = forward.run().unwrap().activity_lists();
    assert_eq!(states[0], start);

    // swap the last two states and run back
    let last = states[5].clone();
    let second_last = states[4].clone();
    let mut backward = Evolution::<u8, ()>::builder(second_last, cellular_automaton(n, 1).unwrap())
        .activity_rule(ReversibleRule::new(netomaton_engine::activity_fn(eca(rule)), last))
        .timesteps(6)
        .build()
        .unwrap();
    let back = backward.run().unwrap().activity_lists();

    assert_eq!(back[1], states[3]);
    assert_eq!(back[4], states[0]);
    assert_eq!(back[5], before);
}

#[test]
fn test_asynchronous_rule_updates_one_cell_per_step() {
    let order: Vec<NodeLabel> = (0..4u64).map(NodeLabel::Index).collect();
    let rule = AsynchronousRule::with_order(netomaton_engine::activity_fn(eca(254)), order).unwrap();

    let mut evolution = Evolution::<u8, ()>::builder(vec![0u8, 0, 1, 0], cellular_automaton(4, 1).unwrap())
        .activity_rule(rule)
        .timesteps(6)
        .build()
        .unwrap();

    let rows = evolution.run().unwrap().activity_lists();
    for pair in rows.windows(2) {
        let changed = pair[0].iter().zip(&pair[1]).filter(|(a, b)| a != b).count();
        assert!(changed <= 1, "{pair:?}");
    }
    assert_eq!(rows[4], vec![0, 1, 1, 1]);
    assert_eq!(rows[5], vec![1, 1, 1, 1]);
}

#[test]
fn test_asynchronous_rule_is_rejected_by_parallel_execution() {
    let rule = AsynchronousRule::shuffled(netomaton_engine::activity_fn(eca(30)), 5, 3).unwrap();
    let result = Evolution::<u8, ()>::builder(vec![0u8; 5], cellular_automaton(5, 1).unwrap())
        .activity_rule(rule)
        .timesteps(3)
        .config(EvolutionConfig::parallel())
        .build();
    assert!(matches!(result, Err(EngineError::ParallelIncompatible { .. })));
}

#[test]
fn test_structural_mutation_is_visible_from_its_timestep_only() {
    // at t=2 node 0 removes node 1 and adds "leaf" linked into node 0
    let mut evolution = Evolution::<i32, ()>::builder(vec![1i32, 2], to_connectivity_map(vec![vec![1.0, 1.0], vec![1.0, 1.0]]).unwrap())
        .activity_fn(|ctx| {
            if ctx.timestep() == 2 && ctx.node_label() == &NodeLabel::Index(0) {
                ctx.request_removal_of(NodeLabel::Index(1));
                let mut links = OutgoingLinks::new();
                links.insert(
                    NodeLabel::Index(0),
                    vec![Connection::weighted(0.5).with("kind", "leaf")],
                );
                ctx.request_node_addition(-1, links, Some(NodeLabel::from("leaf")));
            }
            Ok(ctx.neighbourhood_activities().iter().copied().sum())
        })
        .timesteps(4)
        .build()
        .unwrap();

    let trajectory = evolution.run().unwrap();
    let leaf = NodeLabel::from("leaf");
    let one = NodeLabel::Index(1);
    for t in 0..2 {
        let state = trajectory.get(t).unwrap();
        assert!(state.connectivity().contains(&one));
        assert!(!state.connectivity().contains(&leaf));
    }
    for t in 2..4 {
        let state = trajectory.get(t).unwrap();
        assert!(!state.connectivity().contains(&one));
        assert!(state.activity_of(&one).is_none());
        assert!(state.connectivity().contains(&leaf));
        let records = &state.connectivity().incoming(&NodeLabel::Index(0)).unwrap()[&leaf];
        assert_eq!(records[0].get("kind"), Some(&serde_json::json!("leaf")));
    }
    // t=3: node 0 sums itself (3 + 3 from t=1 -> 6 at t=2) and the leaf (-1)
    assert_eq!(trajectory.get(2).unwrap().activity_of(&NodeLabel::Index(0)), Some(&6));
    assert_eq!(trajectory.get(3).unwrap().activity_of(&NodeLabel::Index(0)), Some(&5));
}

#[test]
fn test_seeded_perturbation_is_deterministic() {
    use rand::Rng;

    let run = |seed: u64| {
        let mut evolution = Evolution::<f64, ()>::builder(vec![0.0; 6], cellular_automaton(6, 1).unwrap())
            .activity_fn(|ctx| {
                let sum: f64 = ctx.neighbourhood_activities().iter().copied().sum();
                Ok(sum / 3.0)
            })
            .perturbation(|p| Ok(p.activity + p.rng.random_range(-1.0..1.0)))
            .timesteps(8)
            .config(EvolutionConfig::seeded(seed))
            .build()
            .unwrap();
        evolution.run().unwrap().activity_lists()
    };

    assert_eq!(run(17), run(17));
    assert_ne!(run(17), run(18));
}

#[test]
fn test_matrix_output_and_store_round_trip() {
    let temp = TempDir::new().unwrap();
    let matrix = cellular_automaton(5, 1).unwrap();
    let mut evolution = Evolution::<u8, ()>::builder(init_simple(5, 1u8), matrix.clone())
        .activity_fn(eca(90))
        .timesteps(3)
        .build()
        .unwrap();

    let matrices = evolution.run_matrices().unwrap();
    assert_eq!(matrices.adjacencies, vec![matrix.clone(), matrix.clone(), matrix]);

    let store = TrajectoryStore::new(temp.path());
    store
        .save(
            evolution.trajectory(),
            evolution.config(),
            Some(StopReason::StepLimitReached),
            None,
        )
        .unwrap();
    let loaded = store.load::<u8>().unwrap().unwrap();
    assert_eq!(loaded.activity_lists(), matrices.activities);
}

// ============================================================================
// Properties
// ============================================================================

fn square_matrix() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (1usize..8).prop_flat_map(|n| {
        prop::collection::vec(
            prop::collection::vec(prop_oneof![Just(0.0), Just(0.5), Just(1.0), Just(2.0)], n),
            n,
        )
    })
}

proptest! {
    #[test]
    fn prop_visitation_order_does_not_change_a_step(
        cells in prop::collection::vec(0u8..2, 3..24),
        rule in any::<u8>(),
        order_seed in any::<u64>(),
    ) {
        let sequential = eca_run(rule, cells.clone(), 6, EvolutionConfig::default());
        let shuffled = eca_run(rule, cells, 6, EvolutionConfig::shuffled(order_seed));
        prop_assert_eq!(sequential, shuffled);
    }

    #[test]
    fn prop_matrix_round_trip(matrix in square_matrix()) {
        let map = to_connectivity_map(matrix.clone()).unwrap();
        prop_assert_eq!(to_adjacency_matrix(&map), matrix);
    }

    #[test]
    fn prop_history_is_immutable(steps in 2u64..8) {
        let mut evolution = Evolution::<u8, ()>::builder(vec![0u8; 3], disconnected(3))
            .connectivity_rule(|c| {
                let mut map = c.connectivity;
                map.add_edge(0u64, 2u64, Connection::weighted(c.timestep as f64));
                Ok(map)
            })
            .timesteps(steps)
            .build()
            .unwrap();

        let mut seen = Vec::new();
        while evolution.step().unwrap() {
            let snapshots: Vec<_> = evolution
                .trajectory()
                .iter()
                .map(|s| s.connectivity().clone())
                .collect();
            prop_assert_eq!(&snapshots[..seen.len()], &seen[..]);
            seen = snapshots;
        }
        let edges: Vec<usize> = evolution.trajectory().iter().map(|s| s.connectivity().edge_count()).collect();
        prop_assert_eq!(edges, (0..steps as usize).collect::<Vec<_>>());
    }
}

#[test]
fn test_activity_map_initial_conditions() {
    let mut initial = ActivityMap::new();
    initial.insert(NodeLabel::from("a"), 1u8);
    initial.insert(NodeLabel::from("b"), 0u8);

    let mut map = netomaton_engine::ConnectivityMap::new();
    map.add_edge("a", "b", Connection::new());
    map.add_edge("b", "a", Connection::new());

    let mut evolution = Evolution::<u8, ()>::builder(initial, map)
        .activity_fn(|ctx| Ok(*ctx.neighbourhood_activities()[0]))
        .timesteps(3)
        .build()
        .unwrap();

    assert!(!evolution.was_matrix());
    let rows = evolution.run().unwrap().activity_lists();
    assert_eq!(rows, vec![vec![1, 0], vec![0, 1], vec![1, 0]]);
}
