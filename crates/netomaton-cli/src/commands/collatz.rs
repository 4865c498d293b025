//! Collatz sequence as a single-node automaton.

use std::path::Path;

use anyhow::{Context, Result};
use netomaton_engine::{EngineError, Evolution, NodeLabel, StepInput};
use tracing::info;

use super::{describe_status, persist};
use crate::config::Config;
use crate::rules::collatz_step;

/// Iterate the Collatz map from `start` until the node reaches 1.
pub fn execute(config: &Config, output: Option<&Path>, start: u64) -> Result<()> {
    if start == 0 {
        anyhow::bail!("Collatz start value must be positive");
    }

    let evolution_config = config.evolution_config()?;
    let mut evolution = Evolution::<u64, ()>::builder(vec![start], vec![vec![1.0]])
        .activity_fn(|ctx| {
            let n = *ctx.current_activity();
            collatz_step(n).ok_or_else(|| {
                EngineError::rule_at(
                    ctx.node_label().clone(),
                    ctx.timestep(),
                    format!("3n + 1 overflows for n = {n}"),
                )
            })
        })
        .input_fn(|_, activities, _| {
            Ok(match activities.get(&NodeLabel::Index(0)) {
                Some(1) => StepInput::Stop,
                _ => StepInput::Timestep,
            })
        })
        .config(evolution_config.clone())
        .build()
        .context("Failed to build Collatz automaton")?;

    let trajectory = evolution.run().context("Collatz run failed")?;
    let sequence: Vec<String> = trajectory
        .activity_lists()
        .into_iter()
        .filter_map(|row| row.first().map(u64::to_string))
        .collect();
    info!(start, states = sequence.len(), "collatz_complete");

    println!("🔢 Collatz sequence from {start}");
    println!("{}", sequence.join(" "));
    println!(
        "✅ Reached 1 after {} steps ({})",
        sequence.len() - 1,
        describe_status(evolution.status())
    );

    persist(
        output,
        evolution.trajectory(),
        &evolution_config,
        evolution.status(),
        "collatz",
    )
}
