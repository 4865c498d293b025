//! Logistic map as a single node with a weighted self-connection.

use std::path::Path;

use anyhow::{Context, Result};
use netomaton_engine::Evolution;

use super::persist;
use crate::config::Config;
use crate::rules::BuiltinRule;

/// Iterate `x(t+1) = r * x(t) * (1 - x(t))` for `steps` states.
pub fn execute(
    config: &Config,
    output: Option<&Path>,
    rate: f64,
    steps: u64,
    initial: f64,
) -> Result<()> {
    if rate <= 0.0 {
        anyhow::bail!("Growth rate must be positive, got {rate}");
    }

    let evolution_config = config.evolution_config()?;
    let mut evolution = Evolution::<f64, ()>::builder(vec![initial], vec![vec![rate]])
        .activity_rule(BuiltinRule::Logistic)
        .timesteps(steps)
        .config(evolution_config.clone())
        .build()
        .context("Failed to build logistic map")?;

    let trajectory = evolution.run().context("Logistic run failed")?;

    println!("📈 Logistic map (r = {rate}, x0 = {initial})");
    for (t, row) in trajectory.activity_lists().iter().enumerate() {
        if let Some(x) = row.first() {
            println!("{t:>4}  {x:.6}");
        }
    }

    persist(
        output,
        evolution.trajectory(),
        &evolution_config,
        evolution.status(),
        "logistic",
    )
}
