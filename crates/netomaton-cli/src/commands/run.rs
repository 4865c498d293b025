//! Run a JSON run description with a built-in rule.

use std::path::Path;

use anyhow::{Context, Result};
use netomaton_engine::RunDescription;
use serde_json::Value;
use tracing::debug;

use super::{describe_status, persist};
use crate::config::Config;
use crate::rules::BuiltinRule;

/// Load `description`, evolve it under `rule` and print every state.
pub fn execute(
    config: &Config,
    output: Option<&Path>,
    description: &Path,
    rule: BuiltinRule,
) -> Result<()> {
    let run: RunDescription<f64, Value> = RunDescription::load(description)
        .with_context(|| format!("Failed to load run description {}", description.display()))?;

    let name = if run.meta.name.is_empty() {
        description
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string())
    } else {
        run.meta.name.clone()
    };
    let evolution_config = config.overlay(run.config.clone())?;
    debug!(name = %name, rule = %rule, execution = %evolution_config.execution, "run_description_loaded");

    let mut evolution = run
        .into_builder()?
        .activity_rule(rule)
        .config(evolution_config.clone())
        .build()
        .with_context(|| format!("Failed to build '{name}'"))?;

    let trajectory = evolution.run().with_context(|| format!("Run '{name}' failed"))?;

    println!("📄 Run: {name} (rule {rule})");
    for (t, state) in trajectory.iter().enumerate() {
        println!("{t:>4}  {}", serde_json::to_string(state.activities())?);
    }
    let (nodes, edges) = trajectory
        .last()
        .map(|s| (s.connectivity().node_count(), s.connectivity().edge_count()))
        .unwrap_or_default();
    let states = trajectory.len();
    println!(
        "✅ {states} states ({}), {nodes} nodes, {edges} edges",
        describe_status(evolution.status())
    );

    persist(
        output,
        evolution.trajectory(),
        &evolution_config,
        evolution.status(),
        &name,
    )
}
