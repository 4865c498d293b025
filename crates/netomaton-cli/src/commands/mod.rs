//! CLI command implementations.

pub mod collatz;
pub mod config;
pub mod eca;
pub mod logistic;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use netomaton_engine::{EvolutionConfig, RunStatus, Trajectory, TrajectoryStore};
use serde::Serialize;

/// Save a finished trajectory under `<output>/.netomaton/` when an output is set.
pub fn persist<A: Serialize>(
    output: Option<&Path>,
    trajectory: &Trajectory<A>,
    config: &EvolutionConfig,
    status: RunStatus,
    label: &str,
) -> Result<()> {
    let Some(output) = output else {
        return Ok(());
    };

    let stop_reason = match status {
        RunStatus::Stopped(reason) => Some(reason),
        _ => None,
    };
    let path = TrajectoryStore::new(output)
        .save(trajectory, config, stop_reason, Some(label.to_string()))
        .with_context(|| format!("Failed to save trajectory under {}", output.display()))?;

    println!("💾 Saved to {}", path.display());
    Ok(())
}

/// Human-readable stop reason for the summary line.
pub fn describe_status(status: RunStatus) -> String {
    match status {
        RunStatus::Stopped(reason) => reason.to_string(),
        RunStatus::Running | RunStatus::Initializing => "still running".to_string(),
    }
}
