//! Elementary cellular automata on a ring.

use std::path::Path;

use anyhow::{Context, Result};
use netomaton_engine::init::init_simple;
use netomaton_engine::{cellular_automaton, Evolution, ReversibleRule};

use super::persist;
use crate::config::Config;
use crate::rules::elementary;

/// Render one row of cells.
pub fn render_row(cells: &[u8]) -> String {
    cells
        .iter()
        .map(|c| if *c == 0 { '.' } else { '#' })
        .collect()
}

/// Evolve elementary rule `rule` from a single centre cell and print the grid.
///
/// With `reversible`, the second-order variant is run with an all-zero
/// previous row.
pub fn execute(
    config: &Config,
    output: Option<&Path>,
    rule: u8,
    width: usize,
    steps: u64,
    reversible: bool,
) -> Result<()> {
    let topology = cellular_automaton(width, 1).context("Invalid ring width")?;
    let evolution_config = config.evolution_config()?;

    let builder = Evolution::<u8, ()>::builder(init_simple(width, 1u8), topology)
        .timesteps(steps)
        .config(evolution_config.clone());
    let builder = if reversible {
        builder.activity_rule(ReversibleRule::new(elementary(rule), vec![0u8; width]))
    } else {
        builder.activity_rule(elementary(rule))
    };
    let mut evolution = builder
        .build()
        .with_context(|| format!("Failed to build rule {rule} automaton"))?;

    let trajectory = evolution.run().with_context(|| format!("Rule {rule} run failed"))?;

    let kind = if reversible { "reversible " } else { "" };
    println!("🧬 Elementary {kind}rule {rule} (width {width}, {steps} steps)");
    for row in trajectory.activity_lists() {
        println!("{}", render_row(&row));
    }

    let label = if reversible {
        format!("eca-{rule}-reversible")
    } else {
        format!("eca-{rule}")
    };
    persist(
        output,
        evolution.trajectory(),
        &evolution_config,
        evolution.status(),
        &label,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_row() {
        assert_eq!(render_row(&[0, 1, 1, 0]), ".##.");
        assert_eq!(render_row(&[]), "");
    }
}
