//! CLI configuration management.
//!
//! Values come from (lowest to highest precedence) built-in defaults, the
//! config file, a `.env` file, `NTM_*` environment variables and finally the
//! command-line flags applied by `main`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use netomaton_engine::{EvolutionConfig, Execution};
use serde::{Deserialize, Serialize};

/// Application-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory under which `.netomaton/` is written. `None` disables saving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Seed for perturbations, connectivity rules and shuffled visitation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Visitation strategy: `sequential`, `shuffled` or `parallel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<String>,
}

impl Config {
    /// Load configuration from the config file and environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if missing)
        let _ = dotenvy::dotenv();

        let mut config = match Self::config_file_path() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents).with_context(|| "Failed to parse config file")?
            }
            _ => Self::default(),
        };

        // Environment variables take precedence over the file
        if let Ok(output_dir) = std::env::var("NTM_OUTPUT_DIR") {
            config.output_dir = Some(PathBuf::from(output_dir));
        }
        if let Ok(seed) = std::env::var("NTM_SEED") {
            config.seed = Some(
                seed.parse()
                    .with_context(|| format!("NTM_SEED must be an unsigned integer, got {seed:?}"))?,
            );
        }
        if let Ok(execution) = std::env::var("NTM_EXECUTION") {
            config.execution = Some(execution);
        }

        Ok(config)
    }

    /// Get the path to the config file.
    pub fn config_file_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "netomaton", "ntm").map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// The configured strategy, if any.
    pub fn execution(&self) -> Result<Option<Execution>> {
        self.execution
            .as_deref()
            .map(|name| parse_execution(name, self.seed.unwrap_or_default()))
            .transpose()
    }

    /// Engine configuration for the built-in scenarios.
    pub fn evolution_config(&self) -> Result<EvolutionConfig> {
        Ok(EvolutionConfig {
            execution: self.execution()?.unwrap_or_default(),
            seed: self.seed.unwrap_or_default(),
            ..Default::default()
        })
    }

    /// Apply the configured overrides on top of a description's own config.
    pub fn overlay(&self, mut base: EvolutionConfig) -> Result<EvolutionConfig> {
        if let Some(seed) = self.seed {
            base.seed = seed;
        }
        if let Some(execution) = self.execution()? {
            base.execution = execution;
        }
        Ok(base)
    }
}

/// Parse a strategy name. Shuffled visitation uses `seed` for its order.
pub fn parse_execution(name: &str, seed: u64) -> Result<Execution> {
    match name.trim().to_ascii_lowercase().as_str() {
        "sequential" => Ok(Execution::Sequential),
        "shuffled" => Ok(Execution::Shuffled { seed }),
        "parallel" => Ok(Execution::Parallel),
        other => anyhow::bail!(
            "Unknown execution strategy '{other}'. Use sequential, shuffled or parallel"
        ),
    }
}
