//! Persistence of trajectories under a `.netomaton` folder.
//!
//! ## File Structure
//!
//! ```text
//! .netomaton/
//! ├── trajectory.json   # Every recorded State, timestep 0 first
//! └── metadata.json     # Summary of the run that produced it
//! ```

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EvolutionConfig;
use crate::error::EngineResult;
use crate::input::StopReason;
use crate::state::Trajectory;

/// Name of the persistence folder.
pub const STORE_DIR: &str = ".netomaton";

const TRAJECTORY_FILE: &str = "trajectory.json";
const METADATA_FILE: &str = "metadata.json";

/// Version of the on-disk format.
const FORMAT_VERSION: u32 = 1;

/// Summary written next to a saved trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryMetadata {
    /// Version of the persistence format.
    pub version: u32,

    /// When the trajectory was saved.
    pub saved_at: SystemTime,

    /// Number of recorded states (timestep 0 included).
    pub states: usize,

    /// Node count of the final state.
    pub final_nodes: usize,

    /// Edge count of the final state.
    pub final_edges: usize,

    /// Why the run ended, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,

    /// Configuration the run used.
    pub config: EvolutionConfig,

    /// Optional description or label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Saves and loads trajectories within `<root>/.netomaton/`.
#[derive(Debug, Clone)]
pub struct TrajectoryStore {
    root: PathBuf,
    store_dir: PathBuf,
}

impl TrajectoryStore {
    /// Create a store for the given root directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let store_dir = root.join(STORE_DIR);
        Self { root, store_dir }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.netomaton` directory.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Whether a trajectory has been saved.
    pub fn has_trajectory(&self) -> bool {
        self.store_dir.join(TRAJECTORY_FILE).exists()
    }

    fn init(&self) -> EngineResult<()> {
        if !self.store_dir.exists() {
            std::fs::create_dir_all(&self.store_dir)?;
            debug!(path = %self.store_dir.display(), "Created store directory");
        }
        Ok(())
    }

    /// Save a trajectory and its metadata, returning the trajectory path.
    pub fn save<A: Serialize>(
        &self,
        trajectory: &Trajectory<A>,
        config: &EvolutionConfig,
        stop_reason: Option<StopReason>,
        label: Option<String>,
    ) -> EngineResult<PathBuf> {
        self.init()?;

        let (final_nodes, final_edges) = trajectory
            .last()
            .map(|s| (s.connectivity().node_count(), s.connectivity().edge_count()))
            .unwrap_or_default();
        let metadata = TrajectoryMetadata {
            version: FORMAT_VERSION,
            saved_at: SystemTime::now(),
            states: trajectory.len(),
            final_nodes,
            final_edges,
            stop_reason,
            config: config.clone(),
            label,
        };

        let trajectory_path = self.store_dir.join(TRAJECTORY_FILE);
        std::fs::write(&trajectory_path, serde_json::to_string_pretty(trajectory)?)?;
        let metadata_path = self.store_dir.join(METADATA_FILE);
        std::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        info!(
            path = %trajectory_path.display(),
            states = metadata.states,
            nodes = final_nodes,
            "Saved trajectory"
        );
        Ok(trajectory_path)
    }

    /// Load the saved trajectory, if any.
    pub fn load<A: DeserializeOwned>(&self) -> EngineResult<Option<Trajectory<A>>> {
        let path = self.store_dir.join(TRAJECTORY_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path)?;
        let trajectory: Trajectory<A> = serde_json::from_str(&json)?;
        info!(path = %path.display(), states = trajectory.len(), "Loaded trajectory");
        Ok(Some(trajectory))
    }

    /// Load the saved metadata, if any.
    pub fn load_metadata(&self) -> EngineResult<Option<TrajectoryMetadata>> {
        let path = self.store_dir.join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path)?;
        let metadata = serde_json::from_str(&json)?;
        debug!(path = %path.display(), "Loaded trajectory metadata");
        Ok(Some(metadata))
    }

    /// Delete the store directory. Returns whether anything was removed.
    pub fn clear(&self) -> EngineResult<bool> {
        if !self.store_dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&self.store_dir)?;
        info!(path = %self.store_dir.display(), "Cleared trajectory store");
        Ok(true)
    }
}
