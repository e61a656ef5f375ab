//! Configuration models for `docpipe.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global settings for the pipeline subsystem.
///
/// Loaded from `docpipe.toml`; every field has a default so a missing file
/// yields a usable configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Root directory for persisted state.
    pub data_dir: PathBuf,

    /// Interval between status polls, in milliseconds.
    pub poll_interval_ms: u64,

    /// How many times the runner re-attempts a failing stage before marking
    /// the pipeline failed.
    pub max_stage_retries: u32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("workspace"),
            poll_interval_ms: 2000,
            max_stage_retries: 3,
        }
    }
}

impl GlobalConfig {
    /// Directory holding pipeline records and the per-task index.
    pub fn pipelines_dir(&self) -> PathBuf {
        self.data_dir.join("passthrough-pipelines")
    }

    /// Directory holding task records consulted by the Q&A gate.
    pub fn tasks_dir(&self) -> PathBuf {
        self.data_dir.join("tasks")
    }

    /// Override the data directory, e.g. from a CLI flag.
    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
        self.data_dir = data_dir.as_ref().to_path_buf();
        self
    }
}
