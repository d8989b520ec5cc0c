use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::explorer::ExplorationMode;
use crate::analysis::vanishing::VanishingPolicy;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExplorerConfig {
    #[serde(default)]
    pub policy: VanishingPolicy,
    #[serde(default = "default_cache_successors")]
    pub cache_successors: bool,
    /// 0 explores sequentially.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_states_path")]
    pub states_path: PathBuf,
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            policy: VanishingPolicy::default(),
            cache_successors: default_cache_successors(),
            workers: 0,
            states_path: default_states_path(),
            records_path: default_records_path(),
        }
    }
}

impl ExplorerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: ExplorerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn mode(&self) -> ExplorationMode {
        match self.workers {
            0 => ExplorationMode::Sequential,
            workers => ExplorationMode::Parallel { workers },
        }
    }
}

fn default_cache_successors() -> bool {
    true
}

fn default_states_path() -> PathBuf {
    PathBuf::from("states.bin")
}

fn default_records_path() -> PathBuf {
    PathBuf::from("records.bin")
}
