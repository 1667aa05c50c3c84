//! Node Configuration
//!
//! Loaded from a JSON file and then overridden by command-line flags.
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/cumulus",
//!   "environment": { "fsync_ms": 500 },
//!   "peer_bind": "0.0.0.0:7400",
//!   "http_bind": "0.0.0.0:8400",
//!   "batch_size": 1,
//!   "maps": [ { "name": "sales", "arity": 3, "patterns": [[0], [0, 1]] } ]
//! }
//! ```

use crate::net::frame::DEFAULT_BATCH_SIZE;
use crate::storage::environment::EnvironmentConfig;
use crate::storage::types::StoreConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_peer_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7400))
}

fn default_http_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8400))
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Maps hosted by this node. A map's `base_path` is resolved against `data_dir`.
    #[serde(default)]
    pub maps: Vec<StoreConfig>,
    #[serde(default = "default_peer_bind")]
    pub peer_bind: SocketAddr,
    #[serde(default = "default_http_bind")]
    pub http_bind: SocketAddr,
    /// Outbound frames queued per peer link before a write is issued.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            environment: EnvironmentConfig::default(),
            maps: Vec::new(),
            peer_bind: default_peer_bind(),
            http_bind: default_http_bind(),
            batch_size: default_batch_size(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Map configurations with their base paths anchored under `data_dir`.
    pub fn resolved_maps(&self) -> Vec<StoreConfig> {
        self.maps
            .iter()
            .cloned()
            .map(|mut map| {
                map.base_path = self.data_dir.join(&map.base_path);
                map
            })
            .collect()
    }
}
