//! Storage Environments
//!
//! An environment is one `fjall` keyspace on disk. Stores either join the shared
//! environment (opened at the first caller's base path) or open a private one under
//! `base_path/env_path`. The registry is an explicit, process-scoped object handed to
//! store constructors; it never opens the same directory twice.

use super::types::Result;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fjall::{Config, Keyspace};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Background journal flush interval. Writes are only "eventually persisted".
    #[serde(default)]
    pub fsync_ms: Option<u16>,
}

pub struct EnvironmentRegistry {
    config: EnvironmentConfig,
    shared: Mutex<Option<Arc<Keyspace>>>,
    private: DashMap<PathBuf, Arc<Keyspace>>,
}

impl EnvironmentRegistry {
    pub fn new(config: EnvironmentConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            shared: Mutex::new(None),
            private: DashMap::new(),
        })
    }

    /// Resolves the environment for a store rooted at `base_path`.
    pub fn environment(&self, base_path: &Path, env_path: Option<&Path>) -> Result<Arc<Keyspace>> {
        match env_path {
            Some(env_path) => {
                let dir = base_path.join(env_path);
                match self.private.entry(dir.clone()) {
                    Entry::Occupied(entry) => Ok(entry.get().clone()),
                    Entry::Vacant(entry) => {
                        let keyspace = self.open(&dir)?;
                        entry.insert(keyspace.clone());
                        Ok(keyspace)
                    }
                }
            }
            None => {
                let mut shared = self
                    .shared
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if let Some(keyspace) = shared.as_ref() {
                    return Ok(keyspace.clone());
                }
                let keyspace = self.open(base_path)?;
                *shared = Some(keyspace.clone());
                Ok(keyspace)
            }
        }
    }

    pub fn open_environments(&self) -> usize {
        let shared = self
            .shared
            .lock()
            .map(|guard| guard.is_some() as usize)
            .unwrap_or(0);
        shared + self.private.len()
    }

    fn open(&self, dir: &Path) -> Result<Arc<Keyspace>> {
        tracing::info!("Opening storage environment at {}", dir.display());
        let mut config = Config::new(dir);
        if let Some(ms) = self.config.fsync_ms {
            config = config.fsync_ms(Some(ms));
        }
        Ok(Arc::new(config.open()?))
    }
}
