//! Store Catalog
//!
//! The named maps hosted by one node, all opened against the same environment registry.

use super::environment::EnvironmentRegistry;
use super::store::MultiKeyStore;
use super::types::{Result, StoreConfig, StoreError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

pub struct StoreCatalog {
    registry: Arc<EnvironmentRegistry>,
    stores: DashMap<String, Arc<MultiKeyStore>>,
}

impl StoreCatalog {
    pub fn new(registry: Arc<EnvironmentRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            stores: DashMap::new(),
        })
    }

    /// Opens and registers a map. Each name may be opened once.
    pub fn open(&self, config: StoreConfig) -> Result<Arc<MultiKeyStore>> {
        match self.stores.entry(config.name.clone()) {
            Entry::Occupied(_) => Err(StoreError::Config(format!(
                "map {} is already open",
                config.name
            ))),
            Entry::Vacant(entry) => {
                let store = Arc::new(MultiKeyStore::open(&self.registry, config)?);
                entry.insert(store.clone());
                Ok(store)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<MultiKeyStore>> {
        self.stores.get(name).map(|entry| entry.value().clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Flushes and closes every map that is still open.
    pub fn close_all(&self) -> Result<()> {
        for entry in self.stores.iter() {
            if !entry.value().is_closed() {
                entry.value().close()?;
            }
        }
        Ok(())
    }
}
