use super::codec;
use super::cursor::{self, FullCursor, PatternCursor};
use super::environment::EnvironmentRegistry;
use super::pattern::{self, PatternIndex, Projector};
use super::types::*;

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) const NEXT_SEQ_KEY: &[u8] = b"next_seq";

/// A table from full composite keys to `f64` values, with synchronously maintained
/// secondary indices over the patterns it was opened with.
///
/// Single-writer: concurrent readers are fine, writers are serialized internally but the
/// store makes no isolation promises across operations.
pub struct MultiKeyStore {
    name: String,
    arity: usize,
    wildcard: i64,
    default_value: f64,
    keyspace: Arc<Keyspace>,
    primary: PartitionHandle,
    meta: PartitionHandle,
    indices: Vec<PatternIndex>,
    by_signature: HashMap<Vec<usize>, usize>,
    next_seq: Mutex<u64>,
    closed: AtomicBool,
}

impl MultiKeyStore {
    pub fn open(registry: &EnvironmentRegistry, config: StoreConfig) -> Result<Self> {
        Self::open_with_projector(registry, config, pattern::project)
    }

    pub fn open_with_projector(
        registry: &EnvironmentRegistry,
        config: StoreConfig,
        projector: Projector,
    ) -> Result<Self> {
        validate_name(&config.name)?;
        if config.arity == 0 {
            return Err(StoreError::Config(format!(
                "store {} must have at least one key dimension",
                config.name
            )));
        }

        let keyspace = registry.environment(&config.base_path, config.env_path.as_deref())?;
        let primary_name = format!("db_{}_primary", config.name);
        tracing::debug!("Creating primary table at {}", primary_name);
        let primary = keyspace.open_partition(&primary_name, PartitionCreateOptions::default())?;
        let meta = keyspace.open_partition(
            &format!("db_{}_meta", config.name),
            PartitionCreateOptions::default(),
        )?;

        let mut next_seq = match meta.get(NEXT_SEQ_KEY)? {
            Some(bytes) => codec::decode_seq(&bytes)?,
            None => 0,
        };

        let mut indices: Vec<PatternIndex> = Vec::new();
        let mut by_signature = HashMap::new();
        let mut seen = HashSet::new();

        for dims in config.patterns {
            let pattern = Pattern::new(dims);
            if pattern.is_empty() || pattern.len() >= config.arity {
                tracing::warn!(
                    "Ignoring pattern {} for {}: needs 1..{} dimensions",
                    pattern,
                    config.name,
                    config.arity
                );
                continue;
            }
            validate_pattern(&pattern, config.arity)?;
            if !seen.insert(pattern.clone()) {
                tracing::debug!("Pattern {} already registered for {}", pattern, config.name);
                continue;
            }

            let ordinal = indices.len();
            let index = PatternIndex::open(&keyspace, &config.name, ordinal, pattern, projector)?;
            let recorded = meta.get(index.meta_key())?;
            if recorded.as_deref() != Some(index.meta_value().as_slice()) {
                index.rebuild(&keyspace, &primary, &meta, &mut next_seq)?;
            }

            let signature = index.pattern().signature();
            if by_signature.contains_key(&signature) {
                tracing::warn!(
                    "Pattern {} shares its dimensions with an earlier pattern; queries use the earlier one",
                    index.pattern()
                );
            } else {
                by_signature.insert(signature, ordinal);
            }
            indices.push(index);
        }

        tracing::info!(
            "Opened store {} (arity {}, {} secondary indices)",
            config.name,
            config.arity,
            indices.len()
        );

        Ok(Self {
            name: config.name,
            arity: config.arity,
            wildcard: config.wildcard,
            default_value: config.default_value,
            keyspace,
            primary,
            meta,
            indices,
            by_signature,
            next_seq: Mutex::new(next_seq),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn wildcard(&self) -> i64 {
        self.wildcard
    }

    pub fn default_value(&self) -> f64 {
        self.default_value
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        self.indices.iter().map(|index| index.pattern().clone()).collect()
    }

    /// Queryable dimension sets, in registration order.
    pub fn signatures(&self) -> Vec<Vec<usize>> {
        let mut signatures: Vec<(usize, Vec<usize>)> = self
            .by_signature
            .iter()
            .map(|(signature, &ordinal)| (ordinal, signature.clone()))
            .collect();
        signatures.sort();
        signatures.into_iter().map(|(_, signature)| signature).collect()
    }

    pub fn get(&self, key: &[i64]) -> Result<f64> {
        self.ensure_open()?;
        self.check_arity(key)?;
        match self.primary.get(codec::encode_key(key))? {
            Some(bytes) => {
                let value = codec::decode_value(&bytes)?;
                tracing::trace!("get {}{:?} = {}", self.name, key, value);
                Ok(value)
            }
            None => {
                tracing::trace!("get {}{:?} = NOT FOUND", self.name, key);
                Ok(self.default_value)
            }
        }
    }

    /// Upserts `key`. A key stored for the first time is filed under every pattern
    /// in the same atomic batch as the primary write.
    pub fn put(&self, key: &[i64], value: f64) -> Result<()> {
        self.ensure_open()?;
        self.check_arity(key)?;
        if key.contains(&self.wildcard) {
            return Err(StoreError::WildcardInKey(key.to_vec()));
        }
        tracing::trace!("put {}{:?} = {}", self.name, key, value);

        let key_bytes = codec::encode_key(key);
        let mut next_seq = self
            .next_seq
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.indices.is_empty() || self.primary.contains_key(&key_bytes)? {
            self.primary.insert(key_bytes, codec::encode_value(value))?;
            return Ok(());
        }

        let seq = *next_seq;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.primary, key_bytes.clone(), codec::encode_value(value));
        for index in &self.indices {
            index.stage_insert(&mut batch, key, &key_bytes, seq);
        }
        batch.insert(&self.meta, NEXT_SEQ_KEY.to_vec(), codec::encode_seq(seq + 1));
        batch.commit()?;
        *next_seq = seq + 1;
        Ok(())
    }

    pub fn has_key(&self, key: &[i64]) -> Result<bool> {
        self.ensure_open()?;
        self.check_arity(key)?;
        Ok(self.primary.contains_key(codec::encode_key(key))?)
    }

    pub fn full_scan(&self) -> Result<FullCursor> {
        self.ensure_open()?;
        Ok(FullCursor::new(Box::new(self.primary.iter())))
    }

    /// Resolves a partial key to the index whose dimension set equals its non-wildcard
    /// positions. Returns `None` when every dimension is given; use `get` instead.
    pub fn scan(&self, partial_key: &[i64]) -> Result<Option<PatternCursor>> {
        self.ensure_open()?;
        self.check_arity(partial_key)?;

        let signature: Vec<usize> = partial_key
            .iter()
            .enumerate()
            .filter(|(_, dim)| **dim != self.wildcard)
            .map(|(position, _)| position)
            .collect();
        if signature.len() == self.arity {
            return Ok(None);
        }

        let Some(&ordinal) = self.by_signature.get(&signature) else {
            return Err(StoreError::UnknownPattern {
                requested: signature,
                registered: self.signatures(),
            });
        };
        let index = &self.indices[ordinal];
        let projection = index.project(partial_key);
        tracing::debug!(
            "scan {}{:?} via pattern {} -> {:?}",
            self.name,
            partial_key,
            index.pattern(),
            projection
        );
        Ok(Some(index.cursor(&projection, self.primary.clone())))
    }

    /// Folds the values matched by `partial_key`. A fully specified key folds its
    /// single point value (the default when absent).
    pub fn aggregate(&self, partial_key: &[i64], aggregate: Aggregate) -> Result<f64> {
        let values: Vec<f64> = match self.scan(partial_key)? {
            Some(mut cursor) => cursor::drain(&mut cursor)?
                .into_iter()
                .map(|(_, value)| value)
                .collect(),
            None => vec![self.get(partial_key)?],
        };

        let folded = match aggregate {
            Aggregate::Sum => values.iter().sum(),
            Aggregate::Count => values.len() as f64,
            Aggregate::Min => values
                .iter()
                .copied()
                .reduce(f64::min)
                .unwrap_or(self.default_value),
            Aggregate::Max => values
                .iter()
                .copied()
                .reduce(f64::max)
                .unwrap_or(self.default_value),
        };
        Ok(folded)
    }

    /// Every entry as `name[k1,k2,..] = value`, one per line.
    pub fn dump(&self) -> Result<String> {
        let mut cursor = self.full_scan()?;
        let lines: Vec<String> = cursor::drain(&mut cursor)?
            .into_iter()
            .map(|(key, value)| {
                let key_text = String::from_utf8_lossy(&codec::encode_key(&key)).into_owned();
                format!("{}[{}] = {}", self.name, key_text, value)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Flushes every pending write to disk. A failed flush terminates the process.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed(self.name.clone()));
        }
        if let Err(e) = self.keyspace.persist(PersistMode::SyncAll) {
            tracing::error!("Error closing store {}: {}", self.name, e);
            std::process::exit(1);
        }
        tracing::info!("Closed store {}", self.name);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn check_arity(&self, key: &[i64]) -> Result<()> {
        if key.len() != self.arity {
            return Err(StoreError::Arity {
                key: key.to_vec(),
                got: key.len(),
                expected: self.arity,
            });
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        Err(StoreError::Config(format!(
            "store name {:?} may only contain letters, digits, '_' and '-'",
            name
        )))
    }
}

fn validate_pattern(pattern: &Pattern, arity: usize) -> Result<()> {
    let mut dims = HashSet::new();
    for &dim in pattern.dims() {
        if dim >= arity {
            return Err(StoreError::Config(format!(
                "pattern {} names dimension {} but keys have {}",
                pattern, dim, arity
            )));
        }
        if !dims.insert(dim) {
            return Err(StoreError::Config(format!(
                "pattern {} repeats dimension {}",
                pattern, dim
            )));
        }
    }
    Ok(())
}
