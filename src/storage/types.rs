use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Wildcard marker used by map nodes in query keys.
pub const DEFAULT_WILDCARD: i64 = -1;

/// A full composite key: exactly `arity` integers.
pub type Key = Vec<i64>;

/// An ordered, non-empty set of key dimensions that backs one secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern(pub Vec<usize>);

impl Pattern {
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The dimension set in ascending order. Queries are matched against this.
    pub fn signature(&self) -> Vec<usize> {
        let mut sig = self.0.clone();
        sig.sort_unstable();
        sig
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", join_dims(&self.0))
    }
}

pub(crate) fn join_dims(dims: &[usize]) -> String {
    dims.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn list_signatures(signatures: &[Vec<usize>]) -> String {
    signatures
        .iter()
        .map(|sig| format!("[{}]", join_dims(sig)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Folds applied over the entries matched by a partial key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    Sum,
    Count,
    Min,
    Max,
}

fn default_wildcard() -> i64 {
    DEFAULT_WILDCARD
}

/// Construction parameters for one `MultiKeyStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Namespaces the on-disk partitions as `db_<name>_primary`, `db_<name>_<ordinal>`.
    pub name: String,
    pub arity: usize,
    #[serde(default)]
    pub patterns: Vec<Vec<usize>>,
    #[serde(default)]
    pub base_path: PathBuf,
    /// Private environment directory, relative to `base_path`. When absent the store
    /// joins the registry's shared environment.
    #[serde(default)]
    pub env_path: Option<PathBuf>,
    #[serde(default = "default_wildcard")]
    pub wildcard: i64,
    #[serde(default)]
    pub default_value: f64,
}

impl StoreConfig {
    pub fn new(name: &str, arity: usize, base_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            arity,
            patterns: Vec::new(),
            base_path: base_path.into(),
            env_path: None,
            wildcard: DEFAULT_WILDCARD,
            default_value: 0.0,
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<Vec<usize>>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_env_path(mut self, env_path: impl Into<PathBuf>) -> Self {
        self.env_path = Some(env_path.into());
        self
    }

    pub fn with_wildcard(mut self, wildcard: i64) -> Self {
        self.wildcard = wildcard;
        self
    }

    pub fn with_default_value(mut self, default_value: f64) -> Self {
        self.default_value = default_value;
        self
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config error: {0}")]
    Config(String),
    #[error("key {key:?} has {got} dimensions, store expects {expected}")]
    Arity {
        key: Vec<i64>,
        got: usize,
        expected: usize,
    },
    #[error("stored key {0:?} contains the wildcard marker")]
    WildcardInKey(Vec<i64>),
    #[error(
        "request for pattern [{}], which doesn't exist; known patterns: {}",
        join_dims(.requested),
        list_signatures(.registered)
    )]
    UnknownPattern {
        requested: Vec<usize>,
        registered: Vec<Vec<usize>>,
    },
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("store {0} is closed")]
    Closed(String),
    #[error("corrupt entry: {0}")]
    Corrupt(String),
    #[error("store task failed: {0}")]
    Task(String),
    #[error("storage error: {0}")]
    Storage(#[from] fjall::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
