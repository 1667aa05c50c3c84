//! Storage HTTP Protocol
//!
//! Endpoints and Data Transfer Objects (DTOs) for the operator-facing HTTP surface of a
//! node's maps. Keys travel as their text form (`"3,0,12"`); query keys may use `*` for
//! the wildcard at any dimension.

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Point lookup: `/get/:map/:key`.
pub const ENDPOINT_GET: &str = "/get";
/// Upsert of one full key.
pub const ENDPOINT_PUT: &str = "/put";
/// Partial-key scan through a secondary index: `/scan/:map/:partial`.
pub const ENDPOINT_SCAN: &str = "/scan";
/// Full table dump for diagnostics: `/dump/:map`.
pub const ENDPOINT_DUMP: &str = "/dump";
/// Maps hosted by this node and their patterns.
pub const ENDPOINT_STATS: &str = "/stats";

// --- Data Transfer Objects ---

/// Client request for writing one entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    pub map: String,
    /// Full key text, e.g. `"1,2,3"`.
    pub key: String,
    pub value: f64,
}

/// Acknowledgment for write operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point lookup result. `found` distinguishes a stored value from the map default.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: Option<f64>,
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single entry in scan and dump results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryJson {
    pub key: Vec<i64>,
    pub value: f64,
}

/// Entries matching a partial key, or every entry for a dump.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub entries: Vec<EntryJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MapStats {
    pub name: String,
    pub arity: usize,
    pub patterns: Vec<Vec<usize>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub maps: Vec<MapStats>,
}
