//! Peer Wire Protocol
//!
//! Messages exchanged between nodes over reactor links. Each message is bincode-encoded and
//! travels as the payload of one length-prefixed frame. Every request gets exactly one
//! response, in request order.

use super::types::{NetError, Result};
use crate::storage::types::{Aggregate, Key};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Requests a node answers over its peer port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerRequest {
    Get {
        map: String,
        key: Key,
    },

    Put {
        map: String,
        key: Key,
        value: f64,
    },

    HasKey {
        map: String,
        key: Key,
    },

    /// `partial` uses the map's wildcard marker at unspecified dimensions.
    Scan {
        map: String,
        partial: Key,
    },

    Aggregate {
        map: String,
        partial: Key,
        op: Aggregate,
    },

    Dump {
        map: String,
    },

    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerResponse {
    Value(f64),

    Stored,

    Exists(bool),

    /// `None` when the partial key specified every dimension.
    Entries(Option<Vec<(Key, f64)>>),

    Dump(String),

    /// Answer to `Ping`: the maps hosted by the responder.
    Pong {
        maps: Vec<String>,
    },

    Error(String),
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes> {
    bincode::serialize(message)
        .map(Bytes::from)
        .map_err(|e| NetError::Codec(e.to_string()))
}

pub fn decode<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T> {
    bincode::deserialize(payload).map_err(|e| NetError::Codec(e.to_string()))
}
