//! Typed client for a remote node's peer port.
//!
//! Calls block until the response frame arrives, like every `Connection` operation.

use super::connection::{Connection, ConnectionRegistry};
use super::frame::DEFAULT_BATCH_SIZE;
use super::protocol::{PeerRequest, PeerResponse, decode, encode};
use super::types::{ConnectionKind, NetError, Result};
use crate::storage::types::{Aggregate, Key};

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

pub struct NodeClient {
    connection: Arc<Connection>,
    // One request in flight at a time so responses pair with their requests.
    in_flight: Mutex<()>,
}

impl NodeClient {
    /// Wraps the registry's `MapNode` connection to `addr`, using the default batch size.
    pub fn connect(registry: &ConnectionRegistry, addr: SocketAddr) -> Result<Self> {
        Self::connect_with_batch(registry, addr, DEFAULT_BATCH_SIZE)
    }

    /// `batch_size` only applies if this call creates the connection.
    pub fn connect_with_batch(
        registry: &ConnectionRegistry,
        addr: SocketAddr,
        batch_size: usize,
    ) -> Result<Self> {
        let connection = registry.get(addr, batch_size, ConnectionKind::MapNode)?;
        Ok(Self::new(connection))
    }

    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            in_flight: Mutex::new(()),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.connection.addr()
    }

    pub fn get(&self, map: &str, key: Key) -> Result<f64> {
        match self.call(PeerRequest::Get {
            map: map.to_string(),
            key,
        })? {
            PeerResponse::Value(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub fn put(&self, map: &str, key: Key, value: f64) -> Result<()> {
        match self.call(PeerRequest::Put {
            map: map.to_string(),
            key,
            value,
        })? {
            PeerResponse::Stored => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn has_key(&self, map: &str, key: Key) -> Result<bool> {
        match self.call(PeerRequest::HasKey {
            map: map.to_string(),
            key,
        })? {
            PeerResponse::Exists(exists) => Ok(exists),
            other => Err(unexpected(other)),
        }
    }

    pub fn scan(&self, map: &str, partial: Key) -> Result<Option<Vec<(Key, f64)>>> {
        match self.call(PeerRequest::Scan {
            map: map.to_string(),
            partial,
        })? {
            PeerResponse::Entries(entries) => Ok(entries),
            other => Err(unexpected(other)),
        }
    }

    pub fn aggregate(&self, map: &str, partial: Key, op: Aggregate) -> Result<f64> {
        match self.call(PeerRequest::Aggregate {
            map: map.to_string(),
            partial,
            op,
        })? {
            PeerResponse::Value(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub fn dump(&self, map: &str) -> Result<String> {
        match self.call(PeerRequest::Dump {
            map: map.to_string(),
        })? {
            PeerResponse::Dump(text) => Ok(text),
            other => Err(unexpected(other)),
        }
    }

    /// Returns the names of the maps the peer hosts.
    pub fn ping(&self) -> Result<Vec<String>> {
        match self.call(PeerRequest::Ping)? {
            PeerResponse::Pong { maps } => Ok(maps),
            other => Err(unexpected(other)),
        }
    }

    fn call(&self, request: PeerRequest) -> Result<PeerResponse> {
        let _guard = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.connection.send_frame(encode(&request)?)?;
        self.connection.flush()?;
        let frame = self.connection.wait_for_frame()?;

        match decode::<PeerResponse>(&frame)? {
            PeerResponse::Error(message) => {
                tracing::warn!("{} rejected {:?}: {}", self.addr(), request, message);
                Err(NetError::Remote(message))
            }
            response => Ok(response),
        }
    }
}

fn unexpected(response: PeerResponse) -> NetError {
    NetError::UnexpectedResponse(format!("{:?}", response))
}
