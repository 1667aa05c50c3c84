//! Peer Connections
//!
//! A `Connection` is the caller-facing side of one reactor link. Its operations block the
//! calling thread until the reactor completes them, so they must not be invoked from inside
//! an async runtime; use `spawn_blocking` there.
//!
//! The `ConnectionRegistry` keeps at most one live connection per `(kind, address)` for the
//! life of the process.

use super::reactor::{Link, Reactor, ReactorHandle};
use super::types::{ConnectionKind, LinkState, NetError, Result};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

pub struct Connection {
    link: Arc<Link>,
    frames: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    reactor: ReactorHandle,
}

impl Connection {
    /// Dials `addr` through the reactor and blocks until the link is established.
    pub fn open(
        kind: ConnectionKind,
        addr: SocketAddr,
        batch_size: usize,
        reactor: &ReactorHandle,
    ) -> Result<Self> {
        let link = Arc::new(Link::new(kind, addr, batch_size));
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = oneshot::channel();

        reactor.request_connect(link.clone(), frames_tx, connected_tx)?;
        connected_rx
            .blocking_recv()
            .map_err(|_| NetError::ReactorStopped)??;

        tracing::info!("Opened {} connection to {}", kind, addr);

        Ok(Self {
            link,
            frames: Mutex::new(frames_rx),
            reactor: reactor.clone(),
        })
    }

    pub fn kind(&self) -> ConnectionKind {
        self.link.kind
    }

    pub fn addr(&self) -> SocketAddr {
        self.link.addr
    }

    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    /// Frames queued before a write is issued.
    pub fn batch_size(&self) -> usize {
        self.link.outbound().batch_size()
    }

    pub fn is_abandoned(&self) -> bool {
        self.state() == LinkState::Abandoned
    }

    /// Queues one frame. The batch goes to the socket once it is full or on `flush()`.
    pub fn send_frame(&self, payload: Bytes) -> Result<()> {
        self.ensure_live()?;
        let full = self.link.outbound().push(payload)?;
        if full {
            self.reactor.request_write(&self.link)?;
        }
        Ok(())
    }

    /// Writes whatever is queued, even a partial batch.
    pub fn flush(&self) -> Result<()> {
        self.ensure_live()?;
        if self.link.outbound().is_empty() {
            return Ok(());
        }
        self.reactor.request_write(&self.link)
    }

    /// Blocks until the next inbound frame arrives.
    ///
    /// Frames are delivered in wire order, one per call. Fails with `Abandoned` once the
    /// link is gone and no buffered frame remains.
    pub fn wait_for_frame(&self) -> Result<Bytes> {
        let mut frames = self
            .frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Ok(frame) = frames.try_recv() {
            return Ok(frame);
        }

        self.reactor.request_read(&self.link)?;
        frames
            .blocking_recv()
            .ok_or(NetError::Abandoned(self.link.addr))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_abandoned() {
            return Err(NetError::Abandoned(self.link.addr));
        }
        Ok(())
    }
}

/// Process-wide singleton table of peer connections.
pub struct ConnectionRegistry {
    reactor: Reactor,
    connections: DashMap<(ConnectionKind, SocketAddr), Arc<Connection>>,
}

impl ConnectionRegistry {
    /// Starts the reactor thread and an empty registry.
    pub fn start() -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            reactor: Reactor::start()?,
            connections: DashMap::new(),
        }))
    }

    /// Returns the connection for `(kind, addr)`, dialing it on first use.
    ///
    /// Concurrent first requests for the same key block on one another, so exactly one
    /// link is ever built. `batch_size` only applies when the link is created. An
    /// abandoned connection stays cached and surfaces `Abandoned` on use.
    ///
    /// The map shard holding the key stays write-locked for the whole connect and there
    /// is no timeout. An unreachable address stalls every registry call touching that
    /// shard, `len()` and `is_empty()` included, until the OS gives up on the dial.
    pub fn get(
        &self,
        addr: SocketAddr,
        batch_size: usize,
        kind: ConnectionKind,
    ) -> Result<Arc<Connection>> {
        match self.connections.entry((kind, addr)) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let handle = self.reactor.handle();
                let connection = Arc::new(Connection::open(kind, addr, batch_size, &handle)?);
                slot.insert(connection.clone());
                Ok(connection)
            }
        }
    }

    /// Same as `get`, with the kind given by its textual tag.
    pub fn get_by_tag(
        &self,
        addr: SocketAddr,
        batch_size: usize,
        tag: &str,
    ) -> Result<Arc<Connection>> {
        let kind: ConnectionKind = tag.parse()?;
        self.get(addr, batch_size, kind)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn reactor_running(&self) -> bool {
        self.reactor.is_running()
    }
}
