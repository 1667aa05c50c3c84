use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of peer roles a connection can be opened for.
///
/// A connection's identity is `(kind, address)`: the same address reached in two roles
/// gets two independent links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// A storage node hosting maps.
    MapNode,
    /// A switch routing updates between nodes.
    Switch,
    /// A results collector.
    Scholar,
}

impl ConnectionKind {
    pub const ALL: [ConnectionKind; 3] = [
        ConnectionKind::MapNode,
        ConnectionKind::Switch,
        ConnectionKind::Scholar,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            ConnectionKind::MapNode => "map_node",
            ConnectionKind::Switch => "switch",
            ConnectionKind::Scholar => "scholar",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ConnectionKind {
    type Err = NetError;

    fn from_str(tag: &str) -> Result<Self> {
        ConnectionKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| NetError::UnsupportedKind(tag.to_string()))
    }
}

/// Lifecycle of one link as seen by the Reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Abandoned,
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("'{0}' is not a supported connection kind")]
    UnsupportedKind(String),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("connection to {0} was abandoned")]
    Abandoned(SocketAddr),
    #[error("reactor is not running")]
    ReactorStopped,
    #[error("codec error: {0}")]
    Codec(String),
    #[error("peer rejected request: {0}")]
    Remote(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;
