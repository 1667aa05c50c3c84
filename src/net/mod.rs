//! Peer Networking Module
//!
//! Message-framed TCP links between Cumulus nodes.
//!
//! ## Core Concepts
//! - **Reactor**: one background thread multiplexes every peer socket. Callers enqueue
//!   connect, read and write requests and block on the completions it produces.
//! - **Connections**: at most one per `(kind, address)` in the process, handed out by the
//!   `ConnectionRegistry`.
//! - **Frames**: 4-byte big-endian length followed by the payload. Every complete inbound
//!   frame completes exactly one waiter, in wire order.
//! - **Peer protocol**: bincode `PeerRequest`/`PeerResponse` messages served by `PeerServer`
//!   and spoken by `NodeClient`.

pub mod client;
pub mod connection;
pub mod frame;
pub mod protocol;
pub mod reactor;
pub mod server;
pub mod types;
