//! Cumulus Storage Node Library
//!
//! The node-local half of the Cumulus system: durable multi-key tables and the peer links
//! nodes use to reach one another. The binary (`main.rs`) wires them to a configuration
//! file and an operator HTTP surface.
//!
//! ## Architecture Modules
//!
//! - **`storage`**: Fixed-arity integer keys mapped to floating-point values, with secondary
//!   indices over registered subsets of key dimensions. Partial-key scans are answered only
//!   by an exactly matching index.
//! - **`net`**: A single reactor thread multiplexing length-prefixed TCP frame links, a
//!   process-wide registry of one connection per `(kind, address)`, and the peer protocol
//!   spoken over those links.
//! - **`config`**: The node configuration file.

pub mod config;
pub mod net;
pub mod storage;
