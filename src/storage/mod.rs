//! Multi-Key Storage Module
//!
//! Implements the node-local table behind every Cumulus map.
//!
//! ## Core Concepts
//! - **Keys**: fixed-arity integer tuples, stored as comma-joined text (`"3,7,12"`).
//! - **Patterns**: registered subsets of key dimensions. Each owns a secondary index that is
//!   written in the same atomic batch as the primary entry, so reads never observe a lag.
//! - **Scans**: a partial key is answered only by the index whose dimensions are exactly its
//!   non-wildcard positions. There is no silent fallback to a full scan.
//! - **Durability**: writes are buffered by the environment and persisted in the background;
//!   `close()` forces a flush.

pub mod catalog;
pub mod codec;
pub mod cursor;
pub mod environment;
pub mod handlers;
pub mod pattern;
pub mod protocol;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;
