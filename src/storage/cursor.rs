//! Store Cursors
//!
//! Lazy, forward-only, single-pass iteration. A cursor starts unpositioned; the first
//! `advance()` moves it to the first entry. Once `advance()` has returned `false`, or
//! after `close()`, any further use is an `InvalidState` error.

use super::codec;
use super::types::{Key, Result, StoreError};

use fjall::{KvPair, PartitionHandle};

pub(crate) type RawIter = Box<dyn Iterator<Item = fjall::Result<KvPair>>>;

/// Capabilities shared by full-table and pattern cursors.
pub trait Cursor {
    /// Moves to the next entry. Returns `false` when exhausted.
    fn advance(&mut self) -> Result<bool>;
    fn key(&self) -> Result<Key>;
    fn value(&self) -> Result<f64>;
    /// Releases the underlying iterator. Must be called on every exit path.
    fn close(&mut self) -> Result<()>;
}

enum Position {
    Unpositioned(RawIter),
    At {
        iter: RawIter,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Exhausted,
    Closed,
}

impl Position {
    fn current(&self) -> Result<(&[u8], &[u8])> {
        match self {
            Position::At { key, value, .. } => Ok((key.as_slice(), value.as_slice())),
            Position::Unpositioned(_) => Err(StoreError::InvalidState("cursor has not been advanced")),
            Position::Exhausted => Err(StoreError::InvalidState("cursor is exhausted")),
            Position::Closed => Err(StoreError::InvalidState("cursor is closed")),
        }
    }

    fn take_iter(&mut self) -> Result<RawIter> {
        match std::mem::replace(self, Position::Exhausted) {
            Position::Unpositioned(iter) | Position::At { iter, .. } => Ok(iter),
            Position::Exhausted => Err(StoreError::InvalidState("cursor advanced past its end")),
            Position::Closed => {
                *self = Position::Closed;
                Err(StoreError::InvalidState("cursor is closed"))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        match std::mem::replace(self, Position::Closed) {
            Position::Closed => Err(StoreError::InvalidState("cursor closed twice")),
            _ => Ok(()),
        }
    }
}

/// Walks the primary table in storage order.
pub struct FullCursor {
    position: Position,
}

impl FullCursor {
    pub(crate) fn new(iter: RawIter) -> Self {
        Self {
            position: Position::Unpositioned(iter),
        }
    }
}

impl Cursor for FullCursor {
    fn advance(&mut self) -> Result<bool> {
        let mut iter = self.position.take_iter()?;
        match iter.next() {
            Some(item) => {
                let (key, value) = item?;
                self.position = Position::At {
                    iter,
                    key: key.to_vec(),
                    value: value.to_vec(),
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn key(&self) -> Result<Key> {
        let (key, _) = self.position.current()?;
        codec::decode_key(key)
    }

    fn value(&self) -> Result<f64> {
        let (_, value) = self.position.current()?;
        codec::decode_value(value)
    }

    fn close(&mut self) -> Result<()> {
        self.position.close()
    }
}

/// Walks the full keys filed under one projection of a secondary index,
/// in the order they were first stored.
pub struct PatternCursor {
    position: Position,
    primary: PartitionHandle,
}

impl PatternCursor {
    pub(crate) fn new(iter: RawIter, primary: PartitionHandle) -> Self {
        Self {
            position: Position::Unpositioned(iter),
            primary,
        }
    }

    /// Overwrites the primary value of the entry under the cursor.
    pub fn replace(&mut self, value: f64) -> Result<()> {
        let encoded = codec::encode_value(value);
        match &mut self.position {
            Position::At { key, value: current, .. } => {
                self.primary.insert(key.clone(), encoded.clone())?;
                *current = encoded;
                Ok(())
            }
            other => other.current().map(|_| ()),
        }
    }
}

impl Cursor for PatternCursor {
    fn advance(&mut self) -> Result<bool> {
        let mut iter = self.position.take_iter()?;
        while let Some(item) = iter.next() {
            let (_, primary_key) = item?;
            // Index entries are only ever written alongside their primary row.
            let Some(value) = self.primary.get(&*primary_key)? else {
                tracing::warn!("Dangling index entry for {:?}", String::from_utf8_lossy(&primary_key));
                continue;
            };
            self.position = Position::At {
                iter,
                key: primary_key.to_vec(),
                value: value.to_vec(),
            };
            return Ok(true);
        }
        Ok(false)
    }

    fn key(&self) -> Result<Key> {
        let (key, _) = self.position.current()?;
        codec::decode_key(key)
    }

    fn value(&self) -> Result<f64> {
        let (_, value) = self.position.current()?;
        codec::decode_value(value)
    }

    fn close(&mut self) -> Result<()> {
        self.position.close()
    }
}

/// Collects every remaining entry and closes the cursor, whatever the outcome.
pub fn drain<C: Cursor + ?Sized>(cursor: &mut C) -> Result<Vec<(Key, f64)>> {
    let collected = collect(cursor);
    let closed = cursor.close();
    let entries = collected?;
    closed?;
    Ok(entries)
}

fn collect<C: Cursor + ?Sized>(cursor: &mut C) -> Result<Vec<(Key, f64)>> {
    let mut entries = Vec::new();
    while cursor.advance()? {
        entries.push((cursor.key()?, cursor.value()?));
    }
    Ok(entries)
}
