//! Secondary Pattern Indices
//!
//! Each registered `Pattern` owns one partition mapping the projection of a stored key
//! onto the pattern's dimensions to every full key sharing that projection. Entries are
//! written in the same batch as the primary write, so the index never lags the table.

use super::codec;
use super::cursor::PatternCursor;
use super::types::{Key, Pattern, Result};

use fjall::{Batch, Keyspace, PartitionCreateOptions, PartitionHandle};

/// Derives the secondary key of a stored key. Must be pure.
pub type Projector = fn(&Pattern, &[i64]) -> Key;

/// Values of `key` at the pattern's dimensions, in pattern order.
pub fn project(pattern: &Pattern, key: &[i64]) -> Key {
    pattern.dims().iter().map(|&dim| key[dim]).collect()
}

pub struct PatternIndex {
    pattern: Pattern,
    ordinal: usize,
    partition: PartitionHandle,
    projector: Projector,
}

impl PatternIndex {
    pub fn partition_name(store_name: &str, ordinal: usize) -> String {
        format!("db_{}_{}", store_name, ordinal)
    }

    pub fn open(
        keyspace: &Keyspace,
        store_name: &str,
        ordinal: usize,
        pattern: Pattern,
        projector: Projector,
    ) -> Result<Self> {
        let name = Self::partition_name(store_name, ordinal);
        tracing::debug!("Creating secondary index {} at {}", pattern, name);
        let partition = keyspace.open_partition(&name, PartitionCreateOptions::default())?;
        Ok(Self {
            pattern,
            ordinal,
            partition,
            projector,
        })
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn project(&self, key: &[i64]) -> Key {
        (self.projector)(&self.pattern, key)
    }

    /// Meta-partition key recording which pattern this ordinal was built for.
    pub(crate) fn meta_key(&self) -> Vec<u8> {
        format!("pattern_{}", self.ordinal).into_bytes()
    }

    pub(crate) fn meta_value(&self) -> Vec<u8> {
        codec::encode_key(&self.pattern.dims().iter().map(|&d| d as i64).collect::<Vec<_>>())
    }

    /// Adds the entry for a newly stored key to `batch`.
    pub(crate) fn stage_insert(&self, batch: &mut Batch, key: &[i64], key_bytes: &[u8], seq: u64) {
        let entry = codec::encode_index_entry(&self.project(key), seq);
        batch.insert(&self.partition, entry, key_bytes.to_vec());
    }

    /// Drops every entry and re-derives the index from `primary`.
    /// Returns the number of entries written.
    ///
    /// Sequence numbers are assigned in primary storage order, which is key-text order.
    /// Duplicates stored before the rebuild therefore enumerate in key order rather than
    /// insertion order; keys stored afterwards keep insertion order.
    pub(crate) fn rebuild(
        &self,
        keyspace: &Keyspace,
        primary: &PartitionHandle,
        meta: &PartitionHandle,
        next_seq: &mut u64,
    ) -> Result<usize> {
        let mut batch = keyspace.batch();
        for item in self.partition.iter() {
            let (entry, _) = item?;
            batch.remove(&self.partition, entry);
        }

        let mut written = 0;
        for item in primary.iter() {
            let (key_bytes, _) = item?;
            let key = codec::decode_key(&key_bytes)?;
            self.stage_insert(&mut batch, &key, &key_bytes, *next_seq);
            *next_seq += 1;
            written += 1;
        }

        batch.insert(meta, self.meta_key(), self.meta_value());
        batch.insert(meta, super::store::NEXT_SEQ_KEY.to_vec(), codec::encode_seq(*next_seq));
        batch.commit()?;

        tracing::info!(
            "Rebuilt secondary index {} ({} entries)",
            self.pattern,
            written
        );
        Ok(written)
    }

    /// Opens a cursor over every stored key whose projection equals `projection`.
    pub fn cursor(&self, projection: &[i64], primary: PartitionHandle) -> PatternCursor {
        let iter = self.partition.prefix(codec::projection_prefix(projection));
        PatternCursor::new(Box::new(iter), primary)
    }
}
