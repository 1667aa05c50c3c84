//! Frame Buffers
//!
//! Frames are length-prefixed (4-byte big-endian length, then payload). The inbound side
//! buffers raw socket bytes and yields one complete frame per call; partial frames stay
//! buffered. The outbound side queues encoded frames until a batch is full.

use super::types::{NetError, Result};

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

pub const DEFAULT_BATCH_SIZE: usize = 1;

pub struct InboundFrames {
    buffer: BytesMut,
    codec: LengthDelimitedCodec,
}

impl InboundFrames {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            codec: LengthDelimitedCodec::new(),
        }
    }

    /// The buffer the Reactor reads socket bytes into.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        self.codec
            .decode(&mut self.buffer)
            .map(|frame| frame.map(BytesMut::freeze))
            .map_err(|e| NetError::Codec(e.to_string()))
    }

    /// Bytes still waiting in the buffer. Excludes a length header the codec has
    /// already consumed while waiting for the rest of its payload.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for InboundFrames {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OutboundFrames {
    buffer: BytesMut,
    codec: LengthDelimitedCodec,
    queued: usize,
    batch_size: usize,
}

impl OutboundFrames {
    pub fn new(batch_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            codec: LengthDelimitedCodec::new(),
            queued: 0,
            batch_size: batch_size.max(1),
        }
    }

    /// Queues one frame. Returns `true` once a full batch is waiting to be written.
    pub fn push(&mut self, payload: Bytes) -> Result<bool> {
        self.codec
            .encode(payload, &mut self.buffer)
            .map_err(|e| NetError::Codec(e.to_string()))?;
        self.queued += 1;
        Ok(self.queued >= self.batch_size)
    }

    /// Hands every queued byte to the writer and starts a new batch.
    pub fn take(&mut self) -> BytesMut {
        self.queued = 0;
        self.buffer.split()
    }

    pub fn queued_frames(&self) -> usize {
        self.queued
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}
