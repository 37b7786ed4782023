// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Incremental event decoding over a raw byte stream
//!
//! [`EventStream`] glues a [`FrameReassembler`] to an [`EventCodec`]: feed it
//! whatever the transport delivered and it hands back every event completed
//! by that delivery, in stream order.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::event::{EventCodec, FuzzEvent, ProtocolRevision};
use crate::framing::{BoundaryMode, DEFAULT_MAX_FRAME_LEN, FrameReassembler};

/// Settings for one stream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Payload layout of the connected fuzzer
    pub revision: ProtocolRevision,
    /// Frame boundaries tolerated per delivered chunk
    pub boundary_mode: BoundaryMode,
    /// Largest frame length a prefix may declare
    pub max_frame_len: u32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            revision: ProtocolRevision::default(),
            boundary_mode: BoundaryMode::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl StreamOptions {
    /// Options for the given protocol revision
    #[must_use]
    pub fn for_revision(revision: ProtocolRevision) -> Self {
        Self {
            revision,
            ..Default::default()
        }
    }

    /// Set the boundary mode
    #[must_use]
    pub fn with_boundary_mode(mut self, mode: BoundaryMode) -> Self {
        self.boundary_mode = mode;
        self
    }

    /// Set the frame length limit
    #[must_use]
    pub fn with_max_frame_len(mut self, max_frame_len: u32) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }
}

/// Counters for one stream connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Chunks delivered by the transport
    pub chunks: u64,
    /// Bytes delivered by the transport
    pub bytes: u64,
    /// Complete frames reassembled
    pub frames: u64,
    /// Frames decoded into events
    pub events: u64,
    /// Frames discarded because they failed to decode
    pub decode_errors: u64,
}

/// Stateful decoder for one live stream connection
#[derive(Debug)]
pub struct EventStream {
    reassembler: FrameReassembler,
    codec: EventCodec,
    stats: StreamStats,
}

impl EventStream {
    /// Create a stream decoder
    #[must_use]
    pub fn new(options: StreamOptions) -> Self {
        Self {
            reassembler: FrameReassembler::with_mode(options.boundary_mode)
                .with_max_frame_len(options.max_frame_len),
            codec: EventCodec::new(options.revision),
            stats: StreamStats::default(),
        }
    }

    /// Feed one delivered chunk and collect the events it completes
    ///
    /// Frames that fail to decode are logged, counted and skipped.
    ///
    /// # Errors
    ///
    /// Returns a fatal framing error; the connection must be discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<FuzzEvent>, StreamError> {
        self.stats.chunks += 1;
        self.stats.bytes += chunk.len() as u64;

        let frames = self.reassembler.push(chunk).inspect_err(|e| {
            warn!(
                error = %e,
                chunk_len = chunk.len(),
                frames = self.stats.frames,
                "Framing violation, stream alignment lost"
            );
        })?;

        let mut events = Vec::with_capacity(frames.len());
        for frame in frames {
            self.stats.frames += 1;
            match self.codec.decode(&frame) {
                Ok(event) => {
                    self.stats.events += 1;
                    events.push(event);
                }
                Err(e) => {
                    self.stats.decode_errors += 1;
                    warn!(
                        error = %e,
                        frame_len = frame.len(),
                        revision = self.codec.revision().as_str(),
                        "Discarding undecodable frame"
                    );
                }
            }
        }

        if !events.is_empty() {
            debug!(count = events.len(), "Decoded events");
        }
        Ok(events)
    }

    /// Bytes still owed for the in-progress frame
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.reassembler.remaining()
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// End the stream and return the final counters
    ///
    /// # Errors
    ///
    /// Returns `StreamError::IncompleteFrame` if the stream stopped mid-frame.
    pub fn finish(self) -> Result<StreamStats, StreamError> {
        self.reassembler.finish()?;
        Ok(self.stats)
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(StreamOptions::default())
    }
}
