// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Length-prefixed frame reassembly
//!
//! The fuzzer writes each event to its stdout as a 4-byte little-endian
//! length followed by exactly that many payload bytes. Pipe reads hand us
//! arbitrary slices of that byte stream, so a single read may hold part of a
//! frame, exactly one frame, or the tail of one frame and the head of the next.
//!
//! # Example
//!
//! ```
//! use sus_stream::framing::FrameReassembler;
//!
//! let mut reassembler = FrameReassembler::new();
//! assert!(reassembler.push(&[3, 0, 0, 0, b'a']).unwrap().is_empty());
//! let frames = reassembler.push(b"bc").unwrap();
//! assert_eq!(frames, vec![b"abc".to_vec()]);
//! ```

use crate::error::StreamError;

/// Size of the little-endian length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on a declared frame length (16 MiB)
pub const DEFAULT_MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// How many frame boundaries a single delivered chunk may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryMode {
    /// Keep consuming a chunk until it is exhausted, so any number of
    /// boundaries may fall inside one read
    #[default]
    Continuous,
    /// At most one boundary per chunk; bytes left over after a frame
    /// completes are a framing violation
    SingleBoundary,
}

impl BoundaryMode {
    /// Stable name used in configuration and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::SingleBoundary => "single-boundary",
        }
    }
}

/// Reconstructs complete payloads from arbitrarily chunked deliveries
#[derive(Debug)]
pub struct FrameReassembler {
    mode: BoundaryMode,
    max_frame_len: u32,
    /// Payload bytes still owed for the current frame; 0 while awaiting a prefix
    remaining: usize,
    declared: u32,
    prefix: [u8; LENGTH_PREFIX_LEN],
    prefix_len: usize,
    fragments: Vec<Vec<u8>>,
    terminated: bool,
    frames_emitted: u64,
}

impl FrameReassembler {
    /// Create a reassembler in [`BoundaryMode::Continuous`]
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(BoundaryMode::default())
    }

    /// Create a reassembler with an explicit boundary mode
    #[must_use]
    pub fn with_mode(mode: BoundaryMode) -> Self {
        Self {
            mode,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            remaining: 0,
            declared: 0,
            prefix: [0; LENGTH_PREFIX_LEN],
            prefix_len: 0,
            fragments: Vec::new(),
            terminated: false,
            frames_emitted: 0,
        }
    }

    /// Set the largest length a prefix may declare
    #[must_use]
    pub fn with_max_frame_len(mut self, max_frame_len: u32) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Feed one delivered chunk, returning every payload it completes
    ///
    /// # Errors
    ///
    /// Returns `StreamError::FramingViolation` when alignment with the stream
    /// is lost, after which the reassembler is terminated and every further
    /// call returns `StreamError::Terminated`.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, StreamError> {
        if self.terminated {
            return Err(StreamError::Terminated);
        }

        let mut frames = Vec::new();
        let mut rest = chunk;

        while !rest.is_empty() {
            if self.remaining == 0 {
                let take = (LENGTH_PREFIX_LEN - self.prefix_len).min(rest.len());
                self.prefix[self.prefix_len..self.prefix_len + take].copy_from_slice(&rest[..take]);
                self.prefix_len += take;
                rest = &rest[take..];

                if self.prefix_len < LENGTH_PREFIX_LEN {
                    break;
                }
                self.prefix_len = 0;

                let declared = u32::from_le_bytes(self.prefix);
                if declared > self.max_frame_len {
                    return Err(self.violation(
                        declared,
                        rest.len(),
                        "declared length exceeds the frame limit",
                    ));
                }
                self.declared = declared;
                self.remaining = declared as usize;
            }

            if self.remaining > 0 {
                let take = self.remaining.min(rest.len());
                self.fragments.push(rest[..take].to_vec());
                self.remaining -= take;
                rest = &rest[take..];
            }

            if self.remaining == 0 {
                frames.push(self.take_payload());

                if self.mode == BoundaryMode::SingleBoundary && !rest.is_empty() {
                    return Err(self.violation(
                        self.declared,
                        rest.len(),
                        "bytes past the end of the declared frame",
                    ));
                }
            }
        }

        Ok(frames)
    }

    /// Signal end of stream
    ///
    /// # Errors
    ///
    /// Returns `StreamError::IncompleteFrame` if a prefix or payload was
    /// still being collected.
    pub fn finish(self) -> Result<(), StreamError> {
        if self.terminated {
            return Err(StreamError::Terminated);
        }
        if self.prefix_len > 0 {
            return Err(StreamError::IncompleteFrame {
                owed: LENGTH_PREFIX_LEN - self.prefix_len,
            });
        }
        if self.remaining > 0 {
            return Err(StreamError::IncompleteFrame {
                owed: self.remaining,
            });
        }
        Ok(())
    }

    /// Payload bytes still owed for the in-progress frame
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Whether part of a prefix or payload has been buffered
    #[must_use]
    pub fn is_mid_frame(&self) -> bool {
        self.remaining > 0 || self.prefix_len > 0
    }

    /// Payload bytes buffered for the in-progress frame
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.fragments.iter().map(Vec::len).sum()
    }

    /// Whether a framing violation has terminated this reassembler
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number of complete payloads emitted so far
    #[must_use]
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// The boundary mode this reassembler runs in
    #[must_use]
    pub fn mode(&self) -> BoundaryMode {
        self.mode
    }

    fn take_payload(&mut self) -> Vec<u8> {
        self.frames_emitted += 1;
        if self.fragments.len() == 1 {
            return self.fragments.pop().unwrap_or_default();
        }
        let payload = self.fragments.concat();
        self.fragments.clear();
        payload
    }

    fn violation(&mut self, declared: u32, overflow: usize, reason: &'static str) -> StreamError {
        self.terminated = true;
        self.fragments.clear();
        self.remaining = 0;
        StreamError::FramingViolation {
            declared,
            overflow,
            reason,
        }
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Prepend the length prefix to a payload
///
/// # Errors
///
/// Returns `StreamError::FieldTooLong` if the payload does not fit a `u32` length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, StreamError> {
    let len = u32::try_from(payload.len()).map_err(|_| StreamError::FieldTooLong {
        field: "frame",
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn frame(payload: &[u8]) -> Vec<u8> {
        encode_frame(payload).expect("encode frame")
    }

    #[test]
    fn test_single_frame_single_chunk() {
        let mut r = FrameReassembler::new();
        let frames = r.push(&frame(b"hello")).expect("push");
        assert_eq!(frames, vec![b"hello".to_vec()]);
        assert!(!r.is_mid_frame());
        assert_eq!(r.frames_emitted(), 1);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let bytes = frame(b"hello world");
        let mut r = FrameReassembler::new();

        assert!(r.push(&bytes[..6]).expect("push").is_empty());
        assert_eq!(r.remaining(), 9);
        assert!(r.push(&bytes[6..10]).expect("push").is_empty());
        assert_eq!(r.buffered_len(), 6);

        let frames = r.push(&bytes[10..]).expect("push");
        assert_eq!(frames, vec![b"hello world".to_vec()]);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_prefix_split_across_chunks() {
        let bytes = frame(b"xyz");
        let mut r = FrameReassembler::new();

        assert!(r.push(&bytes[..1]).expect("push").is_empty());
        assert!(r.is_mid_frame());
        assert_eq!(r.remaining(), 0);
        assert!(r.push(&bytes[1..3]).expect("push").is_empty());
        let frames = r.push(&bytes[3..]).expect("push");
        assert_eq!(frames, vec![b"xyz".to_vec()]);
    }

    #[test]
    fn test_zero_length_frame() {
        let mut r = FrameReassembler::new();
        let frames = r.push(&frame(b"")).expect("push");
        assert_eq!(frames, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_incomplete_frame_is_observable() {
        let mut bytes = 100u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[7u8; 40]);

        let mut r = FrameReassembler::new();
        let frames = r.push(&bytes).expect("push");

        assert!(frames.is_empty());
        assert!(r.is_mid_frame());
        assert_eq!(r.remaining(), 60);
        assert_eq!(r.buffered_len(), 40);
        assert!(matches!(
            r.finish(),
            Err(StreamError::IncompleteFrame { owed: 60 })
        ));
    }

    #[test]
    fn test_finish_when_idle() {
        let mut r = FrameReassembler::new();
        r.push(&frame(b"done")).expect("push");
        assert!(r.finish().is_ok());
    }

    #[test]
    fn test_continuous_mode_handles_many_boundaries_per_chunk() {
        let first = frame(b"first");
        let second = frame(b"second");
        let third = frame(b"third");

        let mut r = FrameReassembler::new();
        // Head of the first frame alone
        assert!(r.push(&first[..6]).expect("push").is_empty());

        // Tail of frame 1, all of frame 2, head of frame 3
        let mut chunk = first[6..].to_vec();
        chunk.extend_from_slice(&second);
        chunk.extend_from_slice(&third[..5]);
        let frames = r.push(&chunk).expect("push");
        assert_eq!(frames, vec![b"first".to_vec(), b"second".to_vec()]);

        let frames = r.push(&third[5..]).expect("push");
        assert_eq!(frames, vec![b"third".to_vec()]);
    }

    #[test]
    fn test_single_boundary_mode_rejects_second_boundary_in_chunk() {
        let first = frame(b"first");
        let second = frame(b"second");

        let mut r = FrameReassembler::with_mode(BoundaryMode::SingleBoundary);
        assert!(r.push(&first[..6]).expect("push").is_empty());

        let mut chunk = first[6..].to_vec();
        chunk.extend_from_slice(&second[..7]);
        let err = r.push(&chunk).expect_err("overflow must be fatal");

        assert!(matches!(
            err,
            StreamError::FramingViolation {
                declared: 5,
                overflow: 7,
                ..
            }
        ));
        assert!(err.is_fatal());
        assert!(r.is_terminated());
        assert!(matches!(r.push(b"more"), Err(StreamError::Terminated)));
    }

    #[test]
    fn test_single_boundary_mode_accepts_one_boundary_per_chunk() {
        let mut r = FrameReassembler::with_mode(BoundaryMode::SingleBoundary);
        let bytes = frame(b"abcdef");

        assert!(r.push(&bytes[..7]).expect("push").is_empty());
        let frames = r.push(&bytes[7..]).expect("push");
        assert_eq!(frames, vec![b"abcdef".to_vec()]);

        let frames = r.push(&frame(b"next")).expect("push");
        assert_eq!(frames, vec![b"next".to_vec()]);
    }

    #[test]
    fn test_declared_length_over_limit_is_fatal() {
        let mut r = FrameReassembler::new().with_max_frame_len(8);
        let err = r.push(&frame(b"way too long")).expect_err("limit");
        assert!(matches!(
            err,
            StreamError::FramingViolation { declared: 12, .. }
        ));
        assert!(r.is_terminated());
        assert!(matches!(r.finish(), Err(StreamError::Terminated)));
    }

    #[test]
    fn test_boundary_mode_names() {
        assert_eq!(BoundaryMode::default(), BoundaryMode::Continuous);
        assert_eq!(BoundaryMode::Continuous.as_str(), "continuous");
        assert_eq!(BoundaryMode::SingleBoundary.as_str(), "single-boundary");
    }
}
