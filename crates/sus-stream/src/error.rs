// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Error types for sus-stream

use thiserror::Error;

/// Errors that can occur while reassembling or decoding the live fuzzer stream
#[derive(Debug, Error)]
pub enum StreamError {
    /// More bytes arrived than the declared frame length allowed, or the
    /// declared length itself is implausible. Byte alignment with the
    /// producer is lost and the reassembler is terminated.
    #[error("Framing violation: {reason} (declared length {declared}, {overflow} unexpected bytes)")]
    FramingViolation {
        /// Length declared by the offending prefix
        declared: u32,
        /// Bytes beyond what the declared length allowed
        overflow: usize,
        /// Short description of the violation
        reason: &'static str,
    },

    /// Input was pushed into a reassembler that already hit a framing violation
    #[error("Reassembler terminated after a framing violation")]
    Terminated,

    /// The stream ended while a frame was still incomplete
    #[error("Stream ended mid-frame: {owed} bytes still owed")]
    IncompleteFrame {
        /// Prefix or payload bytes still owed when the stream ended
        owed: usize,
    },

    /// A field would run past the end of the frame
    #[error(
        "Truncated frame: field `{field}` at offset {offset} needs {needed} bytes, frame has {frame_len}"
    )]
    Truncated {
        /// Name of the field being read
        field: &'static str,
        /// Offset at which the read was attempted
        offset: usize,
        /// Number of bytes the field needed
        needed: usize,
        /// Total length of the frame payload
        frame_len: usize,
    },

    /// A version string to encode is not ASCII
    #[error("Invalid text in field `{field}` at offset {offset}")]
    InvalidText {
        /// Name of the field being read
        field: &'static str,
        /// Offset of the field within the frame
        offset: usize,
    },

    /// The timestamp does not map to a representable instant
    #[error("Invalid timestamp: {millis} ms")]
    InvalidTimestamp {
        /// Raw epoch milliseconds from the frame
        millis: i64,
    },

    /// A field is too long to be encoded in its length prefix
    #[error("Field `{field}` is {len} bytes, maximum is {max}")]
    FieldTooLong {
        /// Name of the field being written
        field: &'static str,
        /// Actual length
        len: usize,
        /// Maximum encodable length
        max: usize,
    },

    /// The principal field is set but the configured revision has no slot for it
    #[error("Protocol revision `{revision}` cannot carry a principal")]
    UnsupportedField {
        /// Name of the protocol revision in use
        revision: &'static str,
    },
}

impl StreamError {
    /// Whether this error ends the stream connection
    ///
    /// Framing errors lose byte alignment; decode errors only discard one frame.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FramingViolation { .. } | Self::Terminated | Self::IncompleteFrame { .. }
        )
    }
}
