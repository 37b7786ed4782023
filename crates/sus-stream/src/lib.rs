// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! sus-stream: live fuzzer stream decoding for sus-triage
//!
//! This library crate turns the length-prefixed binary stream written by a
//! long-running fuzzer subprocess into structured [`FuzzEvent`] records.
//!
//! # Example
//!
//! ```no_run
//! use sus_stream::{EventStream, StreamOptions, ProtocolRevision};
//!
//! let mut stream = EventStream::new(StreamOptions::for_revision(ProtocolRevision::WithPrincipal));
//!
//! // Feed whatever each pipe read returned
//! let chunk: &[u8] = &[];
//! for event in stream.feed(chunk).unwrap() {
//!     println!("{} {}", event.timestamp, event.message);
//! }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod framing;
pub mod stream;

pub use error::StreamError;
pub use event::{EventCodec, FuzzEvent, ProtocolRevision};
pub use framing::{BoundaryMode, FrameReassembler, encode_frame};
pub use stream::{EventStream, StreamOptions, StreamStats};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::StreamError;
    pub use crate::event::{EventCodec, FuzzEvent, ProtocolRevision};
    pub use crate::stream::{EventStream, StreamOptions};
}
