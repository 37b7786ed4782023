// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! sus-corpus: crash capture indexing for sus-triage
//!
//! Reads the capture directories a fuzzer saves on disk, derives a one-line
//! crash signature from each capture's stderr and groups captures whose
//! signatures match.
//!
//! # Example
//!
//! ```no_run
//! use sus_corpus::{CorpusIndex, CorpusOptions, CaptureId};
//!
//! let index = CorpusIndex::new(CorpusOptions::new("saved_logs").with_project_root("/work/zls"));
//! index.rebuild().unwrap();
//!
//! for group in index.groups() {
//!     println!("{} x{}", group.signature, group.members.len());
//! }
//!
//! // A new directory appeared
//! let id = CaptureId::parse("crash-1705458786123-0").unwrap();
//! index.insert_incremental(&id).unwrap();
//! ```

#![warn(missing_docs)]

pub mod capture;
pub mod error;
pub mod index;
pub mod signature;

pub use capture::{CaptureId, CaptureInfo, CaptureReader, LogEncoding, MemberKind, RawCapture};
pub use error::CorpusError;
pub use index::{
    CorpusIndex, CorpusOptions, CrashCapture, CrashGroup, InsertOutcome, RebuildStats,
};
pub use signature::{
    CrashLocation, Extraction, NO_SUMMARY, SignatureExtractor, SignatureHash,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::capture::{CaptureId, LogEncoding, MemberKind};
    pub use crate::error::CorpusError;
    pub use crate::index::{CorpusIndex, CorpusOptions, CrashCapture, CrashGroup};
    pub use crate::signature::SignatureHash;
}
