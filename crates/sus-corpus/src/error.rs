// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Error types for sus-corpus

use thiserror::Error;

/// Errors that can occur while reading or indexing crash captures
///
/// Messages name the capture id and member file, never a full path.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Capture id is not a single, plain path segment
    #[error("Invalid capture id: {id:?}")]
    InvalidCaptureId {
        /// The rejected identifier
        id: String,
    },

    /// The second hyphen-delimited field of the id is not epoch milliseconds
    #[error("Invalid creation timestamp in capture id {id}")]
    InvalidTimestamp {
        /// The capture id
        id: String,
    },

    /// No capture directory with this id exists
    #[error("Capture not found: {id}")]
    CaptureNotFound {
        /// The capture id
        id: String,
    },

    /// A required member file is missing from the capture directory
    #[error("Capture {id} has no `{file}`")]
    MemberNotFound {
        /// The capture id
        id: String,
        /// Member file name
        file: &'static str,
    },

    /// A member file exists but could not be read or decompressed
    #[error("Failed to read `{file}` of capture {id}: {source}")]
    MemberRead {
        /// The capture id
        id: String,
        /// Member file name
        file: &'static str,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The info record lacks a required line
    #[error("Malformed info record in capture {id}: missing `{key}` line")]
    MalformedInfo {
        /// The capture id
        id: String,
        /// Key of the missing line
        key: &'static str,
    },

    /// Kind selector outside `stderr`, `stdout`, `stdin`, `principal`
    #[error("Unknown member kind: {kind:?}")]
    UnknownKind {
        /// The rejected selector
        kind: String,
    },

    /// The capture root itself could not be listed
    #[error("Capture root unreadable: {0}")]
    Io(#[from] std::io::Error),
}

impl CorpusError {
    /// Whether the error means "nothing there" rather than a broken capture
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::InvalidCaptureId { .. }
                | Self::CaptureNotFound { .. }
                | Self::MemberNotFound { .. }
                | Self::UnknownKind { .. }
        )
    }
}
