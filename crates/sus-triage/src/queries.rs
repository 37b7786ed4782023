// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Read-only views for the dashboard and the CLI
//!
//! Corpus views are built from a [`CorpusIndex`] snapshot; event views come
//! from the database. Missing captures and unknown member kinds are `None`,
//! never an error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sus_corpus::{CorpusIndex, CrashCapture, CrashGroup};
use thiserror::Error;

use crate::db::{Database, DbError, EventRecord};

/// Largest number of events one query returns
pub const MAX_EVENT_LIMIT: usize = 10_000;

/// Query errors
#[derive(Debug, Error)]
pub enum QueryError {
    /// Database error during query
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// One row of the capture listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    /// Capture directory name
    pub id: String,
    /// Creation time embedded in the id
    pub created_at: DateTime<Utc>,
    /// Toolchain version
    pub toolchain_version: String,
    /// Server version
    pub server_version: String,
    /// Deduplication key
    pub signature: String,
    /// Hash of the signature
    pub signature_hash: String,
}

impl From<&CrashCapture> for CaptureSummary {
    fn from(capture: &CrashCapture) -> Self {
        Self {
            id: capture.id.to_string(),
            created_at: capture.created_at,
            toolchain_version: capture.toolchain_version.clone(),
            server_version: capture.server_version.clone(),
            signature: capture.signature.clone(),
            signature_hash: capture.signature_hash.to_string(),
        }
    }
}

/// One capture with its trace and the rest of its group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureDetail {
    /// Listing fields
    #[serde(flatten)]
    pub summary: CaptureSummary,
    /// Stderr from the first panic marker onward
    pub panic_trace: Option<String>,
    /// Other captures with the same signature, newest first
    pub related: Vec<CaptureSummary>,
}

/// One row of the group listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    /// Group key
    pub signature_hash: String,
    /// Shared signature
    pub signature: String,
    /// Number of captures
    pub count: usize,
    /// Most recent member's creation time
    pub last_seen: Option<DateTime<Utc>>,
    /// Member capture ids, newest first
    pub members: Vec<String>,
}

impl From<&CrashGroup> for GroupSummary {
    fn from(group: &CrashGroup) -> Self {
        Self {
            signature_hash: group.signature_hash.to_string(),
            signature: group.signature.clone(),
            count: group.members.len(),
            last_seen: group.members.first().map(|c| c.created_at),
            members: group.members.iter().map(|c| c.id.to_string()).collect(),
        }
    }
}

/// All captures, newest first
#[must_use]
pub fn list_captures(index: &CorpusIndex) -> Vec<CaptureSummary> {
    index
        .captures()
        .iter()
        .map(|c| CaptureSummary::from(c.as_ref()))
        .collect()
}

/// All groups, most recently seen first
#[must_use]
pub fn list_groups(index: &CorpusIndex) -> Vec<GroupSummary> {
    index.groups().iter().map(GroupSummary::from).collect()
}

/// One capture with its related captures
#[must_use]
pub fn capture_detail(index: &CorpusIndex, id: &str) -> Option<CaptureDetail> {
    let capture = index.capture(id)?;
    let related = index
        .group_of(id)
        .map(|group| {
            group
                .members
                .iter()
                .filter(|c| c.id != capture.id)
                .map(|c| CaptureSummary::from(c.as_ref()))
                .collect()
        })
        .unwrap_or_default();

    Some(CaptureDetail {
        summary: CaptureSummary::from(capture.as_ref()),
        panic_trace: capture.panic_trace.clone(),
        related,
    })
}

/// Stored live events, newest first
///
/// # Errors
///
/// Returns an error if `limit` is zero or above [`MAX_EVENT_LIMIT`], or the
/// query fails.
pub fn recent_events(db: &Database, limit: usize) -> Result<Vec<EventRecord>, QueryError> {
    if limit == 0 || limit > MAX_EVENT_LIMIT {
        return Err(QueryError::InvalidParameter(format!(
            "limit must be between 1 and {MAX_EVENT_LIMIT}, got {limit}"
        )));
    }
    Ok(db.recent_events(limit)?)
}
