// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Deduplicated crash corpus index
//!
//! [`CorpusIndex`] owns the capture list, the signature-hash group map and the
//! indexed-marker set. Mutation happens only through [`CorpusIndex::rebuild`]
//! and [`CorpusIndex::insert_incremental`], each applying its change under one
//! write lock so readers see either the old or the new state.
//!
//! Captures and group members are kept ordered by `(created_at, id)`
//! descending, whichever path added them.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capture::{CaptureId, CaptureReader, LogEncoding, MemberKind};
use crate::error::CorpusError;
use crate::signature::{DEFAULT_SOURCE_EXTENSION, SignatureExtractor, SignatureHash};

// ============================================================================
// Records
// ============================================================================

/// One indexed crash capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrashCapture {
    /// Directory name
    pub id: CaptureId,
    /// Creation time embedded in the id
    pub created_at: DateTime<Utc>,
    /// Toolchain version from the info record
    pub toolchain_version: String,
    /// Server version from the info record
    pub server_version: String,
    /// Decompressed server stderr
    pub raw_stderr: String,
    /// Stderr from the first panic marker onward
    pub panic_trace: Option<String>,
    /// Deduplication key
    pub signature: String,
    /// Hash of `signature`
    pub signature_hash: SignatureHash,
}

impl CrashCapture {
    /// Newest first, ties broken by id descending
    fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// All captures sharing one signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrashGroup {
    /// Group key
    pub signature_hash: SignatureHash,
    /// Shared signature
    pub signature: String,
    /// Members, newest first
    pub members: Vec<Arc<CrashCapture>>,
}

impl CrashGroup {
    fn newest(&self) -> Option<&Arc<CrashCapture>> {
        self.members.first()
    }
}

/// Result of [`CorpusIndex::insert_incremental`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The capture was added
    Inserted {
        /// Group the capture joined
        signature_hash: SignatureHash,
        /// Whether the group was created by this insert
        new_group: bool,
    },
    /// The id was already indexed
    AlreadyIndexed,
    /// Another caller is indexing this id right now
    InProgress,
}

/// Summary of a full rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildStats {
    /// Captures indexed
    pub indexed: usize,
    /// Directories skipped after a read error
    pub skipped: usize,
    /// Distinct signatures
    pub groups: usize,
}

// ============================================================================
// Options
// ============================================================================

/// Where captures live and how to read them
#[derive(Debug, Clone)]
pub struct CorpusOptions {
    /// Capture root directory
    pub saved_logs: PathBuf,
    /// Root that signature paths are relative to
    pub project_root: PathBuf,
    /// Member file encoding
    pub encoding: LogEncoding,
    /// Source extension on location lines
    pub source_extension: String,
}

impl CorpusOptions {
    /// Options for a capture root with default settings
    #[must_use]
    pub fn new(saved_logs: impl Into<PathBuf>) -> Self {
        Self {
            saved_logs: saved_logs.into(),
            project_root: PathBuf::new(),
            encoding: LogEncoding::default(),
            source_extension: DEFAULT_SOURCE_EXTENSION.to_string(),
        }
    }

    /// Set the project root
    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// Set the member file encoding
    #[must_use]
    pub fn with_encoding(mut self, encoding: LogEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the recognized source extension
    #[must_use]
    pub fn with_source_extension(mut self, extension: impl Into<String>) -> Self {
        self.source_extension = extension.into();
        self
    }
}

// ============================================================================
// Index
// ============================================================================

#[derive(Debug, Default)]
struct IndexState {
    indexed: HashSet<CaptureId>,
    in_flight: HashSet<CaptureId>,
    captures: Vec<Arc<CrashCapture>>,
    groups: HashMap<SignatureHash, CrashGroup>,
}

impl IndexState {
    /// Add a capture at its sorted position; returns whether a group was created
    fn insert(&mut self, capture: Arc<CrashCapture>) -> bool {
        let at = self
            .captures
            .partition_point(|c| CrashCapture::newest_first(c, &capture) == Ordering::Less);
        self.captures.insert(at, Arc::clone(&capture));
        self.indexed.insert(capture.id.clone());

        let mut new_group = false;
        let group = self
            .groups
            .entry(capture.signature_hash.clone())
            .or_insert_with(|| {
                new_group = true;
                CrashGroup {
                    signature_hash: capture.signature_hash.clone(),
                    signature: capture.signature.clone(),
                    members: Vec::new(),
                }
            });
        let at = group
            .members
            .partition_point(|c| CrashCapture::newest_first(c, &capture) == Ordering::Less);
        group.members.insert(at, capture);
        new_group
    }
}

/// Process-wide crash corpus index
#[derive(Debug)]
pub struct CorpusIndex {
    reader: CaptureReader,
    extractor: SignatureExtractor,
    state: RwLock<IndexState>,
}

impl CorpusIndex {
    /// Create an empty index
    #[must_use]
    pub fn new(options: CorpusOptions) -> Self {
        Self {
            reader: CaptureReader::new(options.saved_logs, options.encoding),
            extractor: SignatureExtractor::new(options.project_root)
                .with_source_extension(options.source_extension),
            state: RwLock::new(IndexState::default()),
        }
    }

    /// The capture reader
    #[must_use]
    pub fn reader(&self) -> &CaptureReader {
        &self.reader
    }

    fn read_state(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read one capture and derive its signature
    ///
    /// # Errors
    ///
    /// Returns the reader's error, or `CorpusError::InvalidTimestamp`.
    pub fn load(&self, id: &CaptureId) -> Result<CrashCapture, CorpusError> {
        let created_at = id.created_at()?;
        let raw = self.reader.read(id)?;
        let extraction = self.extractor.extract(&raw.stderr);

        Ok(CrashCapture {
            id: raw.id,
            created_at,
            toolchain_version: raw.info.toolchain_version,
            server_version: raw.info.server_version,
            signature_hash: extraction.signature_hash(),
            signature: extraction.signature,
            panic_trace: extraction.panic_trace,
            raw_stderr: raw.stderr,
        })
    }

    /// Discard all state and index every capture under the root
    ///
    /// Captures that fail to read are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::Io` only if the capture root cannot be listed.
    pub fn rebuild(&self) -> Result<RebuildStats, CorpusError> {
        let ids = self.reader.list()?;
        let mut stats = RebuildStats::default();

        let mut captures = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.load(id) {
                Ok(capture) => captures.push(capture),
                Err(e) => {
                    stats.skipped += 1;
                    warn!(capture = %id, error = %e, "Skipping capture");
                }
            }
        }
        captures.sort_by(CrashCapture::newest_first);

        let mut fresh = IndexState::default();
        for capture in captures {
            fresh.insert(Arc::new(capture));
        }
        stats.indexed = fresh.captures.len();
        stats.groups = fresh.groups.len();

        {
            let mut state = self.write_state();
            fresh.in_flight = std::mem::take(&mut state.in_flight);
            *state = fresh;
        }

        info!(
            indexed = stats.indexed,
            skipped = stats.skipped,
            groups = stats.groups,
            "Corpus index rebuilt"
        );
        Ok(stats)
    }

    /// Index one capture unless it is already indexed
    ///
    /// The file reads run without holding the lock. On failure the id stays
    /// unmarked so a later call retries it from scratch.
    ///
    /// # Errors
    ///
    /// Returns the read error for this capture.
    pub fn insert_incremental(&self, id: &CaptureId) -> Result<InsertOutcome, CorpusError> {
        {
            let mut state = self.write_state();
            if state.indexed.contains(id) {
                debug!(capture = %id, "Duplicate notification");
                return Ok(InsertOutcome::AlreadyIndexed);
            }
            if !state.in_flight.insert(id.clone()) {
                debug!(capture = %id, "Capture already being indexed");
                return Ok(InsertOutcome::InProgress);
            }
        }

        let loaded = self.load(id);

        let mut state = self.write_state();
        state.in_flight.remove(id);
        let capture = loaded?;

        // A rebuild may have picked it up while we were reading
        if state.indexed.contains(id) {
            return Ok(InsertOutcome::AlreadyIndexed);
        }

        let signature_hash = capture.signature_hash.clone();
        let new_group = state.insert(Arc::new(capture));
        debug!(capture = %id, signature = %signature_hash, new_group, "Indexed capture");
        Ok(InsertOutcome::Inserted {
            signature_hash,
            new_group,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All captures, newest first
    #[must_use]
    pub fn captures(&self) -> Vec<Arc<CrashCapture>> {
        self.read_state().captures.clone()
    }

    /// All groups, ordered by their newest member
    #[must_use]
    pub fn groups(&self) -> Vec<CrashGroup> {
        let mut groups: Vec<CrashGroup> = self.read_state().groups.values().cloned().collect();
        groups.sort_by(|a, b| match (a.newest(), b.newest()) {
            (Some(x), Some(y)) => CrashCapture::newest_first(x, y),
            _ => a.signature_hash.cmp(&b.signature_hash),
        });
        groups
    }

    /// One indexed capture by id
    #[must_use]
    pub fn capture(&self, id: &str) -> Option<Arc<CrashCapture>> {
        let id = CaptureId::parse(id).ok()?;
        self.read_state()
            .captures
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// The group a capture belongs to
    #[must_use]
    pub fn group_of(&self, id: &str) -> Option<CrashGroup> {
        let capture = self.capture(id)?;
        self.read_state()
            .groups
            .get(&capture.signature_hash)
            .cloned()
    }

    /// Raw content of one member file of an indexed capture
    ///
    /// Unknown ids and kinds yield `None`; the id is validated as a single
    /// path segment before any file access.
    #[must_use]
    pub fn member(&self, id: &str, kind: &str) -> Option<Vec<u8>> {
        let lookup = || -> Result<Vec<u8>, CorpusError> {
            let kind: MemberKind = kind.parse()?;
            let id = CaptureId::parse(id)?;
            if !self.is_indexed(&id) {
                return Err(CorpusError::CaptureNotFound { id: id.to_string() });
            }
            self.reader.read_member(&id, kind)
        };

        match lookup() {
            Ok(bytes) => Some(bytes),
            Err(e) if e.is_not_found() => {
                debug!(capture = id, kind, error = %e, "Member not found");
                None
            }
            Err(e) => {
                warn!(capture = id, kind, error = %e, "Member unreadable");
                None
            }
        }
    }

    /// Whether the id has been indexed
    #[must_use]
    pub fn is_indexed(&self, id: &CaptureId) -> bool {
        self.read_state().indexed.contains(id)
    }

    /// Number of indexed captures
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_state().captures.len()
    }

    /// Whether nothing is indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct signatures
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.read_state().groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;
    use std::fs;
    use std::path::Path;

    fn write_plain(root: &Path, name: &str, stderr: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("stderr.log"), stderr).expect("stderr");
        fs::write(dir.join("stdout.log"), "").expect("stdout");
        fs::write(dir.join("stdin.log"), "").expect("stdin");
        fs::write(dir.join("info"), "toolchain: t\nserver: s\n").expect("info");
    }

    fn index(root: &Path) -> CorpusIndex {
        CorpusIndex::new(CorpusOptions::new(root).with_encoding(LogEncoding::Plain))
    }

    #[test]
    fn test_sorted_insert_orders_by_created_at() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let idx = index(tmp.path());
        for name in ["c-200-a", "c-100-a", "c-300-a", "c-200-b"] {
            write_plain(tmp.path(), name, "");
            idx.insert_incremental(&CaptureId::parse(name).expect("id"))
                .expect("insert");
        }
        let order: Vec<String> = idx.captures().iter().map(|c| c.id.to_string()).collect();
        assert_eq!(order, vec!["c-300-a", "c-200-b", "c-200-a", "c-100-a"]);
        assert_eq!(idx.group_count(), 1);
    }

    #[test]
    fn test_invalid_timestamp_is_skipped_in_rebuild() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_plain(tmp.path(), "c-100-a", "");
        write_plain(tmp.path(), "c-notatime-a", "");
        let idx = index(tmp.path());

        let stats = idx.rebuild().expect("rebuild");
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.groups, 1);
    }

    #[test]
    fn test_rebuild_missing_root_is_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let idx = index(&tmp.path().join("absent"));
        assert!(matches!(idx.rebuild(), Err(CorpusError::Io(_))));
        assert!(idx.is_empty());
    }

    #[test]
    fn test_group_of_and_capture_lookup() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_plain(tmp.path(), "c-1-a", "panic: x\nsrc/a.zig:1:1\n  f();\n");
        write_plain(tmp.path(), "c-2-a", "panic: y\nsrc/a.zig:1:1\n  f();\n");
        write_plain(tmp.path(), "c-3-a", "nothing");
        let idx = index(tmp.path());
        idx.rebuild().expect("rebuild");

        let group = idx.group_of("c-1-a").expect("group");
        let members: Vec<&str> = group.members.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(members, vec!["c-2-a", "c-1-a"]);
        assert_eq!(group.signature, "In src/a.zig:1:1; `f();`");

        assert!(idx.capture("../c-1-a").is_none());
        assert!(idx.capture("c-9-a").is_none());

        let groups = idx.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members[0].id.as_str(), "c-3-a");
    }
}
