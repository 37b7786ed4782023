// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Crash signature extraction
//!
//! A two-stage parser over server stderr: locate the panic marker by substring
//! search, then tokenize the location line into path, line and column.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Substring that starts a panic trace
pub const PANIC_MARKER: &str = "panic:";

/// Signature used when no location can be recovered
pub const NO_SUMMARY: &str = "no summary available";

/// Source file extension recognized on the location line
pub const DEFAULT_SOURCE_EXTENSION: &str = "zig";

// ============================================================================
// Signature hash
// ============================================================================

/// Hex-encoded SHA-256 of a signature string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureHash(String);

impl SignatureHash {
    /// Hash a signature
    #[must_use]
    pub fn of(signature: &str) -> Self {
        Self(hex::encode(Sha256::digest(signature.as_bytes())))
    }

    /// The hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignatureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Source position named by a panic trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashLocation {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    /// Offending statement, trimmed
    pub statement: String,
}

impl CrashLocation {
    /// Render the one-line signature for this location
    #[must_use]
    pub fn signature(&self) -> String {
        format!(
            "In {}:{}:{}; `{}`",
            self.path, self.line, self.column, self.statement
        )
    }
}

/// Result of running the extractor over one stderr text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Text from the first panic marker to the end, if any
    pub panic_trace: Option<String>,
    /// Derived signature or [`NO_SUMMARY`]
    pub signature: String,
    /// Parsed location when one was found
    pub location: Option<CrashLocation>,
}

impl Extraction {
    fn sentinel(panic_trace: Option<String>) -> Self {
        Self {
            panic_trace,
            signature: NO_SUMMARY.to_string(),
            location: None,
        }
    }

    /// Hash of the signature
    #[must_use]
    pub fn signature_hash(&self) -> SignatureHash {
        SignatureHash::of(&self.signature)
    }
}

/// Derives crash signatures from stderr text
#[derive(Debug, Clone)]
pub struct SignatureExtractor {
    project_root: PathBuf,
    source_extension: String,
}

impl SignatureExtractor {
    /// Create an extractor that relativizes paths against `project_root`
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            source_extension: DEFAULT_SOURCE_EXTENSION.to_string(),
        }
    }

    /// Recognize a different source extension (without the dot)
    #[must_use]
    pub fn with_source_extension(mut self, extension: impl Into<String>) -> Self {
        self.source_extension = extension.into();
        self
    }

    /// The project root
    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Extract the panic trace and signature from stderr text
    ///
    /// Never fails: anything unrecognized yields [`NO_SUMMARY`].
    #[must_use]
    pub fn extract(&self, stderr: &str) -> Extraction {
        let Some(start) = stderr.find(PANIC_MARKER) else {
            return Extraction::sentinel(None);
        };
        let trace = &stderr[start..];

        // Nested "thread N panic:" headers may precede the location
        let mut lines = trace.lines().skip(1).skip_while(|l| l.contains(PANIC_MARKER));

        let location = lines
            .next()
            .and_then(|line| parse_location_line(line, &self.source_extension))
            .and_then(|(path, line, column)| {
                let statement = lines.next()?.trim().to_string();
                Some(CrashLocation {
                    path: relative_path(&self.project_root, path),
                    line,
                    column,
                    statement,
                })
            });

        match location {
            Some(location) => Extraction {
                panic_trace: Some(trace.to_string()),
                signature: location.signature(),
                location: Some(location),
            },
            None => Extraction::sentinel(Some(trace.to_string())),
        }
    }
}

impl Default for SignatureExtractor {
    fn default() -> Self {
        Self::new(PathBuf::new())
    }
}

/// Tokenize `<path>.<ext>:<line>:<column>` out of a trace line
///
/// Takes the rightmost `.<ext>:` followed by two non-empty digit runs.
/// Anything after the column is ignored.
#[must_use]
pub fn parse_location_line<'a>(line: &'a str, extension: &str) -> Option<(&'a str, u32, u32)> {
    let needle = format!(".{extension}:");

    line.rmatch_indices(needle.as_str()).find_map(|(at, _)| {
        let path_end = at + needle.len() - 1;
        let path = line[..path_end].trim_start();
        if path.len() <= needle.len() - 1 {
            return None;
        }

        let rest = &line[path_end + 1..];
        let (line_no, rest) = split_digits(rest)?;
        let rest = rest.strip_prefix(':')?;
        let (column, _) = split_digits(rest)?;
        Some((path, line_no, column))
    })
}

fn split_digits(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((s[..end].parse().ok()?, &s[end..]))
}

/// Express `path` relative to `root`, joined with `/`
///
/// Relative paths are kept as written. Absolute paths outside the root
/// climb out with `..`; if the root is not absolute the path is kept.
#[must_use]
pub fn relative_path(root: &Path, path: &str) -> String {
    let target = Path::new(path);
    if !target.is_absolute() || !root.is_absolute() {
        return path.to_string();
    }

    let target: Vec<Component<'_>> = normalized(target);
    let base: Vec<Component<'_>> = normalized(root);
    let shared = target
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = std::iter::repeat_n("..".to_string(), base.len() - shared).collect();
    parts.extend(
        target[shared..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

fn normalized(path: &Path) -> Vec<Component<'_>> {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}
