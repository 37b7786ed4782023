// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Crash capture directories
//!
//! The fuzzer saves every crash as a directory under the capture root:
//!
//! ```text
//! saved_logs/
//! └── <prefix>-<created_at_ms>[-<suffix>...]/
//!     ├── stderr.log      # server stderr
//!     ├── stdout.log      # server stdout
//!     ├── stdin.log       # messages sent to the server
//!     ├── info            # "toolchain: <version>" / "server: <version>"
//!     └── principal.zig   # minimized input, served verbatim
//! ```
//!
//! The `.log` members are raw (header-less) DEFLATE streams in current
//! fuzzer builds and plain text in older ones; see [`LogEncoding`].

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use flate2::read::DeflateDecoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CorpusError;

/// Name of the info record inside a capture directory
pub const INFO_FILE: &str = "info";

/// How `.log` member files are stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEncoding {
    /// Header-less DEFLATE
    #[default]
    Deflate,
    /// Uncompressed text
    Plain,
}

/// Member file selector exposed to the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    /// `stderr.log`
    Stderr,
    /// `stdout.log`
    Stdout,
    /// `stdin.log`
    Stdin,
    /// `principal.zig`, the triggering source artifact
    Principal,
}

impl MemberKind {
    /// Every selectable kind
    pub const ALL: [MemberKind; 4] = [Self::Stderr, Self::Stdout, Self::Stdin, Self::Principal];

    /// Selector name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stderr => "stderr",
            Self::Stdout => "stdout",
            Self::Stdin => "stdin",
            Self::Principal => "principal",
        }
    }

    /// File name inside the capture directory
    #[must_use]
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Stderr => "stderr.log",
            Self::Stdout => "stdout.log",
            Self::Stdin => "stdin.log",
            Self::Principal => "principal.zig",
        }
    }

    /// Whether the member is a log subject to [`LogEncoding`]
    #[must_use]
    pub fn is_log(&self) -> bool {
        !matches!(self, Self::Principal)
    }
}

impl FromStr for MemberKind {
    type Err = CorpusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CorpusError::UnknownKind {
                kind: s.to_string(),
            })
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated capture directory name
///
/// Always a single path segment, so joining it onto the capture root can
/// never escape the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CaptureId(String);

impl CaptureId {
    /// Validate a directory name
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::InvalidCaptureId` for empty names, `.`/`..`,
    /// and anything containing a path separator or NUL.
    pub fn parse(raw: &str) -> Result<Self, CorpusError> {
        let plain = !raw.is_empty()
            && raw != "."
            && raw != ".."
            && !raw.contains(['/', '\\', '\0'])
            && !raw.contains(':');
        if plain {
            Ok(Self(raw.to_string()))
        } else {
            Err(CorpusError::InvalidCaptureId { id: raw.to_string() })
        }
    }

    /// The directory name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time embedded as the second hyphen-delimited field
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::InvalidTimestamp` if the field is missing, not an
    /// integer, or out of range.
    pub fn created_at(&self) -> Result<DateTime<Utc>, CorpusError> {
        self.0
            .split('-')
            .nth(1)
            .and_then(|field| field.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| CorpusError::InvalidTimestamp { id: self.0.clone() })
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CaptureId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Versions recorded in a capture's info file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureInfo {
    /// Toolchain version
    pub toolchain_version: String,
    /// Language server version
    pub server_version: String,
}

impl CaptureInfo {
    /// Parse the line-oriented info record
    ///
    /// Unknown lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::MalformedInfo` if either version line is missing.
    pub fn parse(id: &CaptureId, text: &str) -> Result<Self, CorpusError> {
        let mut toolchain = None;
        let mut server = None;

        for line in text.lines() {
            if let Some((key, value)) = line.split_once(':') {
                match key.trim() {
                    "toolchain" => toolchain = Some(value.trim().to_string()),
                    "server" => server = Some(value.trim().to_string()),
                    _ => {}
                }
            }
        }

        let missing = |key| CorpusError::MalformedInfo {
            id: id.to_string(),
            key,
        };
        Ok(Self {
            toolchain_version: toolchain.ok_or_else(|| missing("toolchain"))?,
            server_version: server.ok_or_else(|| missing("server"))?,
        })
    }
}

/// Decoded contents of one capture directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCapture {
    /// Capture id
    pub id: CaptureId,
    /// Versions from the info record
    pub info: CaptureInfo,
    /// Decompressed server stderr
    pub stderr: String,
    /// Decompressed server stdout
    pub stdout: String,
    /// Decompressed server stdin
    pub stdin: String,
}

/// Reads capture directories under one root
#[derive(Debug, Clone)]
pub struct CaptureReader {
    root: PathBuf,
    encoding: LogEncoding,
}

impl CaptureReader {
    /// Create a reader for the given capture root
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, encoding: LogEncoding) -> Self {
        Self {
            root: root.into(),
            encoding,
        }
    }

    /// The capture root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configured log encoding
    #[must_use]
    pub fn encoding(&self) -> LogEncoding {
        self.encoding
    }

    /// List every capture directory under the root
    ///
    /// Entries that are not directories or not valid ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::Io` if the root cannot be listed.
    pub fn list(&self) -> Result<Vec<CaptureId>, CorpusError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(CaptureId::parse) {
                Some(Ok(id)) => ids.push(id),
                _ => debug!(name = ?name, "Skipping entry that is not a capture id"),
            }
        }
        Ok(ids)
    }

    /// Read and decompress a capture's logs and info record
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::CaptureNotFound` or `CorpusError::MemberNotFound`
    /// when the directory or a required file is absent.
    pub fn read(&self, id: &CaptureId) -> Result<RawCapture, CorpusError> {
        let info_text = self.read_file(id, INFO_FILE)?;
        let info = CaptureInfo::parse(id, &String::from_utf8_lossy(&info_text))?;

        Ok(RawCapture {
            id: id.clone(),
            info,
            stderr: self.read_text(id, MemberKind::Stderr)?,
            stdout: self.read_text(id, MemberKind::Stdout)?,
            stdin: self.read_text(id, MemberKind::Stdin)?,
        })
    }

    /// Open a member file as a byte stream
    ///
    /// Log members are decompressed on the fly; the principal is verbatim.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the capture or member is absent.
    pub fn open_member(
        &self,
        id: &CaptureId,
        kind: MemberKind,
    ) -> Result<Box<dyn Read + Send>, CorpusError> {
        let file = BufReader::new(self.open_file(id, kind.file_name())?);
        if kind.is_log() && self.encoding == LogEncoding::Deflate {
            Ok(Box::new(DeflateDecoder::new(file)))
        } else {
            Ok(Box::new(file))
        }
    }

    /// Read a whole member file
    ///
    /// # Errors
    ///
    /// See [`CaptureReader::open_member`]; corrupt compressed data yields
    /// `CorpusError::MemberRead`.
    pub fn read_member(&self, id: &CaptureId, kind: MemberKind) -> Result<Vec<u8>, CorpusError> {
        let mut reader = self.open_member(id, kind)?;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|source| CorpusError::MemberRead {
                id: id.to_string(),
                file: kind.file_name(),
                source,
            })?;
        Ok(bytes)
    }

    fn read_text(&self, id: &CaptureId, kind: MemberKind) -> Result<String, CorpusError> {
        let bytes = self.read_member(id, kind)?;
        Ok(String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }

    fn read_file(&self, id: &CaptureId, file: &'static str) -> Result<Vec<u8>, CorpusError> {
        let mut bytes = Vec::new();
        self.open_file(id, file)?
            .read_to_end(&mut bytes)
            .map_err(|source| CorpusError::MemberRead {
                id: id.to_string(),
                file,
                source,
            })?;
        Ok(bytes)
    }

    fn open_file(&self, id: &CaptureId, file: &'static str) -> Result<File, CorpusError> {
        let dir = self.root.join(id.as_str());
        if !dir.is_dir() {
            return Err(CorpusError::CaptureNotFound { id: id.to_string() });
        }
        File::open(dir.join(file)).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => CorpusError::MemberNotFound {
                id: id.to_string(),
                file,
            },
            _ => CorpusError::MemberRead {
                id: id.to_string(),
                file,
                source,
            },
        })
    }
}
