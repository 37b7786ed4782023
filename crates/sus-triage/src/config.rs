// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Configuration for sus-triage
//!
//! Command-line flags with environment fallbacks for the event database, the
//! crash-capture root, the live-stream decoder and logging.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use sus_corpus::{CorpusOptions, LogEncoding};
use sus_stream::{ProtocolRevision, StreamOptions};

pub use sus_stream::framing::DEFAULT_MAX_FRAME_LEN;

/// Default period of the polling notification source
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default number of events listed by `events`
pub const DEFAULT_EVENT_LIMIT: usize = 50;

/// sus-triage - crash report ingestion and deduplication for a fuzzing harness
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "sus-triage")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Subcommand to run (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to SQLite database file for decoded live events
    ///
    /// Created and initialized if it does not exist.
    /// Defaults to <data dir>/sus-triage/events.db.
    #[arg(short, long, env = "SUS_TRIAGE_DATABASE")]
    pub database: Option<PathBuf>,

    /// Keep decoded live events in an in-memory database
    #[arg(long, default_value = "false", conflicts_with = "database")]
    pub in_memory: bool,

    /// Directory the fuzzer saves crash captures into
    #[arg(short, long, env = "SUS_TRIAGE_SAVED_LOGS")]
    pub saved_logs: Option<PathBuf>,

    /// Root that crash signature paths are made relative to
    ///
    /// Unset means the directory the tool was started in.
    #[arg(short, long, env = "SUS_TRIAGE_PROJECT_ROOT")]
    pub project_root: Option<PathBuf>,

    /// Encoding of capture log files
    #[arg(long, value_enum, default_value_t)]
    pub log_encoding: EncodingArg,

    /// Live-stream payload layout of the connected fuzzer
    #[arg(long, value_enum, default_value_t)]
    pub protocol: ProtocolArg,

    /// Largest frame length a live-stream prefix may declare, in bytes
    #[arg(long)]
    pub max_frame_len: Option<u32>,

    /// How often the capture directory is polled for new captures
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Log at debug level
    ///
    /// Logs are written to stderr so stdout stays usable for query output.
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,

    /// Log warnings and errors only
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use the event store as-is, without applying schema steps
    #[arg(long, default_value = "false")]
    pub skip_init: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ingest the live stream from stdin while keeping the crash index current
    ///
    /// Runs until Ctrl-C.
    Run,

    /// Ingest the live stream from stdin and print ingestion stats
    ///
    /// Example:
    ///   fuzzer --stream | sus-triage ingest-stream
    IngestStream,

    /// List crash captures, newest first
    Captures,

    /// List crash groups with their member captures
    Groups,

    /// Show one capture with its panic trace and related captures
    Capture {
        /// Capture directory name
        id: String,
    },

    /// Print one member file of a capture
    Show {
        /// Capture directory name
        id: String,
        /// One of stderr, stdout, stdin, principal
        kind: String,
    },

    /// List stored live events, newest first
    Events {
        /// Maximum events to print
        #[arg(short, long, default_value_t = DEFAULT_EVENT_LIMIT)]
        limit: usize,
    },
}

impl Command {
    /// Whether the command reads the crash-capture directory
    #[must_use]
    pub fn uses_corpus(&self) -> bool {
        !matches!(self, Self::IngestStream | Self::Events { .. })
    }

    /// Whether the command stores or reads live events
    #[must_use]
    pub fn uses_database(&self) -> bool {
        matches!(self, Self::Run | Self::IngestStream | Self::Events { .. })
    }
}

/// Capture log encoding flag
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingArg {
    /// Header-less DEFLATE
    #[default]
    Deflate,
    /// Uncompressed text
    Plain,
}

impl From<EncodingArg> for LogEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Deflate => LogEncoding::Deflate,
            EncodingArg::Plain => LogEncoding::Plain,
        }
    }
}

/// Live-stream protocol flag
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolArg {
    /// Frames carry a principal field
    #[default]
    WithPrincipal,
    /// Frames predate the principal field
    Initial,
}

impl From<ProtocolArg> for ProtocolRevision {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::WithPrincipal => ProtocolRevision::WithPrincipal,
            ProtocolArg::Initial => ProtocolRevision::Initial,
        }
    }
}

impl Config {
    /// The subcommand, defaulting to `run`
    #[must_use]
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Event store location, falling back to the per-user data directory
    ///
    /// The fallback is:
    /// - macOS: ~/Library/Application Support/sus-triage/events.db
    /// - Linux: ~/.local/share/sus-triage/events.db
    /// - Windows: %LOCALAPPDATA%\sus-triage\events.db
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sus-triage")
                .join("events.db")
        })
    }

    /// Crash-capture root, `saved_logs` by default
    #[must_use]
    pub fn saved_logs_path(&self) -> PathBuf {
        self.saved_logs
            .clone()
            .unwrap_or_else(|| PathBuf::from("saved_logs"))
    }

    /// Absolute project root, the current directory by default
    ///
    /// Returns `None` if no root is given and the current directory cannot
    /// be determined.
    #[must_use]
    pub fn project_root_path(&self) -> Option<PathBuf> {
        self.project_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .map(|root| std::path::absolute(&root).unwrap_or(root))
    }

    /// Frame length limit
    #[must_use]
    pub fn max_frame_len(&self) -> u32 {
        self.max_frame_len.unwrap_or(DEFAULT_MAX_FRAME_LEN)
    }

    /// Polling period
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    /// Decoder settings for the live stream
    #[must_use]
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions::for_revision(self.protocol.into()).with_max_frame_len(self.max_frame_len())
    }

    /// Index settings for the crash-capture root
    #[must_use]
    pub fn corpus_options(&self) -> CorpusOptions {
        let options =
            CorpusOptions::new(self.saved_logs_path()).with_encoding(self.log_encoding.into());
        match self.project_root_path() {
            Some(root) => options.with_project_root(root),
            None => options,
        }
    }

    /// Check paths and limits before any work starts
    ///
    /// `run` creates a missing capture root, since the fuzzer may not have
    /// saved anything yet.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The project root is specified but doesn't exist
    /// - The capture root is needed but missing or not a directory
    /// - The event store's parent directory cannot be created
    /// - The frame length limit or poll interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let command = self.subcommand();

        if let Some(ref root) = self.project_root
            && !root.is_dir()
        {
            return Err(ConfigError::ProjectRootNotFound(root.clone()));
        }

        if self.max_frame_len == Some(0) {
            return Err(ConfigError::InvalidValue("max-frame-len must be positive"));
        }
        if self.poll_interval_ms == Some(0) {
            return Err(ConfigError::InvalidValue("poll-interval-ms must be positive"));
        }

        if command.uses_corpus() {
            let saved_logs = self.saved_logs_path();
            if !saved_logs.exists() && command == Command::Run {
                std::fs::create_dir_all(&saved_logs)
                    .map_err(|e| ConfigError::DirectoryCreateFailed(saved_logs.clone(), e))?;
            }
            check_dir(&saved_logs)?;
        }

        if command.uses_database() && !self.in_memory {
            let db_path = self.database_path();
            if let Some(parent) = db_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::DirectoryCreateFailed(parent.to_path_buf(), e))?;
            }
        }

        Ok(())
    }

    /// Default tracing level from `--verbose` / `--quiet`
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        }
    }
}

fn check_dir(path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::SavedLogsNotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(ConfigError::SavedLogsNotDirectory(path.to_path_buf()));
    }
    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Capture root not found
    #[error("Capture directory not found: {0}")]
    SavedLogsNotFound(PathBuf),

    /// Capture root is not a directory
    #[error("Capture directory is not a directory: {0}")]
    SavedLogsNotDirectory(PathBuf),

    /// Project root not found
    #[error("Project root not found: {0}")]
    ProjectRootNotFound(PathBuf),

    /// Failed to create a directory
    #[error("Failed to create directory {0}: {1}")]
    DirectoryCreateFailed(PathBuf, std::io::Error),

    /// Out-of-range flag value
    #[error("Invalid configuration: {0}")]
    InvalidValue(&'static str),
}
