// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Live-stream ingestion
//!
//! Pumps a byte source (the fuzzer's stdout pipe) through an [`EventStream`]
//! and stores every decoded event, in decode order.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//! use sus_triage::db::Database;
//! use sus_triage::ingest::StreamIngestor;
//! use sus_stream::StreamOptions;
//!
//! # async fn demo() {
//! let mut db = Database::in_memory().expect("create db");
//! db.initialize().expect("init");
//! let ingestor = StreamIngestor::new(Arc::new(Mutex::new(db)), StreamOptions::default());
//!
//! let stats = ingestor.ingest(tokio::io::stdin()).await.expect("ingest");
//! println!("Stored {} events", stats.stored);
//! # }
//! ```

use std::sync::Arc;

use serde::Serialize;
use sus_stream::{EventStream, StreamError, StreamOptions, StreamStats};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::db::{Database, DbError};

/// Read size for the stream source
pub const READ_CHUNK_LEN: usize = 8 * 1024;

// ============================================================================
// Error Types
// ============================================================================

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Fatal framing error; the producer must be restarted to resynchronize
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Reading the source failed
    #[error("Stream read failed: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics from one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Decoder counters
    #[serde(flatten)]
    pub stream: StreamStats,
    /// Events written to the database
    pub stored: u64,
    /// Bytes of an unfinished frame when the source closed
    pub incomplete_bytes: u64,
}

// ============================================================================
// Ingestor
// ============================================================================

/// Stores events decoded from a live byte stream
#[derive(Clone)]
pub struct StreamIngestor {
    db: Arc<Mutex<Database>>,
    options: StreamOptions,
}

impl StreamIngestor {
    /// Create an ingestor writing into `db`
    #[must_use]
    pub fn new(db: Arc<Mutex<Database>>, options: StreamOptions) -> Self {
        Self { db, options }
    }

    /// Decoder settings
    #[must_use]
    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Read `source` to the end, storing events as their frames complete
    ///
    /// A source that closes mid-frame is logged with the bytes still owed and
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Stream` on a framing violation, which ends the
    /// run; events decoded before it are kept.
    pub async fn ingest<R>(&self, mut source: R) -> Result<IngestStats, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        let mut stream = EventStream::new(self.options);
        let mut buf = vec![0u8; READ_CHUNK_LEN];
        let mut stored = 0u64;

        info!(
            revision = self.options.revision.as_str(),
            mode = self.options.boundary_mode.as_str(),
            "Starting live stream ingestion"
        );

        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            let events = stream.feed(&buf[..n]).inspect_err(|e| {
                error!(error = %e, stored, "Live stream ingestion aborted");
            })?;
            if events.is_empty() {
                continue;
            }

            let ids = self.db.lock().await.insert_events_batch(&events)?;
            stored += ids.len() as u64;
            debug!(count = ids.len(), stored, "Stored events");
        }

        let stream_stats = stream.stats().clone();
        let incomplete_bytes = match stream.finish() {
            Ok(_) => 0,
            Err(StreamError::IncompleteFrame { owed }) => {
                warn!(owed, "Stream closed mid-frame, partial frame discarded");
                owed as u64
            }
            Err(e) => return Err(e.into()),
        };

        let stats = IngestStats {
            stream: stream_stats,
            stored,
            incomplete_bytes,
        };
        info!(
            frames = stats.stream.frames,
            stored = stats.stored,
            decode_errors = stats.stream.decode_errors,
            "Live stream closed"
        );
        Ok(stats)
    }
}
