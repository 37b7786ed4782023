// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Database module for sus-triage
//!
//! SQLite storage for decoded live-stream events. Crash captures are not
//! stored here; the corpus index is rebuilt from disk on every start.

use std::cmp::Ordering;
use std::path::Path;

use chrono::{TimeZone, Utc};
use rusqlite::{Connection, Row, params};
use serde::Serialize;
use sus_stream::FuzzEvent;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::migrations;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] migrations::MigrationError),

    /// Schema missing or out of date
    #[error("Event store has no schema; run without --skip-init once")]
    NotInitialized,
}

/// A stored live-stream event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    /// Row id (UUID v4)
    pub event_id: String,
    /// RFC 3339 time the event was stored
    pub received_at: String,
    /// The decoded event
    #[serde(flatten)]
    pub event: FuzzEvent,
}

/// Event store over one SQLite connection
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the event store `config` selects and bring its schema up to date
    ///
    /// With `--skip-init` the schema is left untouched; data methods then
    /// fail on a store that is missing its schema or is from a newer build.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened, a schema step fails,
    /// or the store was written by a newer build.
    pub fn open_configured(config: &Config) -> Result<Self, DbError> {
        let mut db = if config.in_memory {
            Self::in_memory()?
        } else {
            Self::open(&config.database_path())?
        };

        if config.skip_init {
            debug!("Skipping schema upgrade");
        } else {
            if !db.is_initialized() {
                info!("Upgrading event store schema");
            }
            db.initialize()?;
        }
        Ok(db)
    }

    /// Event store that lives only as long as the process
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the connection.
    pub fn in_memory() -> Result<Self, DbError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Event store backed by the file at `path`, created if missing
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot open or create the file.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    /// Apply any pending schema steps
    ///
    /// # Errors
    ///
    /// Returns an error if a step fails or the file is from a newer build.
    pub fn initialize(&mut self) -> Result<(), DbError> {
        migrations::upgrade(&mut self.conn)?;
        Ok(())
    }

    /// Whether the schema is at the latest version
    pub fn is_initialized(&self) -> bool {
        migrations::is_current(&self.conn)
    }

    /// Schema version stamped in the store
    ///
    /// # Errors
    ///
    /// Returns an error if the bookkeeping table cannot be read.
    pub fn schema_version(&self) -> Result<i32, DbError> {
        Ok(migrations::stored_version(&self.conn)?)
    }

    /// Raw connection, for ad-hoc SQL
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn ensure_initialized(&self) -> Result<(), DbError> {
        let found = migrations::stored_version(&self.conn)?;
        match found.cmp(&migrations::LATEST_VERSION) {
            Ordering::Equal => Ok(()),
            Ordering::Less => Err(DbError::NotInitialized),
            Ordering::Greater => Err(migrations::MigrationError::TooNew {
                found,
                supported: migrations::LATEST_VERSION,
            }
            .into()),
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Store one event and return its id
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_event(&self, event: &FuzzEvent) -> Result<String, DbError> {
        self.ensure_initialized()?;
        insert_row(&self.conn, event)
    }

    /// Store events in one transaction, preserving their order
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is stored in that case.
    pub fn insert_events_batch(&mut self, events: &[FuzzEvent]) -> Result<Vec<String>, DbError> {
        self.ensure_initialized()?;
        let tx = self.conn.transaction()?;
        let ids = events
            .iter()
            .map(|event| insert_row(&tx, event))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;
        Ok(ids)
    }

    /// Most recent events by timestamp, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the select fails.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>, DbError> {
        self.ensure_initialized()?;
        let mut stmt = self.conn.prepare(
            r#"
            SELECT event_id, timestamp_ms, toolchain_version, server_version,
                   principal, message, stderr, received_at
            FROM fuzz_events
            ORDER BY timestamp_ms DESC, rowid DESC
            LIMIT ?
            "#,
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map([limit], event_from_row)?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Number of stored events
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    pub fn count(&self) -> Result<i64, DbError> {
        self.ensure_initialized()?;
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM fuzz_events", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn insert_row(conn: &Connection, event: &FuzzEvent) -> Result<String, DbError> {
    let event_id = Uuid::new_v4().to_string();
    conn.prepare_cached(
        r#"
        INSERT INTO fuzz_events
            (event_id, timestamp_ms, toolchain_version, server_version,
             principal, message, stderr, received_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )?
    .execute(params![
        event_id,
        event.timestamp.timestamp_millis(),
        event.toolchain_version,
        event.server_version,
        event.principal,
        event.message,
        event.stderr,
        Utc::now().to_rfc3339(),
    ])?;
    Ok(event_id)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let millis: i64 = row.get(1)?;
    let timestamp = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(1, millis))?;

    Ok(EventRecord {
        event_id: row.get(0)?,
        received_at: row.get(7)?,
        event: FuzzEvent {
            timestamp,
            toolchain_version: row.get(2)?,
            server_version: row.get(3)?,
            principal: row.get(4)?,
            message: row.get(5)?,
            stderr: row.get(6)?,
        },
    })
}
