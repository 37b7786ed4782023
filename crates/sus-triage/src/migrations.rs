// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Versioned schema for the event store
//!
//! Steps apply in ascending order, each inside its own transaction, and
//! leave a row in `schema_migrations`. A store stamped with a version this
//! build does not know is refused rather than downgraded.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Schema errors
#[derive(Debug, Error)]
pub enum MigrationError {
    /// SQLite error while reading or applying a step
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Store was written by a newer build
    #[error("Schema version {found} is newer than supported version {supported}")]
    TooNew {
        /// Version stamped in the store
        found: i32,
        /// Highest version this build applies
        supported: i32,
    },
}

/// Highest schema version this build applies
pub const LATEST_VERSION: i32 = 1;

/// One schema step
pub struct SchemaStep {
    /// Version the store reaches after this step
    pub version: i32,
    /// Label recorded alongside the version
    pub name: &'static str,
    /// Statements to execute
    pub sql: &'static str,
}

/// Every step, oldest first
pub static STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    name: "fuzz_events",
    sql: include_str!("schema.sql"),
}];

/// Version the store is at, 0 for a fresh store
///
/// # Errors
///
/// Returns an error if the bookkeeping table cannot be read.
pub fn stored_version(conn: &Connection) -> Result<i32, MigrationError> {
    let has_table = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !has_table {
        return Ok(0);
    }

    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Bring the store up to [`LATEST_VERSION`], returning the versions applied
///
/// # Errors
///
/// Returns an error if a step fails or the store is newer than this build.
pub fn upgrade(conn: &mut Connection) -> Result<Vec<i32>, MigrationError> {
    let found = stored_version(conn)?;
    if found > LATEST_VERSION {
        return Err(MigrationError::TooNew {
            found,
            supported: LATEST_VERSION,
        });
    }

    STEPS
        .iter()
        .filter(|step| step.version > found)
        .map(|step| run_step(conn, step).map(|()| step.version))
        .collect()
}

fn run_step(conn: &mut Connection, step: &SchemaStep) -> Result<(), MigrationError> {
    let tx = conn.transaction()?;
    tx.execute_batch(step.sql)?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![step.version, step.name, Utc::now().to_rfc3339()],
    )?;
    tx.commit()?;
    Ok(())
}

/// Whether the store is exactly at [`LATEST_VERSION`]
///
/// A store from a newer build is not current; [`upgrade`] refuses it.
#[must_use]
pub fn is_current(conn: &Connection) -> bool {
    matches!(stored_version(conn), Ok(LATEST_VERSION))
}
