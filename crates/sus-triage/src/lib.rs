// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! sus-triage library
//!
//! This module exports the core functionality of sus-triage for use in
//! integration tests and as a library.

mod migrations;

pub mod config;
pub mod db;
pub mod ingest;
pub mod queries;
pub mod watch;
