// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! sus-triage: crash report ingestion and deduplication for a fuzzing harness
//!
//! Stores events from the fuzzer's live stream in SQLite and keeps a
//! deduplicated index of the crash captures it saves on disk.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use sus_corpus::{CaptureId, CorpusIndex};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use sus_triage::config::{Command, Config};
use sus_triage::db::Database;
use sus_triage::ingest::StreamIngestor;
use sus_triage::queries;
use sus_triage::watch::{CaptureUpdater, NOTIFICATION_CHANNEL_CAPACITY, PollingNotifier};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Logs go to stderr; stdout carries query output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_level().into()),
        )
        .init();

    config.validate()?;
    debug!(?config, "Configuration loaded");

    match config.subcommand() {
        Command::Run => run(&config).await,
        Command::IngestStream => ingest_stream(&config).await,
        Command::Captures => {
            let index = load_index(&config).await?;
            print_json(&queries::list_captures(&index))
        }
        Command::Groups => {
            let index = load_index(&config).await?;
            print_json(&queries::list_groups(&index))
        }
        Command::Capture { id } => {
            let index = load_index(&config).await?;
            match queries::capture_detail(&index, &id) {
                Some(detail) => print_json(&detail),
                None => bail!("Capture not found: {id}"),
            }
        }
        Command::Show { id, kind } => show(&config, &id, &kind).await,
        Command::Events { limit } => {
            let db = open_database(&config)?;
            print_json(&queries::recent_events(&db, limit)?)
        }
    }
}

fn open_database(config: &Config) -> Result<Database> {
    Database::open_configured(config).with_context(|| {
        if config.in_memory {
            "Failed to open in-memory event store".to_string()
        } else {
            format!("Failed to open event store {}", config.database_path().display())
        }
    })
}

async fn load_index(config: &Config) -> Result<Arc<CorpusIndex>> {
    let index = Arc::new(CorpusIndex::new(config.corpus_options()));
    let rebuild = Arc::clone(&index);
    tokio::task::spawn_blocking(move || rebuild.rebuild())
        .await?
        .context("Failed to index capture directory")?;
    Ok(index)
}

async fn ingest_stream(config: &Config) -> Result<()> {
    let db = Arc::new(Mutex::new(open_database(config)?));
    let ingestor = StreamIngestor::new(db, config.stream_options());
    let stats = ingestor.ingest(tokio::io::stdin()).await?;
    print_json(&stats)
}

async fn show(config: &Config, id: &str, kind: &str) -> Result<()> {
    let index = Arc::new(CorpusIndex::new(config.corpus_options()));

    // Index only the requested capture
    if let Ok(capture) = CaptureId::parse(id) {
        let insert = Arc::clone(&index);
        if let Err(e) = tokio::task::spawn_blocking(move || insert.insert_incremental(&capture)).await? {
            debug!(capture = id, error = %e, "Capture not indexed");
        }
    }

    let bytes = tokio::task::spawn_blocking({
        let index = Arc::clone(&index);
        let (id, kind) = (id.to_string(), kind.to_string());
        move || index.member(&id, &kind)
    })
    .await?;

    match bytes {
        Some(bytes) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
            Ok(())
        }
        None => bail!("Not found: {kind} of capture {id}"),
    }
}

async fn run(config: &Config) -> Result<()> {
    info!("Starting sus-triage");

    let db = Arc::new(Mutex::new(open_database(config)?));
    let index = load_index(config).await?;
    info!(
        captures = index.len(),
        groups = index.group_count(),
        "Crash index ready"
    );

    let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let updater = tokio::spawn(CaptureUpdater::new(Arc::clone(&index)).run(notify_rx));
    let notifier = tokio::spawn(
        PollingNotifier::new(Arc::clone(&index), config.poll_interval()).run(notify_tx, shutdown_rx),
    );

    let ingestor = StreamIngestor::new(Arc::clone(&db), config.stream_options());
    let ingest = tokio::spawn(async move {
        match ingestor.ingest(tokio::io::stdin()).await {
            Ok(stats) => info!(stored = stats.stored, "Live stream finished"),
            Err(e) => error!(error = %e, "Live stream stopped"),
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    ingest.abort();
    if shutdown_tx.send(true).is_err() {
        warn!("Notifier already stopped");
    }
    notifier.await?;
    let stats = updater.await?;
    info!(
        indexed = stats.indexed,
        failed = stats.failed,
        captures = index.len(),
        groups = index.group_count(),
        "Stopped"
    );
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
