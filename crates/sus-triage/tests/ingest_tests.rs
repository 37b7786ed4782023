// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Live-stream ingestion tests
//!
//! Feed framed events through an in-memory duplex pipe, the way the fuzzer's
//! stdout delivers them, and check what reaches the database.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use similar_asserts::assert_eq;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use sus_stream::{
    EventCodec, FuzzEvent, ProtocolRevision, StreamError, StreamOptions, encode_frame,
};
use sus_triage::db::Database;
use sus_triage::ingest::{IngestError, StreamIngestor};

fn event(n: i64, revision: ProtocolRevision) -> FuzzEvent {
    FuzzEvent {
        timestamp: Utc
            .timestamp_millis_opt(1_705_458_786_000 + n)
            .single()
            .expect("timestamp"),
        toolchain_version: "0.12.0-dev.2063+804cee3b9".to_string(),
        server_version: "0.12.0-dev.337+24f0bb2".to_string(),
        principal: revision
            .has_principal()
            .then(|| format!("const x{n} = 1;")),
        message: format!(r#"{{"jsonrpc":"2.0","id":{n}}}"#),
        stderr: format!("info: request {n}\n"),
    }
}

fn wire(events: &[FuzzEvent], revision: ProtocolRevision) -> Vec<u8> {
    let codec = EventCodec::new(revision);
    events
        .iter()
        .flat_map(|e| encode_frame(&codec.encode(e).expect("encode")).expect("frame"))
        .collect()
}

fn setup(revision: ProtocolRevision) -> (Arc<Mutex<Database>>, StreamIngestor) {
    let mut db = Database::in_memory().expect("db");
    db.initialize().expect("init");
    let db = Arc::new(Mutex::new(db));
    let ingestor = StreamIngestor::new(Arc::clone(&db), StreamOptions::for_revision(revision));
    (db, ingestor)
}

#[tokio::test]
async fn test_events_stored_in_decode_order() {
    let revision = ProtocolRevision::WithPrincipal;
    let (db, ingestor) = setup(revision);
    let events: Vec<FuzzEvent> = (0..20).map(|n| event(n, revision)).collect();
    let bytes = wire(&events, revision);

    let (mut writer, reader) = tokio::io::duplex(64);
    let task = tokio::spawn(async move { ingestor.ingest(reader).await });

    // Odd-sized writes so frames straddle reads
    for chunk in bytes.chunks(37) {
        writer.write_all(chunk).await.expect("write");
    }
    drop(writer);

    let stats = task.await.expect("join").expect("ingest");
    assert_eq!(stats.stored, 20);
    assert_eq!(stats.stream.frames, 20);
    assert_eq!(stats.stream.decode_errors, 0);
    assert_eq!(stats.incomplete_bytes, 0);

    let db = db.lock().await;
    assert_eq!(db.count().expect("count"), 20);
    let stored: Vec<FuzzEvent> = db
        .recent_events(100)
        .expect("recent")
        .into_iter()
        .map(|r| r.event)
        .rev()
        .collect();
    assert_eq!(stored, events);
}

#[tokio::test]
async fn test_initial_revision_without_principal() {
    let revision = ProtocolRevision::Initial;
    let (db, ingestor) = setup(revision);
    let events: Vec<FuzzEvent> = (0..3).map(|n| event(n, revision)).collect();

    let stats = ingestor
        .ingest(&wire(&events, revision)[..])
        .await
        .expect("ingest");
    assert_eq!(stats.stored, 3);

    let stored = db.lock().await.recent_events(10).expect("recent");
    assert!(stored.iter().all(|r| r.event.principal.is_none()));
}

#[tokio::test]
async fn test_stream_closed_mid_frame_keeps_completed_events() {
    let revision = ProtocolRevision::WithPrincipal;
    let (db, ingestor) = setup(revision);
    let mut bytes = wire(&[event(1, revision)], revision);

    // Declares 100 bytes, only 40 arrive
    bytes.extend_from_slice(&100u32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 40]);

    let stats = ingestor.ingest(&bytes[..]).await.expect("ingest");
    assert_eq!(stats.stored, 1);
    assert_eq!(stats.incomplete_bytes, 60);
    assert_eq!(db.lock().await.count().expect("count"), 1);
}

#[tokio::test]
async fn test_undecodable_frame_is_skipped() {
    let revision = ProtocolRevision::WithPrincipal;
    let (db, ingestor) = setup(revision);
    let mut bytes = wire(&[event(1, revision)], revision);
    bytes.extend(encode_frame(&[0xff; 9]).expect("frame"));
    bytes.extend(wire(&[event(2, revision)], revision));

    let stats = ingestor.ingest(&bytes[..]).await.expect("ingest");
    assert_eq!(stats.stored, 2);
    assert_eq!(stats.stream.decode_errors, 1);
    assert_eq!(db.lock().await.count().expect("count"), 2);
}

#[tokio::test]
async fn test_framing_violation_aborts_ingestion() {
    let mut db = Database::in_memory().expect("db");
    db.initialize().expect("init");
    let db = Arc::new(Mutex::new(db));
    let options = StreamOptions::default().with_max_frame_len(1024);
    let ingestor = StreamIngestor::new(Arc::clone(&db), options);

    let mut bytes = wire(&[event(1, ProtocolRevision::WithPrincipal)], ProtocolRevision::WithPrincipal);
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(b"trailing");

    let err = ingestor.ingest(&bytes[..]).await.expect_err("violation");
    assert!(matches!(
        err,
        IngestError::Stream(StreamError::FramingViolation { .. })
    ));
    // Events completed in the same read as the violation are not stored
    assert_eq!(db.lock().await.count().expect("count"), 0);
}
