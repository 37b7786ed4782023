// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sus_stream::{EventCodec, EventStream, FuzzEvent, ProtocolRevision, StreamOptions, encode_frame};

/// Build a stream of `count` framed events
fn sample_stream(count: usize) -> Vec<u8> {
    let codec = EventCodec::new(ProtocolRevision::WithPrincipal);
    (0..count)
        .flat_map(|i| {
            let event = FuzzEvent {
                timestamp: Utc
                    .timestamp_millis_opt(1_705_458_786_000 + i as i64)
                    .single()
                    .expect("timestamp"),
                toolchain_version: "0.12.0-dev.2063+804cee3b9".to_string(),
                server_version: "0.12.0-dev.337+24f0bb2".to_string(),
                principal: Some(format!("const x{i} = @import(\"std\");")),
                message: format!(
                    r#"{{"jsonrpc":"2.0","id":{i},"method":"textDocument/completion"}}"#
                ),
                stderr: "info: zls started\n".repeat(8),
            };
            encode_frame(&codec.encode(&event).expect("encode")).expect("frame")
        })
        .collect()
}

fn stream_benchmark(c: &mut Criterion) {
    let bytes = sample_stream(1_000);
    let mut group = c.benchmark_group("event_stream");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    for chunk_size in [64usize, 4096, 65536] {
        group.bench_with_input(
            BenchmarkId::new("feed", chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut stream = EventStream::new(StreamOptions::default());
                    let mut events = 0;
                    for chunk in bytes.chunks(chunk_size) {
                        events += stream.feed(chunk).expect("feed").len();
                    }
                    std::hint::black_box(events)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, stream_benchmark);
criterion_main!(benches);
