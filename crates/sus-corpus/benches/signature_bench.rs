// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

use std::fs;
use std::io::Write;

use criterion::{Criterion, criterion_group, criterion_main};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use sus_corpus::{CorpusIndex, CorpusOptions, SignatureExtractor, SignatureHash};

/// Server stderr with a long log preamble before the panic
fn sample_stderr() -> String {
    let mut text = "info: (store): workspace folder added\n".repeat(500);
    text.push_str("thread 58211 panic: reached unreachable code\n");
    text.push_str("/work/zls/src/analysis.zig:1187:17: 0x10d2a3b in resolveTypeOfNode (zls)\n");
    text.push_str("                unreachable;\n");
    text.push_str("                ^\n");
    text.push_str(&"???:?:?: 0x7f00 in ??? (???)\n".repeat(20));
    text
}

fn extract_benchmark(c: &mut Criterion) {
    let stderr = sample_stderr();
    let extractor = SignatureExtractor::new("/work/zls");

    c.bench_function("extract_signature", |b| {
        b.iter(|| std::hint::black_box(extractor.extract(&stderr)))
    });

    let extraction = extractor.extract(&stderr);
    c.bench_function("signature_hash", |b| {
        b.iter(|| std::hint::black_box(SignatureHash::of(&extraction.signature)))
    });
}

fn rebuild_benchmark(c: &mut Criterion) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let stderr = sample_stderr();
    for i in 0..100 {
        let dir = tmp.path().join(format!("crash-{}-bench", 1_705_458_786_000u64 + i));
        fs::create_dir_all(&dir).expect("mkdir");
        for name in ["stderr.log", "stdout.log", "stdin.log"] {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(stderr.as_bytes()).expect("compress");
            fs::write(dir.join(name), encoder.finish().expect("finish")).expect("write");
        }
        fs::write(dir.join("info"), "toolchain: 0.12.0\nserver: 0.12.0\n").expect("info");
    }

    let index = CorpusIndex::new(CorpusOptions::new(tmp.path()).with_project_root("/work/zls"));
    c.bench_function("rebuild_100_captures", |b| {
        b.iter(|| std::hint::black_box(index.rebuild().expect("rebuild")))
    });
}

criterion_group!(benches, extract_benchmark, rebuild_benchmark);
criterion_main!(benches);
