// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Fuzz target for the frame reassembler
//!
//! The first byte picks a chunk size; the rest is fed as raw stream bytes.
//! The reassembler must never panic and never emit more bytes than it was given.

#![no_main]

use libfuzzer_sys::fuzz_target;

use sus_stream::{BoundaryMode, FrameReassembler};

fuzz_target!(|data: &[u8]| {
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    let chunk_size = usize::from(first % 32) + 1;
    let mode = if first & 0x80 == 0 {
        BoundaryMode::Continuous
    } else {
        BoundaryMode::SingleBoundary
    };

    let mut reassembler = FrameReassembler::with_mode(mode).with_max_frame_len(1 << 16);
    let mut emitted = 0usize;
    for chunk in rest.chunks(chunk_size) {
        match reassembler.push(chunk) {
            Ok(frames) => emitted += frames.iter().map(Vec::len).sum::<usize>(),
            Err(_) => break,
        }
    }
    assert!(emitted <= rest.len());

    // Finish should never panic
    let _ = reassembler.finish();
});
