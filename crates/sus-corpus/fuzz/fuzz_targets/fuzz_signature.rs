// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Fuzz target for the signature extractor
//!
//! The extractor must never panic, and a trace is present exactly when the
//! input contains the panic marker.

#![no_main]

use libfuzzer_sys::fuzz_target;

use sus_corpus::signature::{NO_SUMMARY, PANIC_MARKER, SignatureExtractor};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let extraction = SignatureExtractor::new("/work").extract(&text);

    assert_eq!(extraction.panic_trace.is_some(), text.contains(PANIC_MARKER));
    if extraction.location.is_none() {
        assert_eq!(extraction.signature, NO_SUMMARY);
    } else {
        assert!(extraction.signature.starts_with("In "));
    }
});
