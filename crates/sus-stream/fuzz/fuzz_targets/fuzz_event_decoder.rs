// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Fuzz target for the event decoder
//!
//! Decodes arbitrary payloads under both protocol revisions; anything that
//! decodes must encode back to the bytes it consumed.

#![no_main]

use libfuzzer_sys::fuzz_target;

use sus_stream::{EventCodec, ProtocolRevision};

fuzz_target!(|data: &[u8]| {
    for revision in [ProtocolRevision::Initial, ProtocolRevision::WithPrincipal] {
        let codec = EventCodec::new(revision);
        let Ok(event) = codec.decode(data) else {
            continue;
        };
        // Replacement characters mean the text was not byte-exact
        let lossy = [&event.message, &event.stderr, &event.toolchain_version, &event.server_version]
            .into_iter()
            .chain(event.principal.as_ref())
            .any(|text| text.contains('\u{FFFD}'));
        if lossy || !event.toolchain_version.is_ascii() || !event.server_version.is_ascii() {
            continue;
        }
        let encoded = codec.encode(&event).expect("clean events re-encode");
        assert_eq!(&data[..encoded.len()], encoded.as_slice());
    }
});
