// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Fuzz target for capture id validation
//!
//! Accepted ids must join onto a root as exactly one normal component.

#![no_main]

use std::path::{Component, Path};

use libfuzzer_sys::fuzz_target;

use sus_corpus::CaptureId;

fuzz_target!(|data: &str| {
    if let Ok(id) = CaptureId::parse(data) {
        let joined = Path::new("/root").join(id.as_str());
        let components: Vec<_> = joined.components().collect();
        assert_eq!(components.len(), 3);
        assert!(matches!(components[2], Component::Normal(_)));
        let _ = id.created_at();
    }
});
