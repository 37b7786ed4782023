// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Fuzz event records and their binary layout
//!
//! A frame payload is a fixed sequence of little-endian fields:
//!
//! | size | field |
//! |---|---|
//! | 8, signed | timestamp, epoch milliseconds |
//! | 1 + N | toolchain version (ASCII) |
//! | 1 + N | server version (ASCII) |
//! | 4 + N | principal (UTF-8), [`ProtocolRevision::WithPrincipal`] only |
//! | 2 + N | message (UTF-8) |
//! | 2 + N | stderr (UTF-8) |
//!
//! The frame carries no version tag, so the deployment picks the revision.
//! Text fields decode lossily; only a field running past the payload end
//! rejects the frame.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// A single event reported by the live fuzzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzEvent {
    /// When the fuzzer produced the event (millisecond resolution)
    pub timestamp: DateTime<Utc>,
    /// Version of the toolchain under test
    pub toolchain_version: String,
    /// Version of the language server under test
    pub server_version: String,
    /// Generated input that triggered the event, when the protocol carries it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    /// Message the fuzzer sent to the server
    pub message: String,
    /// Server stderr captured for this event
    pub stderr: String,
}

/// Wire layout revisions of the live stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolRevision {
    /// Earlier layout without a principal field
    Initial,
    /// Later layout carrying the principal after the server version
    #[default]
    WithPrincipal,
}

impl ProtocolRevision {
    /// Stable name used in configuration and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::WithPrincipal => "with-principal",
        }
    }

    /// Whether frames of this revision carry a principal
    #[must_use]
    pub fn has_principal(&self) -> bool {
        matches!(self, Self::WithPrincipal)
    }
}

/// Decodes and encodes frame payloads for one protocol revision
#[derive(Debug, Clone, Copy, Default)]
pub struct EventCodec {
    revision: ProtocolRevision,
}

impl EventCodec {
    /// Create a codec for the given revision
    #[must_use]
    pub fn new(revision: ProtocolRevision) -> Self {
        Self { revision }
    }

    /// The revision this codec reads and writes
    #[must_use]
    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    /// Decode one complete payload
    ///
    /// Bytes after the stderr field are ignored.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Truncated` if any field runs past the end of the
    /// payload and `StreamError::InvalidTimestamp` for an unrepresentable
    /// timestamp. Text that is not valid UTF-8 is decoded lossily.
    pub fn decode(&self, payload: &[u8]) -> Result<FuzzEvent, StreamError> {
        let mut cursor = Cursor::new(payload);

        let millis = i64::from_le_bytes(cursor.array("timestamp")?);
        let timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or(StreamError::InvalidTimestamp { millis })?;

        let len = usize::from(cursor.array::<1>("toolchain_version length")?[0]);
        let toolchain_version = cursor.text(len, "toolchain_version")?;

        let len = usize::from(cursor.array::<1>("server_version length")?[0]);
        let server_version = cursor.text(len, "server_version")?;

        let principal = if self.revision.has_principal() {
            let len = u32::from_le_bytes(cursor.array("principal length")?) as usize;
            Some(cursor.text(len, "principal")?)
        } else {
            None
        };

        let len = usize::from(u16::from_le_bytes(cursor.array("message length")?));
        let message = cursor.text(len, "message")?;

        let len = usize::from(u16::from_le_bytes(cursor.array("stderr length")?));
        let stderr = cursor.text(len, "stderr")?;

        Ok(FuzzEvent {
            timestamp,
            toolchain_version,
            server_version,
            principal,
            message,
            stderr,
        })
    }

    /// Encode an event into a payload (without the length prefix)
    ///
    /// A missing principal is written as an empty one under
    /// [`ProtocolRevision::WithPrincipal`].
    ///
    /// # Errors
    ///
    /// Returns `StreamError::FieldTooLong` if a field overflows its length
    /// prefix, `StreamError::InvalidText` for non-ASCII versions and
    /// `StreamError::UnsupportedField` for a principal under
    /// [`ProtocolRevision::Initial`].
    pub fn encode(&self, event: &FuzzEvent) -> Result<Vec<u8>, StreamError> {
        let mut out = Vec::with_capacity(
            8 + 1
                + event.toolchain_version.len()
                + 1
                + event.server_version.len()
                + 4
                + event.principal.as_ref().map_or(0, String::len)
                + 2
                + event.message.len()
                + 2
                + event.stderr.len(),
        );

        out.extend_from_slice(&event.timestamp.timestamp_millis().to_le_bytes());
        put_ascii(&mut out, "toolchain_version", &event.toolchain_version)?;
        put_ascii(&mut out, "server_version", &event.server_version)?;

        match (&event.principal, self.revision.has_principal()) {
            (Some(principal), true) => {
                let len = u32::try_from(principal.len()).map_err(|_| StreamError::FieldTooLong {
                    field: "principal",
                    len: principal.len(),
                    max: u32::MAX as usize,
                })?;
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(principal.as_bytes());
            }
            (None, true) => out.extend_from_slice(&0u32.to_le_bytes()),
            (Some(_), false) => {
                return Err(StreamError::UnsupportedField {
                    revision: self.revision.as_str(),
                });
            }
            (None, false) => {}
        }

        put_u16_text(&mut out, "message", &event.message)?;
        put_u16_text(&mut out, "stderr", &event.stderr)?;
        Ok(out)
    }
}

fn put_ascii(out: &mut Vec<u8>, field: &'static str, value: &str) -> Result<(), StreamError> {
    if !value.is_ascii() {
        return Err(StreamError::InvalidText {
            field,
            offset: out.len(),
        });
    }
    let len = u8::try_from(value.len()).map_err(|_| StreamError::FieldTooLong {
        field,
        len: value.len(),
        max: u8::MAX as usize,
    })?;
    out.push(len);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn put_u16_text(out: &mut Vec<u8>, field: &'static str, value: &str) -> Result<(), StreamError> {
    let len = u16::try_from(value.len()).map_err(|_| StreamError::FieldTooLong {
        field,
        len: value.len(),
        max: u16::MAX as usize,
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Bounds-checked reader over one payload
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, needed: usize, field: &'static str) -> Result<&'a [u8], StreamError> {
        let end = self
            .pos
            .checked_add(needed)
            .filter(|end| *end <= self.buf.len())
            .ok_or(StreamError::Truncated {
                field,
                offset: self.pos,
                needed,
                frame_len: self.buf.len(),
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], StreamError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    /// Invalid sequences become U+FFFD; a field cut mid-code-point still decodes
    fn text(&mut self, len: usize, field: &'static str) -> Result<String, StreamError> {
        let bytes = self.take(len, field)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn sample_event(principal: Option<&str>) -> FuzzEvent {
        FuzzEvent {
            timestamp: Utc
                .timestamp_millis_opt(1_705_458_786_123)
                .single()
                .expect("valid timestamp"),
            toolchain_version: "0.12.0-dev.2063+804cee3b9".to_string(),
            server_version: "0.12.0-dev.337+24f0bb2".to_string(),
            principal: principal.map(str::to_string),
            message: r#"{"jsonrpc":"2.0","method":"textDocument/didChange"}"#.to_string(),
            stderr: "thread 42 panic: reached unreachable code\n".to_string(),
        }
    }

    /// Hand-built payload for the later revision
    fn handmade_payload() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&1_000i64.to_le_bytes());
        p.push(3);
        p.extend_from_slice(b"0.1");
        p.push(2);
        p.extend_from_slice(b"v2");
        p.extend_from_slice(&4u32.to_le_bytes());
        p.extend_from_slice(b"main");
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(b"hi");
        p.extend_from_slice(&3u16.to_le_bytes());
        p.extend_from_slice(b"err");
        p
    }

    #[test]
    fn test_decode_handmade_payload() {
        let codec = EventCodec::new(ProtocolRevision::WithPrincipal);
        let event = codec.decode(&handmade_payload()).expect("decode");

        assert_eq!(event.timestamp.timestamp_millis(), 1_000);
        assert_eq!(event.toolchain_version, "0.1");
        assert_eq!(event.server_version, "v2");
        assert_eq!(event.principal.as_deref(), Some("main"));
        assert_eq!(event.message, "hi");
        assert_eq!(event.stderr, "err");
    }

    #[test]
    fn test_decode_initial_revision_has_no_principal() {
        let codec = EventCodec::new(ProtocolRevision::Initial);
        let payload = codec.encode(&sample_event(None)).expect("encode");
        let event = codec.decode(&payload).expect("decode");
        assert!(event.principal.is_none());
        assert_eq!(event, sample_event(None));
    }

    #[test]
    fn test_roundtrip_with_principal() {
        let codec = EventCodec::new(ProtocolRevision::WithPrincipal);
        let payload = handmade_payload();
        let event = codec.decode(&payload).expect("decode");
        assert_eq!(codec.encode(&event).expect("encode"), payload);
    }

    #[test]
    fn test_truncated_field_reports_context() {
        let codec = EventCodec::new(ProtocolRevision::WithPrincipal);
        let mut payload = handmade_payload();
        payload.truncate(payload.len() - 1);

        let err = codec.decode(&payload).expect_err("must fail");
        match err {
            StreamError::Truncated {
                field,
                needed,
                frame_len,
                ..
            } => {
                assert_eq!(field, "stderr");
                assert_eq!(needed, 3);
                assert_eq!(frame_len, payload.len());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!StreamError::Truncated {
            field: "x",
            offset: 0,
            needed: 1,
            frame_len: 0
        }
        .is_fatal());
    }

    #[test]
    fn test_short_timestamp() {
        let codec = EventCodec::default();
        let err = codec.decode(&[1, 2, 3]).expect_err("must fail");
        assert!(matches!(
            err,
            StreamError::Truncated {
                field: "timestamp",
                offset: 0,
                needed: 8,
                frame_len: 3
            }
        ));
    }

    #[test]
    fn test_huge_principal_length_does_not_overflow() {
        let mut p = Vec::new();
        p.extend_from_slice(&0i64.to_le_bytes());
        p.push(0);
        p.push(0);
        p.extend_from_slice(&u32::MAX.to_le_bytes());
        let err = EventCodec::default().decode(&p).expect_err("must fail");
        assert!(matches!(
            err,
            StreamError::Truncated {
                field: "principal",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_utf8_message_decodes_lossily() {
        let codec = EventCodec::new(ProtocolRevision::Initial);
        let mut p = Vec::new();
        p.extend_from_slice(&0i64.to_le_bytes());
        p.push(0);
        p.push(0);
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(&[0xff, 0xfe]);
        p.extend_from_slice(&0u16.to_le_bytes());

        let event = codec.decode(&p).expect("decode");
        assert_eq!(event.message, "\u{FFFD}\u{FFFD}");
        assert_eq!(event.stderr, "");
    }

    #[test]
    fn test_stderr_cut_mid_code_point() {
        let codec = EventCodec::new(ProtocolRevision::Initial);
        let mut p = Vec::new();
        p.extend_from_slice(&7i64.to_le_bytes());
        p.push(1);
        p.extend_from_slice(b"t");
        p.push(1);
        p.extend_from_slice(b"s");
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(b"hi");
        // "e" then the first two bytes of "€"
        p.extend_from_slice(&3u16.to_le_bytes());
        p.extend_from_slice(&[b'e', 0xE2, 0x82]);

        let event = codec.decode(&p).expect("decode");
        assert_eq!(event.message, "hi");
        assert_eq!(event.stderr, "e\u{FFFD}");
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let codec = EventCodec::new(ProtocolRevision::WithPrincipal);
        let mut payload = handmade_payload();
        payload.extend_from_slice(b"junk");
        let event = codec.decode(&payload).expect("decode");
        assert_eq!(event.stderr, "err");
    }

    #[test]
    fn test_encode_rejects_principal_in_initial_revision() {
        let codec = EventCodec::new(ProtocolRevision::Initial);
        let err = codec
            .encode(&sample_event(Some("const x = 1;")))
            .expect_err("must fail");
        assert!(matches!(
            err,
            StreamError::UnsupportedField {
                revision: "initial"
            }
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_fields() {
        let codec = EventCodec::new(ProtocolRevision::Initial);
        let mut event = sample_event(None);
        event.toolchain_version = "9".repeat(256);
        assert!(matches!(
            codec.encode(&event),
            Err(StreamError::FieldTooLong {
                field: "toolchain_version",
                max: 255,
                ..
            })
        ));

        let mut event = sample_event(None);
        event.stderr = "e".repeat(usize::from(u16::MAX) + 1);
        assert!(matches!(
            codec.encode(&event),
            Err(StreamError::FieldTooLong { field: "stderr", .. })
        ));
    }

    #[test]
    fn test_event_serialization_skips_missing_principal() {
        let json = serde_json::to_string(&sample_event(None)).expect("serialize");
        assert!(!json.contains("principal"));
        let back: FuzzEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, sample_event(None));
    }

    #[test]
    fn test_revision_names() {
        assert_eq!(ProtocolRevision::default(), ProtocolRevision::WithPrincipal);
        assert_eq!(ProtocolRevision::Initial.as_str(), "initial");
        assert!(!ProtocolRevision::Initial.has_principal());
    }
}
