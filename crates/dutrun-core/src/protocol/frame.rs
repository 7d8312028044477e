//! Key-value frame encoding and decoding.
//!
//! One frame travels as one ASCII line: `{{key;value}}\n`. Decoding is
//! deliberately forgiving: a DUT console is a shared channel and garbage
//! between frames is expected, so malformed input yields no frame instead
//! of an error.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::constants::RESERVED_PREFIX;

/// One decoded key-value unit of the wire protocol.
///
/// `timestamp` is the host-side capture time (seconds since the epoch);
/// it is not part of the wire bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub key: String,
    pub value: String,
    pub timestamp: f64,
}

impl Frame {
    /// Build a frame stamped with the current time.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp: now(),
        }
    }

    /// Decode the first complete `{{key;value}}` pattern found in `line`.
    ///
    /// The key is one or more of `[A-Za-z0-9_-]`; the value is any run of
    /// characters not containing `}`. Text before or after the pattern is
    /// ignored. Partial or garbled input yields `None`; the caller is
    /// responsible for buffering until a full line is available.
    pub fn decode(line: &str) -> Option<Frame> {
        let mut search_from = 0;
        while let Some(rel) = line[search_from..].find("{{") {
            let start = search_from + rel;
            let body = &line[start + 2..];

            if let Some((key, value)) = parse_body(body) {
                return Some(Frame::new(key, value));
            }
            search_from = start + 2;
        }
        None
    }

    /// Whether the key uses the reserved control-frame prefix.
    pub fn is_control(&self) -> bool {
        self.key.starts_with(RESERVED_PREFIX)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{{};{}}}}}", self.key, self.value)
    }
}

/// Encode a key-value pair as its wire line, trailing newline included.
///
/// No escaping is performed: callers must not embed `;` in the key or
/// `}}` in the value.
pub fn encode_kv(key: &str, value: &str) -> String {
    format!("{{{{{key};{value}}}}}\n")
}

/// Current time as fractional seconds since the epoch.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn parse_body(body: &str) -> Option<(&str, &str)> {
    let semi = body.find(';')?;
    let key = &body[..semi];
    if key.is_empty() || !key.bytes().all(is_key_byte) {
        return None;
    }

    let rest = &body[semi + 1..];
    let close = rest.find('}')?;
    // The first '}' must open the closing '}}' for the frame to be complete.
    if !rest[close..].starts_with("}}") {
        return None;
    }
    Some((key, &rest[..close]))
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let line = encode_kv("hello_world", "Hello World");
        assert_eq!(line, "{{hello_world;Hello World}}\n");

        let frame = Frame::decode(&line).unwrap();
        assert_eq!(frame.key, "hello_world");
        assert_eq!(frame.value, "Hello World");
        assert!(frame.timestamp > 0.0);
    }

    #[test]
    fn decode_ignores_surrounding_noise() {
        let frame = Frame::decode("garbage{{echo;abc-123}}trailing").unwrap();
        assert_eq!(frame.key, "echo");
        assert_eq!(frame.value, "abc-123");
    }

    #[test]
    fn decode_rejects_malformed_input() {
        assert!(Frame::decode("{{no_value}}").is_none());
        assert!(Frame::decode("{{;empty_key}}").is_none());
        assert!(Frame::decode("{{bad key;v}}").is_none());
        assert!(Frame::decode("{{open;never closed").is_none());
        assert!(Frame::decode("{{unbalanced;v}extra}").is_none());
        assert!(Frame::decode("plain text line").is_none());
    }

    #[test]
    fn decode_allows_empty_value() {
        let frame = Frame::decode("{{tick;}}").unwrap();
        assert_eq!(frame.key, "tick");
        assert_eq!(frame.value, "");
    }

    #[test]
    fn decode_skips_false_opens() {
        // A stray "{{" before the real frame must not mask it.
        let frame = Frame::decode("{{ {{end;success}}").unwrap();
        assert_eq!(frame.key, "end");
        assert_eq!(frame.value, "success");
    }

    #[test]
    fn control_frames_detected_by_prefix() {
        assert!(Frame::new("__sync", "uuid").is_control());
        assert!(!Frame::new("end", "success").is_control());
    }
}
