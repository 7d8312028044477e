//! Coverage payload decoding and persistence.
//!
//! DUTs stream coverage data as hex-encoded ASCII inside a
//! `{{__coverage_start;<path>;<payload>}}` frame. The payload may be packed
//! with dot compression, where the byte value `0x00` is coded as `.`
//! instead of `00`.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug, PartialEq)]
pub enum PayloadError {
    #[error("Odd-length hex payload: {len} digits")]
    OddLength { len: usize },
    #[error("Invalid hex digit {byte:?} at offset {offset}")]
    InvalidDigit { byte: char, offset: usize },
}

/// Decode a hex payload back to binary, reversing dot compression first.
///
/// The literal `.` stands for the two digits `00`; after expansion the
/// string is consumed two hex digits at a time in original order.
pub fn unpack_hex_payload(payload: &str) -> Result<Vec<u8>, PayloadError> {
    let mut expanded = String::with_capacity(payload.len() * 2);
    for c in payload.chars() {
        if c == '.' {
            expanded.push_str("00");
        } else {
            expanded.push(c);
        }
    }

    if expanded.len() % 2 != 0 {
        return Err(PayloadError::OddLength {
            len: expanded.len(),
        });
    }

    let bytes = expanded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let hi = hex_digit(pair[0]).ok_or(PayloadError::InvalidDigit {
            byte: pair[0] as char,
            offset: i * 2,
        })?;
        let lo = hex_digit(pair[1]).ok_or(PayloadError::InvalidDigit {
            byte: pair[1] as char,
            offset: i * 2 + 1,
        })?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Write a decoded payload to `path`, creating missing directories.
///
/// A relative directory that does not exist is rewritten under
/// `build_path` so artifacts land next to the build outputs. Returns
/// `false` on any I/O error, which is logged rather than raised; a
/// failed coverage dump must not fail the run.
pub fn dump_payload(build_path: &Path, path: &Path, payload: &[u8]) -> bool {
    let dir = path.parent().unwrap_or(Path::new(""));
    let Some(file_name) = path.file_name() else {
        error!(path = %path.display(), "payload path has no file name");
        return false;
    };

    let target: PathBuf = if dir.is_relative() && !dir.exists() {
        build_path.join(file_name)
    } else {
        path.to_path_buf()
    };

    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
        && let Err(e) = fs::create_dir_all(parent)
    {
        error!(dir = %parent.display(), error = %e, "cannot create payload directory");
        return false;
    }

    match fs::write(&target, payload) {
        Ok(()) => {
            info!(bytes = payload.len(), path = %target.display(), "payload written");
            true
        }
        Err(e) => {
            error!(path = %target.display(), error = %e, "payload write failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_hex_dotted(data: &[u8]) -> String {
        data.iter()
            .map(|&b| {
                if b == 0 {
                    ".".to_string()
                } else {
                    format!("{b:02x}")
                }
            })
            .collect()
    }

    #[test]
    fn unpack_plain_hex() {
        assert_eq!(unpack_hex_payload("6164").unwrap(), b"ad".to_vec());
        assert_eq!(unpack_hex_payload("DEADBEEF").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn unpack_expands_dot_compression() {
        assert_eq!(unpack_hex_payload(".").unwrap(), vec![0x00]);
        assert_eq!(unpack_hex_payload("61.62").unwrap(), vec![0x61, 0x00, 0x62]);
    }

    #[test]
    fn round_trip_through_dotted_hex() {
        let data: Vec<u8> = vec![0x00, 0x61, 0xff, 0x00, 0x00, 0x10, 0x7f];
        assert_eq!(unpack_hex_payload(&to_hex_dotted(&data)).unwrap(), data);
    }

    #[test]
    fn unpack_rejects_bad_input() {
        assert_eq!(
            unpack_hex_payload("616"),
            Err(PayloadError::OddLength { len: 3 })
        );
        assert_eq!(
            unpack_hex_payload("61zz"),
            Err(PayloadError::InvalidDigit {
                byte: 'z',
                offset: 2
            })
        );
    }

    #[test]
    fn dump_rewrites_missing_relative_dir() {
        let build = tempfile::tempdir().unwrap();
        let relative = Path::new("no_such_dir/cov.bin");

        assert!(dump_payload(build.path(), relative, b"\x01\x02"));
        let written = fs::read(build.path().join("cov.bin")).unwrap();
        assert_eq!(written, vec![1, 2]);
    }

    #[test]
    fn dump_creates_absolute_dirs() {
        let build = tempfile::tempdir().unwrap();
        let target = build.path().join("deep/nested/cov.bin");

        assert!(dump_payload(build.path(), &target, b"xyz"));
        assert_eq!(fs::read(target).unwrap(), b"xyz");
    }
}
