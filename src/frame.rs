//! Frame codec and filename rules shared by client and server
//!
//! The header is `name_len (u16 BE) | name`. The length must be read and
//! checked before the name, so decoding is split in two steps:
//! [`decode_header`] on the 2-byte field, then a separate read of the name.

use crate::error::{Result, TransferError};
use crate::protocol::{HEADER_LEN, MAX_NAME_LEN, MIN_NAME_LEN};
use std::path::{Component, Path, PathBuf};

/// Build the header for `name`.
/// Format: NAME_LEN (2, big-endian) | NAME (NAME_LEN)
pub fn encode_header(name: &str) -> Result<Vec<u8>> {
    let len = name.len();
    if len < MIN_NAME_LEN {
        return Err(TransferError::InvalidPath(name.to_string()));
    }
    if len > MAX_NAME_LEN {
        return Err(TransferError::NameTooLong(len));
    }
    let mut header = Vec::with_capacity(HEADER_LEN + len);
    header.extend_from_slice(&(len as u16).to_be_bytes());
    header.extend_from_slice(name.as_bytes());
    Ok(header)
}

/// Parse the length field; returns the number of name bytes to read next.
pub fn decode_header(field: [u8; HEADER_LEN]) -> Result<usize> {
    let len = u16::from_be_bytes(field) as usize;
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(TransferError::MalformedFrame(len));
    }
    Ok(len)
}

/// Check a received filename before it touches the filesystem.
///
/// The name must be a single path segment directly inside the output
/// directory:
/// 1. Valid UTF-8, no NUL bytes
/// 2. No `/`, `\` or `:` (on any platform; the sender may run elsewhere).
///    `:` would make a drive-relative path or an alternate data stream on
///    Windows.
/// 3. Not `.` or `..`
/// 4. Exactly one normal path component on this platform
///
/// Names that merely contain dots, like `..foo` or `a..b`, are fine.
pub fn validate_filename(raw: &[u8]) -> Result<&str> {
    let name = std::str::from_utf8(raw)
        .map_err(|_| TransferError::InvalidFilename(String::from_utf8_lossy(raw).into_owned()))?;
    let rejected = name.is_empty()
        || name.contains(['/', '\\', ':', '\0'])
        || name == "."
        || name == ".."
        || !is_single_segment(name);
    if rejected {
        return Err(TransferError::InvalidFilename(name.to_string()));
    }
    Ok(name)
}

fn is_single_segment(name: &str) -> bool {
    let mut parts = Path::new(name).components();
    matches!((parts.next(), parts.next()), (Some(Component::Normal(_)), None))
}

/// Validate `raw` and join it onto the output directory.
///
/// Returns the name alongside the path; the result is always a direct child
/// of `dir`.
pub fn output_path<'a>(dir: &Path, raw: &'a [u8]) -> Result<(&'a str, PathBuf)> {
    let name = validate_filename(raw)?;
    Ok((name, dir.join(name)))
}

/// Base name of a local path: everything after the last separator.
///
/// `\` counts as a separator only on Windows.
pub fn base_name(path: &str) -> Result<&str> {
    if path.is_empty() {
        return Err(TransferError::InvalidPath(path.to_string()));
    }
    let name = match path.rfind(is_separator) {
        Some(idx) => &path[idx + 1..],
        None => path,
    };
    if name.is_empty() {
        return Err(TransferError::InvalidPath(path.to_string()));
    }
    Ok(name)
}

#[cfg(windows)]
fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

#[cfg(not(windows))]
fn is_separator(c: char) -> bool {
    c == '/'
}
