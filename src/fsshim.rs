//! Minimal file-backed round-trip used only to exercise §8 testable
//! property 9 (`WriteLogSrcConfigToFile` / `ReadLogSrcConfigFromFile`).
//!
//! This is deliberately not a general-purpose file-system abstraction —
//! the real file-system and EEPROM section-system subsystems are external
//! collaborators excluded from this crate's scope (§1). It exists solely
//! because the round-trip property is explicitly listed as testable and
//! isolates the OSAL's file API integration from everything else that
//! subsystem does.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::{OsalError, Result};

const FORMAT_VERSION: u32 = 1;

/// Writes `entries` to `path` in a small versioned, length-prefixed format:
/// a `u32` version, a `u32` count, then for each entry a `u32` byte length
/// followed by its UTF-8 bytes.
pub fn write_log_src_config(path: impl AsRef<Path>, entries: &[String]) -> Result<()> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        let bytes = entry.as_bytes();
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
    }

    let mut file = fs::File::create(path).map_err(io_to_osal)?;
    file.write_all(&buf).map_err(io_to_osal)?;
    Ok(())
}

/// Reads back a list written by [`write_log_src_config`]. An empty or
/// missing file yields an empty list (the "empty file system" case named
/// by the property).
pub fn read_log_src_config(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut buf = Vec::new();
    fs::File::open(path).map_err(io_to_osal)?.read_to_end(&mut buf).map_err(io_to_osal)?;

    if buf.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = buf.as_slice();
    let version = take_u32(&mut cursor)?;
    if version != FORMAT_VERSION {
        return Err(OsalError::invalid_argument(format!("unsupported log-src-config version {version}")));
    }

    let count = take_u32(&mut cursor)? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let len = take_u32(&mut cursor)? as usize;
        if cursor.len() < len {
            return Err(OsalError::invalid_argument("truncated log-src-config entry"));
        }
        let (raw, rest) = cursor.split_at(len);
        cursor = rest;
        entries.push(String::from_utf8(raw.to_vec()).map_err(|e| OsalError::invalid_argument(e.to_string()))?);
    }

    Ok(entries)
}

fn take_u32(cursor: &mut &[u8]) -> Result<u32> {
    if cursor.len() < 4 {
        return Err(OsalError::invalid_argument("truncated log-src-config header"));
    }
    let (head, rest) = cursor.split_at(4);
    *cursor = rest;
    Ok(u32::from_le_bytes(head.try_into().unwrap()))
}

fn io_to_osal(e: io::Error) -> OsalError {
    OsalError::resource_exhaustion(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_on_empty_file_system_yields_original_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log_src_config.bin");

        let original = vec!["src/a.cpp".to_string(), "src/b/c.cpp".to_string(), String::new()];
        write_log_src_config(&path, &original).unwrap();
        let read_back = read_log_src_config(&path).unwrap();

        assert_eq!(read_back, original);
    }

    #[test]
    fn reading_a_nonexistent_file_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        assert_eq!(read_log_src_config(&path).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn rejects_truncated_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        fs::write(&path, [1, 0, 0]).unwrap();
        assert!(read_log_src_config(&path).is_err());
    }
}
