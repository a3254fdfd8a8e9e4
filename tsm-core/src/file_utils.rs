//! File utility functions.

use crate::error::{Result, TsmError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Upper bound for the up-front reader allocation. Longer lines still grow the line buffer.
const MAX_READ_CAPACITY: usize = 256 * 1024 * 1024;

/// Find the first line of a dump file that mentions `realm` (case-insensitive).
///
/// The reader buffer is sized to the whole file, capped at
/// `MAX_READ_CAPACITY`: a single line can hold an entire realm's pricing table.
pub fn find_realm_line(path: &Path, realm: &str) -> Result<String> {
    let file = File::open(path).map_err(|e| {
        TsmError::Io(std::io::Error::new(
            e.kind(),
            format!("Cannot open dump file {:?}: {}", path, e),
        ))
    })?;
    let size = file
        .metadata()
        .map_err(|e| {
            TsmError::Io(std::io::Error::new(
                e.kind(),
                format!("Cannot stat dump file {:?}: {}", path, e),
            ))
        })?
        .len();

    let capacity = usize::try_from(size)
        .unwrap_or(MAX_READ_CAPACITY)
        .clamp(1, MAX_READ_CAPACITY);
    let reader = BufReader::with_capacity(capacity, file);

    find_realm_line_in(reader, realm)?.ok_or_else(|| TsmError::RealmNotFound {
        realm: realm.to_string(),
        path: path.display().to_string(),
    })
}

/// Scan `reader` line by line and return the first line containing `realm`.
/// Matching is a lowercase substring test, so `Thunderhorn` finds `thunderhorn`.
///
/// Lines are read as raw bytes; a badly encoded line elsewhere in the dump does
/// not stop the scan. Invalid bytes in the matched line are replaced.
pub fn find_realm_line_in<R: BufRead>(mut reader: R, realm: &str) -> Result<Option<String>> {
    let needle = realm.trim().to_lowercase();
    if needle.is_empty() {
        return Err(TsmError::InvalidArgument("Realm must not be empty".to_string()));
    }

    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }

        if String::from_utf8_lossy(&buf).to_lowercase().contains(&needle) {
            let line = match String::from_utf8(std::mem::take(&mut buf)) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Line for realm {} is not valid UTF-8, replacing invalid bytes", realm);
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            };
            return Ok(Some(line));
        }
    }
}

/// Fail with `NotFound` unless `dir` exists and is a directory.
pub fn ensure_dir_exists(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(TsmError::NotFound(format!("Output dir {} does not exist", dir.display())));
    }
    Ok(())
}

/// Read file with UTF-8 encoding.
pub fn read_utf8_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        TsmError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read {:?}: {}", path, e),
        ))
    })
}
