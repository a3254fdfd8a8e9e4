//! Data models for TSM price history snapshots.

use crate::error::{Result, TsmError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::value::{RawValue, to_raw_value};
use std::fmt;
use std::path::PathBuf;

lazy_static! {
    static ref JSON_NUMBER_RE: Regex =
        Regex::new(r"^-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?$").unwrap();
}

/// One cell of a snapshot row, kept as the dump wrote it.
///
/// `Quoted` values appeared as `"..."` in the dump (quotes removed here);
/// `Bare` values are unquoted tokens such as `4500` or `1e3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Bare(String),
    Quoted(String),
}

impl Scalar {
    /// Classify a trimmed dump token.
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        match token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            Some(inner) => Scalar::Quoted(inner.to_string()),
            None => Scalar::Bare(token.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Scalar::Bare(s) | Scalar::Quoted(s) => s,
        }
    }

    /// Quoted values and non-numeric bare tokens become JSON strings; bare
    /// numbers are written with their original text.
    fn to_raw_json(&self) -> Result<Box<RawValue>> {
        let raw = match self {
            Scalar::Bare(s) if JSON_NUMBER_RE.is_match(s) => RawValue::from_string(s.clone())?,
            Scalar::Bare(s) | Scalar::Quoted(s) => to_raw_value(s)?,
        };
        Ok(raw)
    }

    fn from_raw_json(raw: &RawValue) -> Result<Self> {
        let text = raw.get().trim();
        if text.starts_with('"') {
            return Ok(Scalar::Quoted(serde_json::from_str(text)?));
        }
        if text.starts_with(['[', '{']) {
            return Err(TsmError::MalformedSnapshot(format!(
                "nested value {} in data",
                text
            )));
        }
        Ok(Scalar::Bare(text.to_string()))
    }
}

impl AsRef<str> for Scalar {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for Scalar {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Scalar {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<String> for Scalar {
    fn eq(&self, other: &String) -> bool {
        self.as_str() == other
    }
}

/// One realm's pricing dump at one point in time.
///
/// Rows hold the raw scalars, positionally aligned with `fields`.
/// Construct through [`Snapshot::new`] so the shape is always validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub download_time: u64,
    pub fields: Vec<String>,
    pub data: Vec<Vec<Scalar>>,
}

impl Snapshot {
    pub fn new(download_time: u64, fields: Vec<String>, data: Vec<Vec<Scalar>>) -> Result<Self> {
        if download_time == 0 {
            return Err(TsmError::MalformedTimestamp(
                "download time must be a positive integer".to_string(),
            ));
        }
        if fields.is_empty() {
            return Err(TsmError::MalformedSnapshot("field list is empty".to_string()));
        }
        if let Some(pos) = fields.iter().position(|f| f.is_empty()) {
            return Err(TsmError::MalformedSnapshot(format!(
                "field name at position {} is empty",
                pos
            )));
        }
        for (index, row) in data.iter().enumerate() {
            if row.len() != fields.len() {
                return Err(TsmError::MalformedSnapshot(format!(
                    "row {} has {} columns, expected {}",
                    index,
                    row.len(),
                    fields.len()
                )));
            }
        }

        Ok(Self {
            download_time,
            fields,
            data,
        })
    }

    /// Download time as a UTC datetime, if it fits chrono's range.
    pub fn download_datetime(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.download_time)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Convert into the exported JSON shape without re-typing any value.
    pub fn to_document(&self) -> Result<SnapshotDocument> {
        let data = self
            .data
            .iter()
            .map(|row| row.iter().map(Scalar::to_raw_json).collect::<Result<Vec<_>>>())
            .collect::<Result<_>>()?;

        Ok(SnapshotDocument {
            download_time: self.download_time,
            fields: self.fields.clone(),
            data,
        })
    }
}

/// Exported JSON document:
/// `{"downloadTime": u64, "fields": [string], "data": [[string|number]]}`.
///
/// Cells are kept as raw JSON so number text survives a round trip unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    pub download_time: u64,
    pub fields: Vec<String>,
    pub data: Vec<Vec<Box<RawValue>>>,
}

impl TryFrom<SnapshotDocument> for Snapshot {
    type Error = TsmError;

    fn try_from(doc: SnapshotDocument) -> Result<Self> {
        let data = doc
            .data
            .iter()
            .map(|row| row.iter().map(|raw| Scalar::from_raw_json(raw)).collect::<Result<Vec<_>>>())
            .collect::<Result<_>>()?;
        Snapshot::new(doc.download_time, doc.fields, data)
    }
}

/// Result of an export attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// A new JSON file was written.
    Written(PathBuf),
    /// A file for this (realm, download time) already existed and was left untouched.
    AlreadyExported(PathBuf),
}

impl ExportOutcome {
    pub fn path(&self) -> &PathBuf {
        match self {
            ExportOutcome::Written(path) | ExportOutcome::AlreadyExported(path) => path,
        }
    }
}

/// Per-batch counters reported by the loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub inserted: usize,
    /// Rows skipped because (realm, time, item) was already present.
    pub duplicates: usize,
    pub failed: usize,
}

impl LoadSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.duplicates + self.failed
    }
}
