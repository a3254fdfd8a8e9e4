//! Exporter configuration and the source-field to column mapping.
//!
//! Supports optional TOML configuration files like:
//! ```toml
//! database = "/var/lib/tsm/prices.sqlite"
//!
//! [field_map]
//! itemString = "item_id"
//! marketValue = "market_value"
//! ```

use crate::error::{Result, TsmError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Value columns of the `price_history` table a field may map onto.
pub const PRICE_COLUMNS: [&str; 5] = [
    "item_id",
    "market_value",
    "min_buyout",
    "historical",
    "num_auctions",
];

/// Immutable mapping from snapshot field names to `price_history` columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    columns: BTreeMap<String, String>,
}

impl FieldMapping {
    /// Build a mapping, rejecting unknown target columns and columns claimed twice.
    pub fn new<I, K, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut columns = BTreeMap::new();
        for (field, column) in entries {
            let field = field.into();
            let column = column.into();

            if !PRICE_COLUMNS.contains(&column.as_str()) {
                return Err(TsmError::Config(format!(
                    "field '{}' maps to unknown column '{}'",
                    field, column
                )));
            }
            if let Some((other, _)) = columns.iter().find(|(_, c)| **c == column) {
                return Err(TsmError::Config(format!(
                    "column '{}' is mapped from both '{}' and '{}'",
                    column, other, field
                )));
            }
            columns.insert(field, column);
        }

        if columns.is_empty() {
            return Err(TsmError::Config("field mapping is empty".to_string()));
        }
        Ok(Self { columns })
    }

    /// Destination column for a source field, if the field is known.
    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.columns.get(field).map(String::as_str)
    }

    /// Mapped `(field, column)` pairs, ordered by field name.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(f, c)| (f.as_str(), c.as_str()))
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        let columns = [
            ("itemString", "item_id"),
            ("marketValue", "market_value"),
            ("minBuyout", "min_buyout"),
            ("historical", "historical"),
            ("numAuctions", "num_auctions"),
        ]
        .into_iter()
        .map(|(field, column)| (field.to_string(), column.to_string()))
        .collect();
        Self { columns }
    }
}

/// Settings loaded from the optional TOML config file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExporterConfig {
    pub database: Option<PathBuf>,
    pub field_map: Option<BTreeMap<String, String>>,
}

impl ExporterConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TsmError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config from {:?}: {}", path, e),
            ))
        })?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TsmError::Config(format!("Failed to parse config TOML: {}", e)))
    }

    /// The configured field mapping, or the built-in one when none is given.
    pub fn field_mapping(&self) -> Result<FieldMapping> {
        match &self.field_map {
            Some(map) => FieldMapping::new(map.clone()),
            None => Ok(FieldMapping::default()),
        }
    }
}
