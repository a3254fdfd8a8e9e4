use thiserror::Error;

#[derive(Error, Debug)]
pub enum TsmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Realm '{realm}' not found in {path}")]
    RealmNotFound { realm: String, path: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed download time: {0}")]
    MalformedTimestamp(String),

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Failed to insert row {row}: {reason}")]
    RowInsert { row: usize, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TsmError>;
