//! Core library for extracting TSM AuctionDB price snapshots and loading them into SQLite.

pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod file_utils;
pub mod models;
pub mod parsers;

pub use error::{Result, TsmError};
pub use export::{export_snapshot, read_snapshot_file};
pub use parsers::{parse_snapshot_file, parse_snapshot_line};
