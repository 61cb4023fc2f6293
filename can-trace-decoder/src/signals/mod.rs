//! Message tables and table sources
//!
//! This module contains the loaders for signal definition sources (DBC, JSON)
//! and the read-only message table they produce.

pub mod database;
pub mod dbc;
pub mod json;

// Re-export key types for convenience
pub use database::{
    ByteOrder, MessageDefinition, MessageTable, MultiplexerInfo, SignalDefinition, TableStats,
    ValueType,
};

use crate::types::{DecoderError, Result};
use std::path::Path;

/// Load a message table, choosing the source kind from the file extension
pub fn load_table(path: &Path, name: &str) -> Result<MessageTable> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());

    match extension.as_deref() {
        Some("dbc") => dbc::load_dbc_file(path, name),
        Some("json") => json::load_json_file(path, name),
        _ => Err(DecoderError::UnsupportedTableSource(format!(
            "{:?} (expected .dbc or .json)",
            path
        ))),
    }
}
