//! JSON table source
//!
//! A pre-materialized message table, as exported by any tool that already
//! parsed the database description. Either a bare array of messages or an
//! object with a `messages` array is accepted.

use crate::signals::database::{MessageDefinition, MessageTable};
use crate::types::{DecoderError, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum TableDocument {
    Messages(Vec<MessageDefinition>),
    Wrapped { messages: Vec<MessageDefinition> },
}

/// Load a JSON table file into a message table named `name`
pub fn load_json_file(path: &Path, name: &str) -> Result<MessageTable> {
    log::info!("Loading JSON table: {:?}", path);

    let content = std::fs::read_to_string(path).map_err(|e| {
        DecoderError::TableParseError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.json");

    let table = load_json_str(&content, name, source)?;
    log::info!(
        "Loaded {} messages from {:?}",
        table.stats().num_messages,
        path
    );
    Ok(table)
}

/// Build a message table from JSON text
pub fn load_json_str(content: &str, name: &str, source: &str) -> Result<MessageTable> {
    let document: TableDocument = serde_json::from_str(content).map_err(|e| {
        DecoderError::TableParseError(format!("Invalid table JSON in {}: {}", source, e))
    })?;

    let messages = match document {
        TableDocument::Messages(messages) => messages,
        TableDocument::Wrapped { messages } => messages,
    };

    MessageTable::from_messages(name, source, messages)
}
