//! Message tables
//!
//! A `MessageTable` maps frame IDs to message layouts for one signal definition
//! source (one DBC file, one JSON table). Tables are built once, validated on
//! insert and read-only afterwards, so they can be shared across worker threads.

use crate::types::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDefinition {
    /// CAN message ID (29-bit for extended frames, flag bit stripped)
    pub id: u32,
    /// Message name
    pub name: String,
    /// Message size in bytes
    pub size: usize,
    /// Sender ECU name (optional)
    #[serde(default)]
    pub sender: Option<String>,
    /// All signals in this message
    pub signals: Vec<SignalDefinition>,
    /// Multiplexer signal name (if multiplexed)
    #[serde(default)]
    pub multiplexer_signal: Option<String>,
    /// True if the frame uses a 29-bit identifier
    #[serde(default)]
    pub is_extended: bool,
}

impl MessageDefinition {
    pub fn is_multiplexed(&self) -> bool {
        self.multiplexer_signal.is_some()
            || self.signals.iter().any(|s| s.multiplexer_info.is_some())
    }

    /// Find a signal by name
    pub fn signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Start bit in the CAN frame (LSB for Intel, MSB for Motorola)
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    /// Byte order
    #[serde(default)]
    pub byte_order: ByteOrder,
    /// Value type (signed/unsigned)
    #[serde(default)]
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Offset to add after scaling
    #[serde(default)]
    pub offset: f64,
    /// Engineering unit (e.g., "rpm", "A", "V")
    #[serde(default)]
    pub unit: Option<String>,
    /// Value table for enum-like values (raw_value -> description)
    #[serde(default)]
    pub value_table: Option<HashMap<i64, String>>,
    /// Multiplexer info (None if not multiplexed)
    #[serde(default)]
    pub multiplexer_info: Option<MultiplexerInfo>,
}

fn default_factor() -> f64 {
    1.0
}

impl SignalDefinition {
    /// Unsigned little-endian signal with no scaling
    pub fn new(name: impl Into<String>, start_bit: u16, length: u16) -> Self {
        Self {
            name: name.into(),
            start_bit,
            length,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
            unit: None,
            value_table: None,
            multiplexer_info: None,
        }
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_scaling(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Number of payload bytes needed to hold this signal
    ///
    /// Intel signals grow upward from `start_bit`. Motorola signals start at
    /// the MSB and walk down through the byte, continuing at bit 7 of the next
    /// byte, so the LSB lands `length - (bit + 1)` bits past the first byte.
    pub fn required_bytes(&self) -> usize {
        let start = self.start_bit as usize;
        let length = self.length as usize;
        if length == 0 {
            return 0;
        }

        match self.byte_order {
            ByteOrder::LittleEndian => (start + length + 7) / 8,
            ByteOrder::BigEndian => {
                let first_byte = start / 8;
                let bits_in_first = start % 8 + 1;
                if length <= bits_in_first {
                    first_byte + 1
                } else {
                    first_byte + 1 + (length - bits_in_first + 7) / 8
                }
            }
        }
    }

    /// Payload bit indices (`byte*8 + bit`, bit 0 = LSB) covered by this signal
    fn bit_positions(&self) -> Vec<usize> {
        let mut positions = Vec::with_capacity(self.length as usize);
        let mut pos = self.start_bit as usize;
        for _ in 0..self.length {
            positions.push(pos);
            pos = match self.byte_order {
                ByteOrder::LittleEndian => pos + 1,
                ByteOrder::BigEndian if pos % 8 == 0 => pos + 15,
                ByteOrder::BigEndian => pos - 1,
            };
        }
        positions
    }
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    #[default]
    #[serde(alias = "little", alias = "intel")]
    LittleEndian,
    /// Big-endian (Motorola format)
    #[serde(alias = "big", alias = "motorola")]
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Signed integer
    Signed,
    /// Unsigned integer
    #[default]
    Unsigned,
}

/// Multiplexer information for multiplexed signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplexerInfo {
    /// Name of the multiplexer signal that controls this signal
    pub multiplexer_signal: String,
    /// Multiplexer value(s) for which this signal is active
    pub multiplexer_values: Vec<u64>,
}

/// All message definitions from one source, keyed by frame ID
#[derive(Debug, Clone)]
pub struct MessageTable {
    /// Table identity, used to namespace merged columns
    name: String,
    /// Source file (DBC/JSON filename)
    source: String,
    messages: HashMap<u32, MessageDefinition>,
}

impl MessageTable {
    /// Create a new empty table
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            messages: HashMap::new(),
        }
    }

    /// Build a table from a list of message definitions
    pub fn from_messages(
        name: impl Into<String>,
        source: impl Into<String>,
        messages: Vec<MessageDefinition>,
    ) -> Result<Self> {
        let mut table = Self::new(name, source);
        for message in messages {
            table.add_message(message)?;
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Validate and add a message definition
    pub fn add_message(&mut self, mut message: MessageDefinition) -> Result<()> {
        if self.messages.contains_key(&message.id) {
            return Err(DecoderError::DuplicateMessage {
                table: self.name.clone(),
                frame_id: message.id,
            });
        }

        validate_message(&message)?;

        // Sources may only name the selector on the multiplexed signals
        if message.multiplexer_signal.is_none() {
            message.multiplexer_signal = message
                .signals
                .iter()
                .find_map(|s| s.multiplexer_info.as_ref())
                .map(|info| info.multiplexer_signal.clone());
        }
        self.messages.insert(message.id, message);
        Ok(())
    }

    /// Get the message definition for a frame ID
    pub fn get_message(&self, frame_id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&frame_id)
    }

    /// All messages ordered by frame ID
    pub fn messages_sorted(&self) -> Vec<&MessageDefinition> {
        let mut messages: Vec<&MessageDefinition> = self.messages.values().collect();
        messages.sort_unstable_by_key(|m| m.id);
        messages
    }

    /// Get all frame IDs in the table, ascending
    pub fn frame_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.messages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Get table statistics
    pub fn stats(&self) -> TableStats {
        TableStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.values().map(|m| m.signals.len()).sum(),
        }
    }
}

fn validate_message(message: &MessageDefinition) -> Result<()> {
    for signal in &message.signals {
        if signal.length == 0 || signal.length > 64 {
            return Err(DecoderError::InvalidSignalDefinition(format!(
                "signal '{}' in message '{}' has bit length {} (must be 1..=64)",
                signal.name, message.name, signal.length
            )));
        }

        if signal.required_bytes() > message.size {
            return Err(DecoderError::InvalidSignalDefinition(format!(
                "signal '{}' needs {} bytes but message '{}' is {} bytes",
                signal.name,
                signal.required_bytes(),
                message.name,
                message.size
            )));
        }

        if signal.factor == 0.0 {
            log::warn!(
                "Signal '{}' in message '{}' has zero factor",
                signal.name,
                message.name
            );
        }
    }

    let selectors = message.multiplexer_signal.iter().chain(
        message
            .signals
            .iter()
            .filter_map(|s| s.multiplexer_info.as_ref())
            .map(|info| &info.multiplexer_signal),
    );
    for mux_name in selectors {
        if message.signal(mux_name).is_none() {
            return Err(DecoderError::InvalidSignalDefinition(format!(
                "message '{}' names multiplexer '{}' which it does not define",
                message.name, mux_name
            )));
        }
    }

    // Multiplexed signals share bits by construction; only plain ones may not overlap
    let mut owner: HashMap<usize, &str> = HashMap::new();
    for signal in message.signals.iter().filter(|s| s.multiplexer_info.is_none()) {
        for bit in signal.bit_positions() {
            if let Some(other) = owner.insert(bit, &signal.name) {
                log::warn!(
                    "Signals '{}' and '{}' overlap at bit {} in message '{}'",
                    other,
                    signal.name,
                    bit,
                    message.name
                );
                break;
            }
        }
    }

    Ok(())
}

/// Table statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}
