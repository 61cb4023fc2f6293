//! Core types for the CAN trace decoder library
//!
//! This module defines the values that flow through the pipeline: raw trace
//! rows as read from an exporter file, normalized frames, decoded signal values
//! and the error taxonomy for each stage. Row-level errors (`NormalizeError`,
//! `DecodeError`) never abort a batch; `DecoderError` covers table and file
//! level failures.

use chrono::NaiveDateTime;
use std::fmt;

/// Timestamp type used for trace rows and aggregation buckets
pub type TraceTime = NaiveDateTime;

/// Result type for table and file level operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Largest payload accepted by the decoder (CAN FD)
pub const MAX_PAYLOAD_BYTES: usize = 64;

/// Errors that abort loading a table or processing a whole trace file
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("Failed to parse table source: {0}")]
    TableParseError(String),

    #[error("Unsupported table source: {0}")]
    UnsupportedTableSource(String),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),

    #[error("Duplicate message: CAN ID 0x{frame_id:X} already defined in table '{table}'")]
    DuplicateMessage { table: String, frame_id: u32 },

    #[error("Duplicate table name: {0}")]
    DuplicateTable(String),

    #[error("Trace column '{0}' not found in header")]
    MissingColumn(String),

    #[error("Failed to read trace file: {0}")]
    TraceReadError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Row-level failures while turning a raw trace row into a typed frame
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Missing field '{field}'")]
    MissingField { field: &'static str },

    #[error("Invalid hex in field '{field}': {value:?} ({reason})")]
    InvalidHex {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid timestamp: {value:?}")]
    InvalidTimestamp { value: String },
}

impl NormalizeError {
    /// Short stable name used for error counting in batch reports
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizeError::MissingField { .. } => "missing_field",
            NormalizeError::InvalidHex { .. } => "invalid_hex",
            NormalizeError::InvalidTimestamp { .. } => "invalid_timestamp",
        }
    }
}

/// Row-level failures while decoding a payload against a message definition
///
/// An unknown frame id is not an error: decoding returns `Ok(None)`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload too short for CAN ID 0x{frame_id:X}: expected {expected} bytes, got {actual}")]
    PayloadTooShort {
        frame_id: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Payload too long for CAN ID 0x{frame_id:X}: {actual} bytes (max 64)")]
    PayloadTooLong { frame_id: u32, actual: usize },

    #[error("Signal '{signal}' needs {required} bytes but payload has {actual}")]
    BitRangeOverflow {
        signal: String,
        required: usize,
        actual: usize,
    },

    #[error("Signal '{signal}' has invalid bit length {length}")]
    InvalidSignalLength { signal: String, length: u16 },

    #[error("Malformed hex: {0}")]
    MalformedHex(NormalizeError),

    #[error("Value {value} out of range for signal '{signal}'")]
    ValueOutOfRange { signal: String, value: f64 },
}

impl DecodeError {
    /// Short stable name used for error counting in batch reports
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::PayloadTooShort { .. } => "payload_too_short",
            DecodeError::PayloadTooLong { .. } => "payload_too_long",
            DecodeError::BitRangeOverflow { .. } => "bit_range_overflow",
            DecodeError::InvalidSignalLength { .. } => "invalid_signal_length",
            DecodeError::MalformedHex(_) => "malformed_hex",
            DecodeError::ValueOutOfRange { .. } => "value_out_of_range",
        }
    }
}

/// One record as produced by a trace reader, before any interpretation
///
/// Fields are `None` when the exporter's record did not carry them (short
/// record, empty cell or unmapped column).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTraceRow {
    /// Zero-based position of the record in the trace file
    pub index: usize,
    /// Timestamp text as written by the exporter
    pub timestamp: Option<String>,
    /// Frame identifier in hex
    pub frame_id_hex: Option<String>,
    /// Declared data length code
    pub length: Option<String>,
    /// Payload in hex, optionally space separated byte pairs
    pub data_hex: Option<String>,
}

impl RawTraceRow {
    /// Build a row from the three fields every trace carries
    pub fn new(
        index: usize,
        timestamp: impl Into<String>,
        frame_id_hex: impl Into<String>,
        data_hex: impl Into<String>,
    ) -> Self {
        Self {
            index,
            timestamp: Some(timestamp.into()),
            frame_id_hex: Some(frame_id_hex.into()),
            length: None,
            data_hex: Some(data_hex.into()),
        }
    }
}

/// A trace row after normalization: typed id, payload bytes and time
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFrame {
    /// Index of the originating raw row
    pub index: usize,
    /// Parsed timestamp, if the row carried one
    pub timestamp: Option<TraceTime>,
    /// CAN message ID (11-bit or 29-bit)
    pub frame_id: u32,
    /// Frame data bytes
    pub data: Vec<u8>,
}

/// A decoded signal with its current value
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    /// Signal name from the message table
    pub name: String,
    /// Decoded physical value
    pub value: SignalValue,
    /// Engineering unit (e.g., "rpm", "A", "V")
    pub unit: Option<String>,
    /// Value description from value tables (e.g., "Forward")
    pub value_description: Option<String>,
    /// Raw value before scaling
    pub raw_value: RawValue,
}

/// Raw bit field value, keeping the full range of 64-bit unsigned signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawValue {
    /// Sign-extended value of a signed signal
    Signed(i64),
    /// Value of an unsigned signal
    Unsigned(u64),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Signed(v) => write!(f, "{}", v),
            RawValue::Unsigned(v) => write!(f, "{}", v),
        }
    }
}

impl RawValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            RawValue::Signed(v) => *v as f64,
            RawValue::Unsigned(v) => *v as f64,
        }
    }

    /// Value as i64, `None` for unsigned values past i64::MAX
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawValue::Signed(v) => Some(*v),
            RawValue::Unsigned(v) => i64::try_from(*v).ok(),
        }
    }

    /// Bit pattern used to select multiplexed signals
    pub fn selector(&self) -> u64 {
        match self {
            RawValue::Signed(v) => *v as u64,
            RawValue::Unsigned(v) => *v,
        }
    }
}

/// Signal value types supported by the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    /// Unscaled integer value
    Integer(i64),
    /// Floating-point value (after scaling/offset)
    Float(f64),
    /// Single-bit status flag
    Boolean(bool),
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Integer(v) => write!(f, "{}", v),
            SignalValue::Float(v) => write!(f, "{}", v),
            SignalValue::Boolean(v) => write!(f, "{}", if *v { "1" } else { "0" }),
        }
    }
}

impl SignalValue {
    /// Physical value as f64 (booleans map to 0.0/1.0)
    pub fn as_f64(&self) -> f64 {
        match self {
            SignalValue::Integer(v) => *v as f64,
            SignalValue::Float(v) => *v,
            SignalValue::Boolean(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Check if this is a boolean value
    pub fn as_bool(&self) -> bool {
        match self {
            SignalValue::Boolean(v) => *v,
            SignalValue::Integer(v) => *v != 0,
            SignalValue::Float(v) => *v != 0.0,
        }
    }
}

/// All signals decoded from one frame against one message table
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRow {
    /// CAN message ID
    pub frame_id: u32,
    /// Message name from the table
    pub message_name: String,
    /// Decoded signals, in definition order; inactive multiplexed signals are absent
    pub signals: Vec<DecodedSignal>,
    /// Active multiplexer value (if message is multiplexed)
    pub multiplexer_value: Option<u64>,
}

impl DecodedRow {
    /// Look up a decoded signal by name
    pub fn get(&self, name: &str) -> Option<&DecodedSignal> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// Physical value of a signal, or `None` when it was not decoded
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|s| s.value.as_f64())
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
