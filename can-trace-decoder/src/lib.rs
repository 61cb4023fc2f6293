//! CAN Trace Decoder Library
//!
//! Decodes tabular CAN trace exports (CSV) against one or more message tables
//! (DBC or JSON), merges the results into wide rows and reduces them into
//! fixed time buckets with derived drivetrain quantities.
//!
//! # Architecture
//!
//! - Trace readers emit raw textual rows
//! - The normalizer turns each row into a typed frame (id, payload, time)
//! - The message decoder extracts signals, consulting every table independently
//! - The merge step lays out one column per (table, signal)
//! - Aggregation buckets rows in time and appends derived quantities
//!
//! A bad row never stops a file; it is counted in the `BatchReport`.
//!
//! The library does NOT:
//! - Parse binary log containers (BLF, MF4)
//! - Write output files or draw charts
//!
//! Output formatting is in the application layer (can-trace-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use can_trace_decoder::{Decoder, DerivedConfig, PipelineConfig};
//! use std::path::Path;
//!
//! // Tables are namespaced dbc1, dbc2, ... in load order
//! let mut decoder = Decoder::new();
//! decoder.add_dbc(Path::new("motor_controller.dbc")).unwrap();
//! decoder.add_dbc(Path::new("bms.dbc")).unwrap();
//!
//! let config = PipelineConfig::new()
//!     .with_bucket_ms(1000)
//!     .with_derived(Some(DerivedConfig::boost()));
//!
//! let output = decoder
//!     .decode_trace_file(Path::new("trace.csv"), &config)
//!     .unwrap();
//!
//! println!("{} buckets, {} errors", output.report.buckets, output.report.total_errors());
//! for record in &output.aggregated.records {
//!     println!("{} {:?}", record.timestamp, record.values);
//! }
//! ```

// Public modules
pub mod aggregate;
pub mod config;
pub mod decoder;
pub mod derived;
pub mod formats;
pub mod merge;
pub mod message_decoder;
pub mod normalizer;
pub mod report;
pub mod signals;
pub mod types;

// Re-export main types for convenience
pub use aggregate::{AggregatedRecord, AggregatedTable};
pub use config::{
    ColumnMapping, ColumnNaming, ColumnRef, DerivedConfig, PipelineConfig, Reducer, ReducerPolicy,
    TraceFormat,
};
pub use decoder::{Decoder, FileOutput};
pub use merge::{ColumnLayout, ColumnSpec, WideRow};
pub use message_decoder::{MessageDecoder, MessageEncoder};
pub use report::{BatchReport, RowIssue};
pub use signals::{MessageDefinition, MessageTable, SignalDefinition, TableStats};
pub use types::{
    DecodeError, DecodedRow, DecodedSignal, DecoderError, NormalizeError, NormalizedFrame,
    RawTraceRow, RawValue, Result, SignalValue, TraceTime,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
