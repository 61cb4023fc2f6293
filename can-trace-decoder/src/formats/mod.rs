//! Trace file readers
//!
//! Each reader yields `RawTraceRow` records; interpretation of the fields is
//! left to the normalizer so that one malformed record never stops a file.

pub mod csv_trace;

pub use csv_trace::{CsvTraceIterator, CsvTraceReader};
