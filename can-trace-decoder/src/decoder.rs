//! Main decoder API
//!
//! The `Decoder` owns the loaded message tables and drives a trace through
//! the pipeline: read, normalize, decode against every table, merge into wide
//! rows, aggregate into time buckets and append derived quantities.

use crate::aggregate::{aggregate, AggregatedTable};
use crate::config::PipelineConfig;
use crate::derived::append_derived;
use crate::formats::CsvTraceReader;
use crate::merge::{merge_row, ColumnLayout, WideRow};
use crate::message_decoder::MessageDecoder;
use crate::normalizer::normalize;
use crate::report::BatchReport;
use crate::signals::{self, MessageTable, TableStats};
use crate::types::{
    DecodeError, DecodedRow, DecoderError, NormalizeError, NormalizedFrame, RawTraceRow, Result,
};
use rayon::prelude::*;
use std::path::Path;

/// Everything produced for one trace file
#[derive(Debug, Clone)]
pub struct FileOutput {
    pub layout: ColumnLayout,
    /// Rows decoded by at least one table, in trace order
    pub rows: Vec<WideRow>,
    /// Bucketed values, with derived columns when enabled
    pub aggregated: AggregatedTable,
    pub report: BatchReport,
}

/// Result of processing one raw row, before it is folded into the report
enum RowOutcome {
    Rejected {
        index: usize,
        error: NormalizeError,
    },
    Decoded {
        frame: NormalizedFrame,
        decoded: Vec<(usize, DecodedRow)>,
        failures: Vec<(usize, DecodeError)>,
    },
}

/// The main decoder struct - entry point for all decoding operations
pub struct Decoder {
    /// Loaded tables, in the order they were added
    tables: Vec<MessageTable>,
}

impl Decoder {
    /// Create a decoder with no tables
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    /// Add an already built table
    ///
    /// Table names must be unique; an unnamed table gets the next default
    /// name (`dbc1`, `dbc2`, ...).
    pub fn add_table(&mut self, mut table: MessageTable) -> Result<()> {
        if table.name().is_empty() {
            table.rename(self.next_table_name());
        }

        if self.tables.iter().any(|t| t.name() == table.name()) {
            return Err(DecoderError::DuplicateTable(table.name().to_string()));
        }

        let stats = table.stats();
        log::info!(
            "Table '{}' ({}): {} messages, {} signals",
            table.name(),
            table.source(),
            stats.num_messages,
            stats.num_signals
        );
        self.tables.push(table);
        Ok(())
    }

    /// Load a DBC file under the next default table name
    ///
    /// # Example
    /// ```no_run
    /// use can_trace_decoder::Decoder;
    /// use std::path::Path;
    ///
    /// let mut decoder = Decoder::new();
    /// decoder.add_dbc(Path::new("motor_controller.dbc")).unwrap();
    /// decoder.add_dbc(Path::new("bms.dbc")).unwrap();
    /// ```
    pub fn add_dbc(&mut self, path: &Path) -> Result<()> {
        let table = signals::dbc::load_dbc_file(path, &self.next_table_name())?;
        self.add_table(table)
    }

    /// Load a JSON table file under the next default table name
    pub fn add_json(&mut self, path: &Path) -> Result<()> {
        let table = signals::json::load_json_file(path, &self.next_table_name())?;
        self.add_table(table)
    }

    /// Load a table file of any supported kind, optionally with an explicit name
    pub fn load_table_file(&mut self, path: &Path, name: Option<&str>) -> Result<()> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.next_table_name(),
        };
        let table = signals::load_table(path, &name)?;
        self.add_table(table)
    }

    /// First `dbc<N>` not already taken, counting from the table position
    fn next_table_name(&self) -> String {
        (self.tables.len() + 1..)
            .map(|n| format!("dbc{}", n))
            .find(|name| self.tables.iter().all(|t| t.name() != name))
            .unwrap_or_default()
    }

    pub fn tables(&self) -> &[MessageTable] {
        &self.tables
    }

    pub fn has_tables(&self) -> bool {
        !self.tables.is_empty()
    }

    /// Get statistics about every loaded table
    pub fn table_stats(&self) -> Vec<(String, TableStats)> {
        self.tables
            .iter()
            .map(|t| (t.name().to_string(), t.stats()))
            .collect()
    }

    /// Output columns for the loaded tables
    pub fn column_layout(&self, config: &PipelineConfig) -> ColumnLayout {
        ColumnLayout::build(&self.tables, config.naming, &config.separator)
    }

    /// Read a CSV trace file and run it through the whole pipeline
    ///
    /// Only file-level problems (missing file, unreadable header, missing
    /// named column) are returned as errors; bad rows end up in the report.
    ///
    /// # Example
    /// ```no_run
    /// use can_trace_decoder::{Decoder, PipelineConfig};
    /// use std::path::Path;
    ///
    /// let mut decoder = Decoder::new();
    /// decoder.add_dbc(Path::new("motor_controller.dbc")).unwrap();
    ///
    /// let output = decoder
    ///     .decode_trace_file(Path::new("trace.csv"), &PipelineConfig::default())
    ///     .unwrap();
    /// for record in &output.aggregated.records {
    ///     println!("{} {:?}", record.timestamp, record.values);
    /// }
    /// ```
    pub fn decode_trace_file(&self, path: &Path, config: &PipelineConfig) -> Result<FileOutput> {
        log::info!("Decoding trace file: {:?}", path);
        let rows = CsvTraceReader::open(path, &config.trace, &config.columns)?;
        Ok(self.process_rows(rows, config))
    }

    /// Run already read rows through the pipeline
    ///
    /// Reader errors are counted as rejected rows. Output order follows input
    /// order whether or not rows are processed in parallel.
    pub fn process_rows<I>(&self, rows: I, config: &PipelineConfig) -> FileOutput
    where
        I: IntoIterator<Item = Result<RawTraceRow>>,
    {
        let mut report = BatchReport::new(config.max_error_samples);
        let mut raw_rows = Vec::new();

        for (position, row) in rows.into_iter().enumerate() {
            report.total_rows += 1;
            match row {
                Ok(row) => raw_rows.push(row),
                Err(e) => {
                    log::warn!("Unreadable trace record {}: {}", position, e);
                    report.normalize_failures += 1;
                    report.record_error("read_error", position, e.to_string());
                }
            }
        }

        let outcomes: Vec<RowOutcome> = if config.parallel {
            raw_rows.par_iter().map(|row| self.process_row(row)).collect()
        } else {
            raw_rows.iter().map(|row| self.process_row(row)).collect()
        };

        let layout = self.column_layout(config);
        let mut wide_rows = Vec::new();

        for outcome in outcomes {
            match outcome {
                RowOutcome::Rejected { index, error } => {
                    log::debug!("Row {} rejected: {}", index, error);
                    report.normalize_failures += 1;
                    report.record_error(error.kind(), index, error.to_string());
                }
                RowOutcome::Decoded {
                    frame,
                    decoded,
                    failures,
                } => {
                    report.normalized += 1;
                    if frame.timestamp.is_none() {
                        report.untimed_rows += 1;
                    }

                    for (table_idx, error) in failures {
                        let table = self.tables[table_idx].name();
                        log::debug!("Row {} failed in table '{}': {}", frame.index, table, error);
                        report.decode_failures += 1;
                        report.record_error(
                            error.kind(),
                            frame.index,
                            format!("table '{}': {}", table, error),
                        );
                    }

                    if decoded.is_empty() {
                        if !self.is_known(frame.frame_id) {
                            report.unknown_frames += 1;
                        }
                        continue;
                    }

                    report.decoded_pairs += decoded.len();
                    wide_rows.push(merge_row(
                        &layout,
                        frame.index,
                        frame.timestamp,
                        frame.frame_id,
                        &decoded,
                    ));
                }
            }
        }

        let mut aggregated = aggregate(
            &layout,
            &wide_rows,
            &config.reducers,
            config.bucket_width_ms(),
        );
        if let Some(derived) = &config.derived {
            append_derived(&mut aggregated, derived, &config.separator);
        }
        report.buckets = aggregated.len();

        log::info!(
            "Processed {} rows: {} normalized, {} decoded pairs, {} buckets, {} errors",
            report.total_rows,
            report.normalized,
            report.decoded_pairs,
            report.buckets,
            report.total_errors()
        );

        FileOutput {
            layout,
            rows: wide_rows,
            aggregated,
            report,
        }
    }

    /// Normalize one row and decode it against every table independently
    fn process_row(&self, raw: &RawTraceRow) -> RowOutcome {
        let frame = match normalize(raw) {
            Ok(frame) => frame,
            Err(error) => {
                return RowOutcome::Rejected {
                    index: raw.index,
                    error,
                }
            }
        };

        let mut decoded = Vec::new();
        let mut failures = Vec::new();

        for (table_idx, table) in self.tables.iter().enumerate() {
            match MessageDecoder::decode(frame.frame_id, &frame.data, table) {
                Ok(Some(row)) => decoded.push((table_idx, row)),
                Ok(None) => {}
                Err(e) => failures.push((table_idx, e)),
            }
        }

        RowOutcome::Decoded {
            frame,
            decoded,
            failures,
        }
    }

    fn is_known(&self, frame_id: u32) -> bool {
        self.tables.iter().any(|t| t.get_message(frame_id).is_some())
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
