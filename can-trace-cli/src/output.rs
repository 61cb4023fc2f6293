//! CSV output writers
//!
//! `<stem>_aggregated.csv` holds one line per time bucket, `<stem>_decoded.csv`
//! one line per decoded trace row. Empty cells are written as the configured
//! null text.

use anyhow::{Context, Result};
use can_trace_decoder::{AggregatedTable, ColumnLayout, TraceTime, WideRow};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Output base (`<dir>/<stem>`) for every trace of a batch
///
/// Without an explicit directory the outputs land next to the trace. Traces
/// that would share a base get a `_2`, `_3`, ... suffix in input order.
pub fn output_bases(traces: &[PathBuf], dir: Option<&Path>) -> Vec<PathBuf> {
    let mut taken = HashSet::new();

    traces
        .iter()
        .map(|trace| {
            let stem = trace
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("trace");
            let base_for = |name: &str| match dir {
                Some(dir) => dir.join(name),
                None => trace.with_file_name(name),
            };

            let mut base = base_for(stem);
            let mut n = 2;
            while !taken.insert(base.clone()) {
                base = base_for(&format!("{}_{}", stem, n));
                n += 1;
            }
            if n > 2 {
                log::warn!("Outputs of {:?} renamed to {:?} to avoid a clash", trace, base);
            }
            base
        })
        .collect()
}

/// Output path for a base: `<base>_<suffix>.csv`
pub fn output_path(base: &Path, suffix: &str) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("trace");
    base.with_file_name(format!("{}_{}.csv", name, suffix))
}

/// Time-of-day only when the trace carried no date
fn format_time(time: &TraceTime) -> String {
    if time.date() == NaiveDate::default() {
        time.format("%H:%M:%S%.3f").to_string()
    } else {
        time.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }
}

fn format_value(value: Option<f64>, null_text: &str) -> String {
    match value {
        Some(value) => value.to_string(),
        None => null_text.to_string(),
    }
}

/// Write the aggregated table as CSV
pub fn write_aggregated<W: Write>(writer: W, table: &AggregatedTable, null_text: &str) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec!["Time".to_string()];
    header.extend(table.columns.iter().cloned());
    csv_writer.write_record(&header)?;

    for record in &table.records {
        let mut line = Vec::with_capacity(record.values.len() + 1);
        line.push(format_time(&record.timestamp));
        line.extend(record.values.iter().map(|v| format_value(*v, null_text)));
        csv_writer.write_record(&line)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Write per-row decoded records as CSV
pub fn write_decoded<W: Write>(
    writer: W,
    layout: &ColumnLayout,
    rows: &[WideRow],
    null_text: &str,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec!["Index".to_string(), "Time".to_string(), "Frame ID".to_string()];
    header.extend(layout.columns().iter().map(|c| c.name.clone()));
    csv_writer.write_record(&header)?;

    for row in rows {
        let mut line = Vec::with_capacity(row.cells.len() + 3);
        line.push(row.index.to_string());
        line.push(
            row.timestamp
                .as_ref()
                .map(format_time)
                .unwrap_or_else(|| null_text.to_string()),
        );
        line.push(format!("{:X}", row.frame_id));
        line.extend(row.cells.iter().map(|cell| match cell {
            Some(value) => value.to_string(),
            None => null_text.to_string(),
        }));
        csv_writer.write_record(&line)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Create `path` and write the aggregated table into it
pub fn write_aggregated_file(path: &Path, table: &AggregatedTable, null_text: &str) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    write_aggregated(file, table, null_text)
        .with_context(|| format!("Failed to write aggregated output {:?}", path))
}

/// Create `path` and write the decoded rows into it
pub fn write_decoded_file(
    path: &Path,
    layout: &ColumnLayout,
    rows: &[WideRow],
    null_text: &str,
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    write_decoded(file, layout, rows, null_text)
        .with_context(|| format!("Failed to write decoded output {:?}", path))
}
