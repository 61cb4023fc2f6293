//! Fixed-interval aggregation
//!
//! Wide rows are grouped into time buckets (one second by default) and each
//! column is reduced with the reducer chosen by the `ReducerPolicy`. Buckets
//! only exist where at least one timed row fell; gaps are not synthesized.

use crate::config::ReducerPolicy;
use crate::merge::{ColumnLayout, WideRow};
use crate::types::TraceTime;
use chrono::DateTime;
use std::collections::BTreeMap;

/// One time bucket
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRecord {
    /// Start of the bucket window
    pub bucket_start: TraceTime,
    /// Timestamp of the first row observed in the bucket
    pub timestamp: TraceTime,
    /// Number of rows that fell in the bucket
    pub row_count: usize,
    /// One value per table column; `None` where no row carried the column
    pub values: Vec<Option<f64>>,
}

/// Aggregated records with their column names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedTable {
    pub columns: Vec<String>,
    pub records: Vec<AggregatedRecord>,
}

impl AggregatedTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of a named column in one record
    pub fn value(&self, record: usize, column: &str) -> Option<f64> {
        let column = self.column_index(column)?;
        self.records.get(record)?.values.get(column).copied().flatten()
    }

    /// All values of a named column, one per record
    pub fn column_values(&self, column: &str) -> Option<Vec<Option<f64>>> {
        let column = self.column_index(column)?;
        Some(self.records.iter().map(|r| r.values[column]).collect())
    }

    /// Append a column; `values` must have one entry per record
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.records.len());
        self.columns.push(name.into());
        for (record, value) in self.records.iter_mut().zip(values) {
            record.values.push(value);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct Bucket {
    first_timestamp: TraceTime,
    row_count: usize,
    samples: Vec<Vec<f64>>,
}

/// Group timed rows into buckets of `bucket_ms` and reduce every column
///
/// Rows without a timestamp are ignored.
pub fn aggregate(
    layout: &ColumnLayout,
    rows: &[WideRow],
    policy: &ReducerPolicy,
    bucket_ms: i64,
) -> AggregatedTable {
    let width = bucket_ms.max(1);
    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();

    for row in rows {
        let Some(timestamp) = row.timestamp else {
            continue;
        };

        let millis = timestamp.and_utc().timestamp_millis();
        let key = millis - millis.rem_euclid(width);

        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            first_timestamp: timestamp,
            row_count: 0,
            samples: vec![Vec::new(); layout.len()],
        });
        bucket.row_count += 1;

        for (column, cell) in row.cells.iter().enumerate() {
            if let Some(value) = cell {
                bucket.samples[column].push(value.as_f64());
            }
        }
    }

    let reducers: Vec<_> = layout
        .columns()
        .iter()
        .map(|c| policy.reducer_for(&c.name, &c.signal))
        .collect();

    let records = buckets
        .into_iter()
        .map(|(key, bucket)| AggregatedRecord {
            bucket_start: DateTime::from_timestamp_millis(key)
                .map(|d| d.naive_utc())
                .unwrap_or(bucket.first_timestamp),
            timestamp: bucket.first_timestamp,
            row_count: bucket.row_count,
            values: bucket
                .samples
                .iter()
                .zip(&reducers)
                .map(|(samples, reducer)| reducer.apply(samples))
                .collect(),
        })
        .collect::<Vec<_>>();

    log::debug!(
        "Aggregated {} rows into {} buckets of {} ms",
        rows.len(),
        records.len(),
        width
    );

    AggregatedTable {
        columns: layout.columns().iter().map(|c| c.name.clone()).collect(),
        records,
    }
}
