//! Per-file batch report
//!
//! Row-level failures never abort a file. They are counted here by kind and a
//! bounded number of them are kept verbatim for display.

use serde::Serialize;
use std::collections::BTreeMap;

/// One recorded row failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    pub index: usize,
    pub message: String,
}

/// Statistics for one processed trace file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Rows read from the trace, including unreadable ones
    pub total_rows: usize,
    /// Rows that normalized into a frame
    pub normalized: usize,
    /// Rows rejected by the reader or the normalizer
    pub normalize_failures: usize,
    /// (frame, table) pairs that failed to decode
    pub decode_failures: usize,
    /// Normalized frames no table knew
    pub unknown_frames: usize,
    /// (frame, table) pairs decoded successfully
    pub decoded_pairs: usize,
    /// Rows excluded from aggregation for lack of a timestamp
    pub untimed_rows: usize,
    /// Aggregation buckets produced
    pub buckets: usize,
    pub errors_by_kind: BTreeMap<&'static str, usize>,
    pub samples: Vec<RowIssue>,
    #[serde(skip)]
    max_samples: usize,
}

impl BatchReport {
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples,
            ..Default::default()
        }
    }

    /// Count an error of `kind` and keep it as a sample while there is room
    pub fn record_error(&mut self, kind: &'static str, index: usize, message: impl Into<String>) {
        *self.errors_by_kind.entry(kind).or_insert(0) += 1;
        if self.samples.len() < self.max_samples {
            self.samples.push(RowIssue {
                index,
                message: message.into(),
            });
        }
    }

    pub fn total_errors(&self) -> usize {
        self.errors_by_kind.values().sum()
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_are_capped() {
        let mut report = BatchReport::new(2);
        report.record_error("invalid_hex", 1, "bad id");
        report.record_error("invalid_hex", 2, "bad id");
        report.record_error("payload_too_short", 3, "short");

        assert_eq!(report.total_errors(), 3);
        assert_eq!(report.errors_by_kind["invalid_hex"], 2);
        assert_eq!(report.errors_by_kind["payload_too_short"], 1);
        assert_eq!(report.samples.len(), 2);
        assert_eq!(report.samples[1].index, 2);
    }

    #[test]
    fn test_empty_report() {
        let report = BatchReport::new(10);
        assert!(!report.has_errors());
        assert!(report.samples.is_empty());
    }
}
