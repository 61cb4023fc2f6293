//! Console summary for processed trace files

use can_trace_decoder::{BatchReport, TableStats};
use std::fmt::Write;
use std::path::Path;

/// Summary of the loaded tables
pub fn render_tables(stats: &[(String, TableStats)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Message tables:");
    for (name, stats) in stats {
        let _ = writeln!(
            out,
            "  {:<10} {:>4} messages {:>5} signals",
            name, stats.num_messages, stats.num_signals
        );
    }
    out
}

/// Summary of one processed trace file
pub fn render_file(path: &Path, report: &BatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", path.display());
    let _ = writeln!(
        out,
        "  rows {}  normalized {}  decoded pairs {}  buckets {}",
        report.total_rows, report.normalized, report.decoded_pairs, report.buckets
    );
    let _ = writeln!(
        out,
        "  rejected {}  decode failures {}  unknown frames {}  untimed {}",
        report.normalize_failures, report.decode_failures, report.unknown_frames, report.untimed_rows
    );

    if report.has_errors() {
        let kinds: Vec<String> = report
            .errors_by_kind
            .iter()
            .map(|(kind, count)| format!("{}={}", kind, count))
            .collect();
        let _ = writeln!(out, "  errors: {}", kinds.join(", "));
        for issue in &report.samples {
            let _ = writeln!(out, "    row {}: {}", issue.index, issue.message);
        }
        let hidden = report.total_errors().saturating_sub(report.samples.len());
        if hidden > 0 {
            let _ = writeln!(out, "    ... {} more", hidden);
        }
    }

    out
}
