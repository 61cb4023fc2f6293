//! Trace row normalization
//!
//! Turns the textual fields of a `RawTraceRow` into a typed `NormalizedFrame`.
//! Every failure is local to the row; callers log it and move on.

use crate::types::{NormalizeError, NormalizedFrame, RawTraceRow, TraceTime};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Full date-time layouts tried in order
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
];

/// Normalize a raw trace row
pub fn normalize(raw: &RawTraceRow) -> Result<NormalizedFrame, NormalizeError> {
    let frame_id_text = required(&raw.frame_id_hex, "frame_id")?;
    let data_text = required(&raw.data_hex, "data")?;

    let frame_id = parse_frame_id(frame_id_text)?;
    let data = parse_payload(data_text)?;

    let timestamp = match present(&raw.timestamp) {
        Some(text) => Some(parse_timestamp(text)?),
        None => None,
    };

    if let Some(declared) = present(&raw.length).and_then(|l| l.parse::<usize>().ok()) {
        if declared != data.len() {
            log::debug!(
                "Row {}: declared length {} but payload has {} bytes",
                raw.index,
                declared,
                data.len()
            );
        }
    }

    Ok(NormalizedFrame {
        index: raw.index,
        timestamp,
        frame_id,
        data,
    })
}

/// Parse a frame identifier written in hex
///
/// Accepts surrounding whitespace, any letter case, an optional `0x` prefix
/// and an optional trailing `x`/`h` marker (extended-frame or hex suffix).
pub fn parse_frame_id(text: &str) -> Result<u32, NormalizeError> {
    let trimmed = text.trim();
    let without_prefix = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits = without_prefix
        .strip_suffix(|c: char| matches!(c, 'x' | 'X' | 'h' | 'H'))
        .unwrap_or(without_prefix);

    if digits.is_empty() {
        return Err(invalid_hex("frame_id", text, "no hex digits"));
    }

    u32::from_str_radix(digits, 16).map_err(|e| invalid_hex("frame_id", text, &e.to_string()))
}

/// Parse a payload written as hex, with or without separators between bytes
pub fn parse_payload(text: &str) -> Result<Vec<u8>, NormalizeError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|e| invalid_hex("data", text, &e.to_string()))
}

/// Parse a trace timestamp
///
/// Time-of-day values (`12:00:00.100`) are placed on 1970-01-01; full
/// date-times, RFC 3339 and plain seconds since the epoch are also accepted.
pub fn parse_timestamp(text: &str) -> Result<TraceTime, NormalizeError> {
    let trimmed = text.trim();

    if let Ok(time) = NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f") {
        // NaiveDate::default() is 1970-01-01
        return Ok(NaiveDate::default().and_time(time));
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(datetime);
        }
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(datetime.naive_utc());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            let micros = (seconds * 1_000_000.0).round() as i64;
            if let Some(datetime) = DateTime::from_timestamp_micros(micros) {
                return Ok(datetime.naive_utc());
            }
        }
    }

    Err(NormalizeError::InvalidTimestamp {
        value: text.to_string(),
    })
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required<'a>(field: &'a Option<String>, name: &'static str) -> Result<&'a str, NormalizeError> {
    present(field).ok_or(NormalizeError::MissingField { field: name })
}

fn invalid_hex(field: &'static str, value: &str, reason: &str) -> NormalizeError {
    NormalizeError::InvalidHex {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
