//! CSV trace export reader
//!
//! Reads the tabular exports written by bus analyzer tools. A typical file
//! starts with a couple of metadata lines, followed by a header row and one
//! frame per record:
//!
//! ```text
//! Trace exported by ...
//! Channel 1
//! Index;Timestamp;Time;Type;Frame ID;Length;Data
//! 1;0.000100;12:00:00.100;Rx;102200A1;8;10 27 00 00 00 00 00 00
//! ```
//!
//! Column names and order vary between tools, so fields are located through
//! an explicit `ColumnMapping`.

use crate::config::{ColumnMapping, ColumnRef, TraceFormat};
use crate::types::{DecoderError, RawTraceRow, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// CSV trace parser
pub struct CsvTraceReader;

impl CsvTraceReader {
    /// Open a trace file and return an iterator over its rows
    pub fn open(
        path: &Path,
        format: &TraceFormat,
        mapping: &ColumnMapping,
    ) -> Result<CsvTraceIterator<File>> {
        log::info!("Reading trace file: {:?}", path);

        if !path.exists() {
            return Err(DecoderError::TraceReadError(format!(
                "Trace file not found: {:?}",
                path
            )));
        }

        let file = File::open(path).map_err(|e| {
            DecoderError::TraceReadError(format!("Failed to open trace file {:?}: {}", path, e))
        })?;

        Self::from_reader(file, format, mapping)
    }

    /// Build a row iterator over any byte source
    pub fn from_reader<R: Read>(
        reader: R,
        format: &TraceFormat,
        mapping: &ColumnMapping,
    ) -> Result<CsvTraceIterator<R>> {
        let mut buffered = BufReader::new(reader);

        // Metadata lines are not CSV and may have any number of fields
        let mut line = String::new();
        for _ in 0..format.skip_rows {
            line.clear();
            if buffered.read_line(&mut line)? == 0 {
                break;
            }
            log::trace!("Skipping metadata line: {}", line.trim_end());
        }

        let delimiter = u8::try_from(format.delimiter).map_err(|_| {
            DecoderError::TraceReadError(format!(
                "Delimiter {:?} is not a single-byte character",
                format.delimiter
            ))
        })?;

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(format.has_headers)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(buffered);

        let headers: Vec<String> = if format.has_headers {
            csv_reader
                .headers()
                .map_err(|e| DecoderError::TraceReadError(format!("Failed to read header: {}", e)))?
                .iter()
                .map(|h| h.trim().to_string())
                .collect()
        } else {
            Vec::new()
        };
        log::debug!("Trace header: {:?}", headers);

        let columns = ResolvedColumns::resolve(mapping, &headers)?;

        Ok(CsvTraceIterator {
            records: csv_reader.into_records(),
            columns,
            position: 0,
        })
    }
}

/// Column positions after resolving a mapping against a header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResolvedColumns {
    index: Option<usize>,
    timestamp: Option<usize>,
    frame_id: usize,
    length: Option<usize>,
    data: usize,
}

impl ResolvedColumns {
    fn resolve(mapping: &ColumnMapping, headers: &[String]) -> Result<Self> {
        let find = |column: &ColumnRef| -> Result<usize> {
            match column {
                ColumnRef::Position(position) => Ok(*position),
                ColumnRef::Name(name) => headers
                    .iter()
                    .position(|h| h.eq_ignore_ascii_case(name.trim()))
                    .ok_or_else(|| DecoderError::MissingColumn(name.clone())),
            }
        };

        Ok(Self {
            index: mapping.index.as_ref().map(&find).transpose()?,
            timestamp: mapping.timestamp.as_ref().map(&find).transpose()?,
            frame_id: find(&mapping.frame_id)?,
            length: mapping.length.as_ref().map(&find).transpose()?,
            data: find(&mapping.data)?,
        })
    }
}

/// Iterator over rows of a CSV trace
pub struct CsvTraceIterator<R: Read> {
    records: csv::StringRecordsIntoIter<BufReader<R>>,
    columns: ResolvedColumns,
    position: usize,
}

impl<R: Read> Iterator for CsvTraceIterator<R> {
    type Item = Result<RawTraceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        let position = self.position;
        self.position += 1;

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                return Some(Err(DecoderError::TraceReadError(format!(
                    "Record {}: {}",
                    position, e
                ))))
            }
        };

        let field = |column: Option<usize>| -> Option<String> {
            column
                .and_then(|i| record.get(i))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let index = field(self.columns.index)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(position);

        Some(Ok(RawTraceRow {
            index,
            timestamp: field(self.columns.timestamp),
            frame_id_hex: field(Some(self.columns.frame_id)),
            length: field(self.columns.length),
            data_hex: field(Some(self.columns.data)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
Trace exported by analyzer
Channel 1
Index;Timestamp;Time;Type;Frame ID;Length;Data
1;0.100;12:00:00.100;Rx;102200A1;8;10 27 00 00 00 00 00 00
2;0.900;12:00:00.900;Rx;19FF01D8;8;E8 03 64 00 00 00 00 00
3;1.050;12:00:01.050;Rx;102200A1
";

    #[test]
    fn test_read_default_layout() {
        let rows: Vec<_> = CsvTraceReader::from_reader(
            EXPORT.as_bytes(),
            &TraceFormat::default(),
            &ColumnMapping::default(),
        )
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].index, 1);
        assert_eq!(rows[0].timestamp.as_deref(), Some("12:00:00.100"));
        assert_eq!(rows[0].frame_id_hex.as_deref(), Some("102200A1"));
        assert_eq!(rows[0].length.as_deref(), Some("8"));
        assert_eq!(rows[1].data_hex.as_deref(), Some("E8 03 64 00 00 00 00 00"));

        // Short record: the data field is simply absent
        assert_eq!(rows[2].data_hex, None);
    }

    #[test]
    fn test_read_by_column_name() {
        let export = "Time,ID,Payload\n12:00:00.100,7E8,0102\n";
        let format = TraceFormat {
            delimiter: ',',
            skip_rows: 0,
            has_headers: true,
        };
        let mapping = ColumnMapping::by_name("time", "ID", "Payload");

        let rows: Vec<_> = CsvTraceReader::from_reader(export.as_bytes(), &format, &mapping)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].frame_id_hex.as_deref(), Some("7E8"));
        assert_eq!(rows[0].data_hex.as_deref(), Some("0102"));
    }

    #[test]
    fn test_missing_named_column_is_file_error() {
        let export = "Time,ID\n12:00:00.100,7E8\n";
        let format = TraceFormat {
            delimiter: ',',
            skip_rows: 0,
            has_headers: true,
        };
        let mapping = ColumnMapping::by_name("Time", "ID", "Data");

        let result = CsvTraceReader::from_reader(export.as_bytes(), &format, &mapping);
        assert!(matches!(result, Err(DecoderError::MissingColumn(name)) if name == "Data"));
    }

    #[test]
    fn test_missing_file() {
        let result = CsvTraceReader::open(
            Path::new("no/such/trace.csv"),
            &TraceFormat::default(),
            &ColumnMapping::default(),
        );
        assert!(matches!(result, Err(DecoderError::TraceReadError(_))));
    }
}
