//! Streaming BED file parser.
//!
//! Reads BED6 lines (plus any trailing columns) into [`BedRecord`]s.
//! Every record goes through the validating constructors, so a
//! malformed interval never leaves this module.

use crate::interval::{BedRecord, IntervalError, Strand};
use crate::streaming::parsing::{parse_u64_fast, should_skip_line, split_fields};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during BED parsing.
#[derive(Error, Debug)]
pub enum BedError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid BED format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, BedError>;

/// Number of mandatory BED6 columns.
pub const BED6_FIELDS: usize = 6;

/// A streaming BED file reader.
pub struct BedReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    buffer: Vec<u8>,
}

impl BedReader<File> {
    /// Open a BED file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> BedReader<R> {
    /// Create a new BED reader from any readable source.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Read the next BED record.
    pub fn read_record(&mut self) -> Result<Option<BedRecord>> {
        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut self.buffer)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = trim_ascii(&self.buffer);
            if should_skip_line(line) {
                continue;
            }

            return parse_record_line(line, self.line_number).map(Some);
        }
    }

    /// Current line number (1-based, counts skipped lines).
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Get an iterator over all records.
    pub fn records(self) -> BedRecordIter<R> {
        BedRecordIter { reader: self }
    }
}

/// Iterator over BED records.
pub struct BedRecordIter<R: Read> {
    reader: BedReader<R>,
}

impl<R: Read> Iterator for BedRecordIter<R> {
    type Item = Result<BedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

/// Parse one BED6+ line into a record.
pub fn parse_record_line(line: &[u8], line_number: usize) -> Result<BedRecord> {
    let fields = split_fields(line);
    parse_record_fields(&fields, line_number)
}

/// Build a record from already split fields.
pub fn parse_record_fields(fields: &[&[u8]], line_number: usize) -> Result<BedRecord> {
    let parse_err = |message: String| BedError::Parse {
        line: line_number,
        message,
    };

    if fields.len() < BED6_FIELDS {
        return Err(parse_err(format!(
            "Expected at least {} fields, got {}",
            BED6_FIELDS,
            fields.len()
        )));
    }

    let text = |idx: usize| -> Result<&str> {
        std::str::from_utf8(fields[idx])
            .map_err(|_| parse_err(format!("field {} is not UTF-8", idx + 1)))
    };

    let chrom = text(0)?;
    let start = parse_position(fields[1], "start", line_number)?;
    let end = parse_position(fields[2], "end", line_number)?;
    let name = text(3)?;
    let score = match fields[4] {
        b"." => 0,
        raw => parse_u64_fast(raw)
            .and_then(|s| u16::try_from(s).ok())
            .ok_or_else(|| {
                parse_err(format!("Invalid score: '{}'", String::from_utf8_lossy(raw)))
            })?,
    };
    let strand: Strand = text(5)?.parse().map_err(|e: IntervalError| parse_err(e.to_string()))?;

    let extra = fields[BED6_FIELDS..]
        .iter()
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .collect();

    BedRecord::new(chrom, start, end, name, score, strand)
        .map(|r| r.with_extra_fields(extra))
        .map_err(|e| parse_err(e.to_string()))
}

fn parse_position(raw: &[u8], field_name: &str, line_number: usize) -> Result<u64> {
    parse_u64_fast(raw).ok_or_else(|| BedError::Parse {
        line: line_number,
        message: format!(
            "Invalid {} position: '{}'",
            field_name,
            String::from_utf8_lossy(raw)
        ),
    })
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let Some((&first, rest)) = bytes.split_first() {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let Some((&last, rest)) = bytes.split_last() {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

/// Read all BED records from a file.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<BedRecord>> {
    let reader = BedReader::from_path(path)?;
    reader.records().collect()
}

/// Parse records from a string (useful for testing).
pub fn parse_records(content: &str) -> Result<Vec<BedRecord>> {
    let reader = BedReader::new(content.as_bytes());
    reader.records().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bed6() {
        let content = "chr1\t100\t200\tgene1\t500\t+\n";
        let records = parse_records(content).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "gene1");
        assert_eq!(records[0].score, 500);
        assert_eq!(records[0].strand, Strand::Forward);
        assert!(records[0].extra_fields.is_empty());
    }

    #[test]
    fn test_parse_extra_fields() {
        let content = "1\t10\t11\tm6A\t0\t-\t10\t11\t0,0,0\t30\t50\n";
        let records = parse_records(content).unwrap();
        assert_eq!(records[0].extra_fields.len(), 5);
        assert_eq!(records[0].extra_fields[3], "30");
    }

    #[test]
    fn test_skip_comments() {
        let content = "# comment\ntrack name=test\nchr1\t100\t200\ta\t0\t.\n";
        let records = parse_records(content).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_rejects_bad_interval() {
        let err = parse_records("chr1\t200\t200\ta\t0\t+\n").unwrap_err();
        assert!(matches!(err, BedError::Parse { line: 1, .. }));
        assert!(parse_records("chr1\t300\t200\ta\t0\t+\n").is_err());
    }

    #[test]
    fn test_invalid_bed() {
        assert!(parse_records("chr1\t100\t200\n").is_err());
        assert!(parse_records("chr1\t100\t200\ta\t2000\t+\n").is_err());
        assert!(parse_records("chr1\t100\t200\ta\t0\tx\n").is_err());
    }
}
