//! bedRMod (EUF) reader.
//!
//! A bedRMod file is a `#key=value` header followed by BED6+5 data lines:
//! `chrom start end name score strand thickStart thickEnd itemRgb coverage
//! frequency`. Data lines are parsed through the BED reader, so coordinate
//! validation is shared with every other interval input.

use crate::bed::{parse_record_line, BedError};
use crate::error::ErrorClass;
use crate::interval::BedRecord;
use crate::record::{ComparisonRecord, DatasetId, ModificationRecord, RecordError};
use crate::streaming::parsing::{parse_u64_fast, should_skip_line, trim_line_end};
use log::warn;
use rustc_hash::FxHashMap;
use std::io::{self, BufRead, BufReader, Read};
use thiserror::Error;

/// Format versions this reader accepts.
pub const SUPPORTED_VERSIONS: &[&str] = &["bedRModv1.6", "bedRModv1.7", "bedRModv1.8"];

/// Keys that must be present and non-empty.
pub const REQUIRED_KEYS: &[&str] = &[
    "fileformat",
    "organism",
    "modification_type",
    "assembly",
    "annotation_source",
    "annotation_version",
];

/// Keys that may be present.
pub const OPTIONAL_KEYS: &[&str] = &[
    "sequencing_platform",
    "basecalling",
    "bioinformatics_workflow",
    "experiment",
    "external_source",
];

/// Columns of a data line.
pub const EUF_FIELDS: usize = 11;

#[derive(Error, Debug)]
pub enum EufError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("header line {line}: {message}")]
    Header { line: usize, message: String },

    #[error("missing or empty header field '{0}'")]
    MissingField(String),

    #[error("unsupported format version '{0}'")]
    UnsupportedVersion(String),

    #[error("line {line}: {message}")]
    Record { line: usize, message: String },
}

impl EufError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EufError::Io(_) => ErrorClass::ExternalTool,
            EufError::Record { .. } => ErrorClass::DataQuality,
            _ => ErrorClass::Specification,
        }
    }
}

/// Parsed bedRMod header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EufHeader {
    fields: FxHashMap<String, String>,
}

impl EufHeader {
    /// Parse `#key=value` lines until the first line that is not a comment.
    ///
    /// The column-name line (`#chrom\tchromStart...`) carries no `=` and is
    /// skipped. The header is not validated here; see [`EufHeader::validate`].
    pub fn parse<R: Read>(reader: R) -> Result<Self, EufError> {
        let mut header = Self::default();
        for (idx, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let Some(body) = line.strip_prefix('#') else {
                break;
            };
            let Some((key, value)) = body.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(EufError::Header {
                    line: idx + 1,
                    message: "empty key".to_string(),
                });
            }
            header.fields.insert(key.to_string(), value.trim().to_string());
        }
        Ok(header)
    }

    /// Check the format version and required fields.
    pub fn validate(&self) -> Result<(), EufError> {
        let version = self.get("fileformat").unwrap_or_default();
        if !version.is_empty() && !SUPPORTED_VERSIONS.contains(&version) {
            return Err(EufError::UnsupportedVersion(version.to_string()));
        }
        for key in REQUIRED_KEYS {
            if self.get(key).map_or(true, str::is_empty) {
                return Err(EufError::MissingField(key.to_string()));
            }
        }
        for key in self.unknown_keys() {
            warn!("ignoring unknown header field '{}'", key);
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Organism field as an NCBI taxonomy id.
    pub fn taxa_id(&self) -> Result<u32, EufError> {
        let raw = self
            .get("organism")
            .ok_or_else(|| EufError::MissingField("organism".to_string()))?;
        raw.parse().map_err(|_| EufError::Header {
            line: 0,
            message: format!("organism '{}' is not a taxonomy id", raw),
        })
    }

    /// Keys that are neither required nor optional, sorted.
    pub fn unknown_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .fields
            .keys()
            .map(String::as_str)
            .filter(|k| !REQUIRED_KEYS.contains(k) && !OPTIONAL_KEYS.contains(k))
            .collect();
        keys.sort_unstable();
        keys
    }
}

/// One bedRMod data line before it is bound to a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EufRecord {
    pub bed: BedRecord,
    pub thick_start: u64,
    pub thick_end: u64,
    pub item_rgb: String,
    pub coverage: u32,
    pub frequency: u8,
}

impl EufRecord {
    pub fn into_modification(
        self,
        dataset_id: DatasetId,
    ) -> Result<ModificationRecord, RecordError> {
        ModificationRecord::new(
            self.bed,
            self.thick_start,
            self.thick_end,
            self.item_rgb,
            self.coverage,
            self.frequency,
            dataset_id,
        )
    }

    pub fn into_comparison(self, tag: impl Into<String>) -> ComparisonRecord {
        ComparisonRecord {
            bed: self.bed.with_extra_fields(Vec::new()),
            thick_start: self.thick_start,
            thick_end: self.thick_end,
            item_rgb: self.item_rgb,
            coverage: self.coverage,
            frequency: self.frequency,
            tag: tag.into(),
        }
    }
}

/// Parse one data line.
pub fn parse_euf_line(line: &[u8], line_number: usize) -> Result<EufRecord, EufError> {
    let record_err = |message: String| EufError::Record {
        line: line_number,
        message,
    };

    let bed = parse_record_line(line, line_number).map_err(|e| match e {
        BedError::Parse { message, .. } => record_err(message),
        other => record_err(other.to_string()),
    })?;
    let extra = &bed.extra_fields;
    if extra.len() + 6 != EUF_FIELDS {
        return Err(record_err(format!(
            "expected {} fields, got {}",
            EUF_FIELDS,
            extra.len() + 6
        )));
    }

    let number = |idx: usize, name: &str| {
        parse_u64_fast(extra[idx].as_bytes())
            .ok_or_else(|| record_err(format!("invalid {}: '{}'", name, extra[idx])))
    };
    let thick_start = number(0, "thickStart")?;
    let thick_end = number(1, "thickEnd")?;
    let coverage = u32::try_from(number(3, "coverage")?)
        .map_err(|_| record_err(format!("coverage {} overflows", extra[3])))?;
    let frequency = u8::try_from(number(4, "frequency")?)
        .map_err(|_| record_err(format!("frequency {} is outside 1-100", extra[4])))?;
    let item_rgb = extra[2].clone();

    Ok(EufRecord {
        bed: bed.with_extra_fields(Vec::new()),
        thick_start,
        thick_end,
        item_rgb,
        coverage,
        frequency,
    })
}

/// Streaming reader over data lines; header and comment lines are skipped.
pub struct EufReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    buffer: Vec<u8>,
}

impl<R: Read> EufReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            buffer: Vec::with_capacity(256),
        }
    }

    /// Next data line. `Ok(Some(Err(..)))` is a malformed line the caller
    /// may skip; `Err` is an I/O failure.
    pub fn next_line(&mut self) -> Result<Option<Result<EufRecord, EufError>>, EufError> {
        loop {
            self.buffer.clear();
            if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = trim_line_end(&self.buffer);
            if should_skip_line(line) {
                continue;
            }
            return Ok(Some(parse_euf_line(line, self.line_number)));
        }
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }
}
