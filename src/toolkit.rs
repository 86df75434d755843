//! Typed adapter over the file-level interval commands.
//!
//! Every call stages its inputs as sorted BED files in fresh temporary
//! files, runs the command over those paths and decodes the tab-separated
//! output back into typed records. Nothing outside this module touches the
//! staged files or the raw output lines.

use crate::bed::{parse_record_fields, BedError};
use crate::commands::{
    ClosestCommand, ComplementCommand, IntersectCommand, MergeCommand, SubtractCommand,
    SubtractMode,
};
use crate::config::ToolkitConfig;
use crate::error::ErrorClass;
use crate::genome::Genome;
use crate::interval::{BedRecord, Strand};
use crate::record::ComparisonRecord;
use crate::streaming::parsing::{parse_u64_fast, split_fields};
use crate::streaming::{BedWriter, SortValidator};
use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Bed(#[from] BedError),

    #[error("cannot decode toolkit output line {line}: {message}")]
    Decode { line: usize, message: String },
}

impl ToolkitError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::ExternalTool
    }
}

pub type Result<T> = std::result::Result<T, ToolkitError>;

/// A record type that travels through the toolkit as a fixed-width BED line.
pub trait IntervalLike: Sized {
    /// Number of columns [`IntervalLike::to_bed`] produces.
    const FIELDS: usize;

    fn to_bed(&self) -> BedRecord;

    /// Rebuild the record from exactly [`IntervalLike::FIELDS`] columns.
    fn from_fields(fields: &[&[u8]], line: usize) -> Result<Self>;
}

impl IntervalLike for BedRecord {
    const FIELDS: usize = 6;

    fn to_bed(&self) -> BedRecord {
        self.clone().with_extra_fields(Vec::new())
    }

    fn from_fields(fields: &[&[u8]], line: usize) -> Result<Self> {
        Ok(parse_record_fields(fields, line)?)
    }
}

impl IntervalLike for ComparisonRecord {
    const FIELDS: usize = 12;

    fn to_bed(&self) -> BedRecord {
        self.bed.clone().with_extra_fields(vec![
            self.thick_start.to_string(),
            self.thick_end.to_string(),
            self.item_rgb.clone(),
            self.coverage.to_string(),
            self.frequency.to_string(),
            self.tag.clone(),
        ])
    }

    fn from_fields(fields: &[&[u8]], line: usize) -> Result<Self> {
        let bed = parse_record_fields(&fields[..6], line)?;
        let number = |idx: usize| {
            parse_u64_fast(fields[idx])
                .ok_or_else(|| decode_err(line, format!("bad number in column {}", idx + 1)))
        };
        let text = |idx: usize| String::from_utf8_lossy(fields[idx]).into_owned();
        Ok(Self {
            bed,
            thick_start: number(6)?,
            thick_end: number(7)?,
            item_rgb: text(8),
            coverage: u32::try_from(number(9)?)
                .map_err(|_| decode_err(line, "coverage overflows".into()))?,
            frequency: u8::try_from(number(10)?)
                .map_err(|_| decode_err(line, "frequency overflows".into()))?,
            tag: text(11),
        })
    }
}

fn decode_err(line: usize, message: String) -> ToolkitError {
    ToolkitError::Decode { line, message }
}

/// One overlapping pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntersectPair<A, B> {
    pub a: A,
    /// Position of the B set in the call's `b_list`
    pub set_index: usize,
    pub b: B,
}

/// Nearest B record of one A record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosestPair<A, B> {
    pub a: A,
    /// `None` when no B record lies on the same chromosome (and strand)
    pub hit: Option<ClosestHit<B>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosestHit<B> {
    pub set_index: usize,
    pub b: B,
    /// Signed distance relative to A, downstream positive
    pub distance: i64,
}

/// The adapter.
#[derive(Debug, Clone, Default)]
pub struct IntervalToolkit {
    temp_dir: Option<PathBuf>,
    assume_sorted: bool,
}

impl IntervalToolkit {
    pub fn new(config: &ToolkitConfig) -> Self {
        Self {
            temp_dir: config.temp_dir.clone(),
            assume_sorted: config.assume_sorted,
        }
    }

    /// A copy that sorts every input it stages.
    ///
    /// `assume_sorted` is a promise about caller-supplied records; sets the
    /// engine derives itself (GTF rows, partitions, stored records) carry no
    /// such promise and go through this copy.
    pub fn sorting(&self) -> Self {
        Self {
            temp_dir: self.temp_dir.clone(),
            assume_sorted: false,
        }
    }

    /// Write records to a fresh temporary BED file, sorted by (chrom, start).
    ///
    /// With `assume_sorted`, the order is verified instead of imposed.
    fn stage<T: IntervalLike>(&self, records: &[T]) -> Result<NamedTempFile> {
        let mut beds: Vec<BedRecord> = records.iter().map(IntervalLike::to_bed).collect();
        if self.assume_sorted {
            let mut validator = SortValidator::new();
            for bed in &beds {
                validator.check(bed)?;
            }
        } else {
            beds.sort_by(|a, b| a.chrom().cmp(b.chrom()).then(a.start().cmp(&b.start())));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("modbed-").suffix(".bed");
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        {
            let mut writer = BedWriter::new(file.as_file());
            for bed in &beds {
                writer.write_record(bed)?;
            }
            writer.flush()?;
        }
        Ok(file)
    }

    fn stage_sets<T: IntervalLike>(&self, sets: &[Vec<T>]) -> Result<Vec<NamedTempFile>> {
        sets.iter().map(|s| self.stage(s)).collect()
    }

    /// Every overlapping (a, b) pair across all B sets.
    pub fn intersect<A, B>(
        &self,
        a: &[A],
        b_list: &[Vec<B>],
        by_strand: bool,
    ) -> Result<Vec<IntersectPair<A, B>>>
    where
        A: IntervalLike,
        B: IntervalLike,
    {
        debug!("intersect: {} records against {} sets", a.len(), b_list.len());
        let a_file = self.stage(a)?;
        let b_files = self.stage_sets(b_list)?;
        let b_paths: Vec<&Path> = b_files.iter().map(NamedTempFile::path).collect();

        let mut out = Vec::new();
        IntersectCommand::new()
            .with_strand(by_strand)
            .run(a_file.path(), b_paths.as_slice(), &mut out)?;

        decode_lines(&out, A::FIELDS + 1 + B::FIELDS, |fields, line| {
            Ok(IntersectPair {
                a: A::from_fields(&fields[..A::FIELDS], line)?,
                set_index: parse_set_index(fields[A::FIELDS], line)?
                    .ok_or_else(|| decode_err(line, "missing set index".into()))?,
                b: B::from_fields(&fields[A::FIELDS + 1..], line)?,
            })
        })
    }

    /// Nearest non-overlapping B record(s) for each A record; all ties kept.
    pub fn closest<A, B>(
        &self,
        a: &[A],
        b_list: &[Vec<B>],
        by_strand: bool,
    ) -> Result<Vec<ClosestPair<A, B>>>
    where
        A: IntervalLike,
        B: IntervalLike,
    {
        debug!("closest: {} records against {} sets", a.len(), b_list.len());
        let a_file = self.stage(a)?;
        let b_files = self.stage_sets(b_list)?;
        let b_paths: Vec<&Path> = b_files.iter().map(NamedTempFile::path).collect();

        let mut out = Vec::new();
        ClosestCommand::new()
            .with_strand(by_strand)
            .run(a_file.path(), b_paths.as_slice(), &mut out)?;

        let mut pairs = Vec::new();
        for (idx, raw) in out.split(|&b| b == b'\n').enumerate() {
            if raw.is_empty() {
                continue;
            }
            let line = idx + 1;
            let fields = split_fields(raw);
            if fields.len() <= A::FIELDS {
                return Err(decode_err(line, format!("expected more than {} columns", A::FIELDS)));
            }
            let a_rec = A::from_fields(&fields[..A::FIELDS], line)?;
            let hit = match parse_set_index(fields[A::FIELDS], line)? {
                None => None,
                Some(set_index) => {
                    let expected = A::FIELDS + 2 + B::FIELDS;
                    if fields.len() != expected {
                        return Err(decode_err(
                            line,
                            format!("expected {} columns, got {}", expected, fields.len()),
                        ));
                    }
                    let b = B::from_fields(&fields[A::FIELDS + 1..expected - 1], line)?;
                    let distance = std::str::from_utf8(fields[expected - 1])
                        .ok()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or_else(|| decode_err(line, "bad distance".into()))?;
                    Some(ClosestHit {
                        set_index,
                        b,
                        distance,
                    })
                }
            };
            pairs.push(ClosestPair { a: a_rec, hit });
        }
        Ok(pairs)
    }

    /// A records not fully covered by the union of the B sets.
    pub fn subtract<A, B>(&self, a: &[A], b_union: &[Vec<B>], by_strand: bool) -> Result<Vec<A>>
    where
        A: IntervalLike,
        B: IntervalLike,
    {
        self.run_subtract(a, b_union, by_strand, SubtractMode::WholeFeature)
    }

    /// The bases of A left uncovered by the union of the B sets.
    pub fn subtract_bases<A, B>(
        &self,
        a: &[A],
        b_union: &[Vec<B>],
        by_strand: bool,
    ) -> Result<Vec<A>>
    where
        A: IntervalLike,
        B: IntervalLike,
    {
        self.run_subtract(a, b_union, by_strand, SubtractMode::Bases)
    }

    fn run_subtract<A, B>(
        &self,
        a: &[A],
        b_union: &[Vec<B>],
        by_strand: bool,
        mode: SubtractMode,
    ) -> Result<Vec<A>>
    where
        A: IntervalLike,
        B: IntervalLike,
    {
        debug!("subtract ({:?}): {} records", mode, a.len());
        let a_file = self.stage(a)?;
        let b_files = self.stage_sets(b_union)?;
        let b_paths: Vec<&Path> = b_files.iter().map(NamedTempFile::path).collect();

        let mut out = Vec::new();
        SubtractCommand::new()
            .with_mode(mode)
            .with_strand(by_strand)
            .run(a_file.path(), b_paths.as_slice(), &mut out)?;

        decode_lines(&out, A::FIELDS, A::from_fields)
    }

    /// Merge overlapping and book-ended records; names are collapsed.
    pub fn merge(&self, records: &[BedRecord], by_strand: bool) -> Result<Vec<BedRecord>> {
        let file = self.stage(records)?;
        let mut out = Vec::new();
        MergeCommand::new().with_strand(by_strand).run(file.path(), &mut out)?;
        decode_lines(&out, BedRecord::FIELDS, BedRecord::from_fields)
    }

    /// Regions of `genome` not covered by `records`, stamped with `name` and
    /// `strand`.
    pub fn complement(
        &self,
        records: &[BedRecord],
        genome: &Genome,
        name: &str,
        strand: Strand,
    ) -> Result<Vec<BedRecord>> {
        let file = self.stage(records)?;
        let mut out = Vec::new();
        ComplementCommand::new()
            .with_name(name)
            .with_strand(strand)
            .run(file.path(), genome, &mut out)?;
        decode_lines(&out, BedRecord::FIELDS, BedRecord::from_fields)
    }
}

/// Decode `\n`-separated output lines of a fixed width.
fn decode_lines<T, F>(out: &[u8], width: usize, mut decode: F) -> Result<Vec<T>>
where
    F: FnMut(&[&[u8]], usize) -> Result<T>,
{
    let mut decoded = Vec::new();
    for (idx, raw) in out.split(|&b| b == b'\n').enumerate() {
        if raw.is_empty() {
            continue;
        }
        let fields = split_fields(raw);
        if fields.len() != width {
            return Err(decode_err(
                idx + 1,
                format!("expected {} columns, got {}", width, fields.len()),
            ));
        }
        decoded.push(decode(&fields, idx + 1)?);
    }
    Ok(decoded)
}

/// `-1` marks the "no match" row of closest.
fn parse_set_index(raw: &[u8], line: usize) -> Result<Option<usize>> {
    if raw == b"-1" {
        return Ok(None);
    }
    parse_u64_fast(raw)
        .map(|n| Some(n as usize))
        .ok_or_else(|| {
            decode_err(line, format!("bad set index '{}'", String::from_utf8_lossy(raw)))
        })
}
