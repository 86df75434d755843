//! Coordinates, strand and the BED6 record every engine passes around.
//!
//! Coordinates are 0-based and half-open throughout the crate. Conversions
//! from 1-based inputs (GTF) happen in the readers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest score a BED record may carry.
pub const MAX_SCORE: u16 = 1000;

/// Errors raised when an interval or record violates its invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("chromosome name is empty")]
    EmptyChrom,

    #[error("invalid interval {chrom}:{start}-{end}: start must be less than end")]
    InvalidRange { chrom: String, start: u64, end: u64 },

    #[error("score {0} is outside 0-1000")]
    ScoreOutOfRange(u64),

    #[error("invalid strand '{0}'")]
    InvalidStrand(String),
}

/// `chrom:[start, end)` with `start < end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl Interval {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Result<Self, IntervalError> {
        let chrom = chrom.into();
        if chrom.is_empty() {
            return Err(IntervalError::EmptyChrom);
        }
        if start >= end {
            return Err(IntervalError::InvalidRange { chrom, start, end });
        }
        Ok(Self { chrom, start, end })
    }

    /// Build an interval whose invariants the caller already holds,
    /// e.g. a fragment cut out of a valid interval.
    #[inline]
    pub(crate) fn new_unchecked(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        debug_assert!(start < end);
        Self {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// At least one shared base. Book-ended intervals do not overlap.
    #[inline]
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.chrom == other.chrom && self.start < other.end && other.start < self.end
    }

    /// Whether `self` lies entirely inside `other`.
    #[inline]
    pub fn within(&self, other: &Interval) -> bool {
        self.chrom == other.chrom && other.start <= self.start && self.end <= other.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.chrom, self.start, self.end)
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chrom
            .cmp(&other.chrom)
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Strand orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Forward,
    Reverse,
    Undefined,
}

impl Strand {
    pub fn as_char(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
            Strand::Undefined => '.',
        }
    }

    /// Opposite orientation; `Undefined` stays undefined.
    pub fn flip(self) -> Self {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
            Strand::Undefined => Strand::Undefined,
        }
    }

    /// Whether two strands are compatible under the given strand mode.
    ///
    /// In strand-aware mode only identical, defined strands match.
    #[inline]
    pub fn compatible(self, other: Strand, by_strand: bool) -> bool {
        !by_strand || (self == other && self != Strand::Undefined)
    }
}

impl FromStr for Strand {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            "." => Ok(Strand::Undefined),
            other => Err(IntervalError::InvalidStrand(other.to_string())),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A BED6 record with any additional columns carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedRecord {
    pub interval: Interval,
    pub name: String,
    pub score: u16,
    pub strand: Strand,
    /// Columns beyond BED6, in file order
    pub extra_fields: Vec<String>,
}

impl BedRecord {
    /// Create a BED6 record, validating coordinates and score.
    pub fn new(
        chrom: impl Into<String>,
        start: u64,
        end: u64,
        name: impl Into<String>,
        score: u16,
        strand: Strand,
    ) -> Result<Self, IntervalError> {
        if score > MAX_SCORE {
            return Err(IntervalError::ScoreOutOfRange(score as u64));
        }
        Ok(Self {
            interval: Interval::new(chrom, start, end)?,
            name: name.into(),
            score,
            strand,
            extra_fields: Vec::new(),
        })
    }

    pub fn with_extra_fields(mut self, fields: Vec<String>) -> Self {
        self.extra_fields = fields;
        self
    }

    /// Copy of this record with different coordinates.
    pub(crate) fn with_coordinates(&self, start: u64, end: u64) -> Self {
        let mut record = self.clone();
        record.interval = Interval::new_unchecked(self.interval.chrom.clone(), start, end);
        record
    }

    #[inline]
    pub fn chrom(&self) -> &str {
        &self.interval.chrom
    }

    #[inline]
    pub fn start(&self) -> u64 {
        self.interval.start
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.interval.end
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.interval.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.interval.is_empty()
    }

    /// Overlap test honouring strand mode.
    #[inline]
    pub fn overlaps(&self, other: &BedRecord, by_strand: bool) -> bool {
        self.strand.compatible(other.strand, by_strand) && self.interval.overlaps(&other.interval)
    }

    /// Number of columns this record writes.
    pub fn field_count(&self) -> usize {
        6 + self.extra_fields.len()
    }
}

impl fmt::Display for BedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.interval, self.name, self.score, self.strand
        )?;
        for field in &self.extra_fields {
            write!(f, "\t{}", field)?;
        }
        Ok(())
    }
}

impl Ord for BedRecord {
    /// Chrom-major, start-minor; remaining columns only break exact ties.
    fn cmp(&self, other: &Self) -> Ordering {
        self.interval
            .cmp(&other.interval)
            .then(self.strand.cmp(&other.strand))
            .then_with(|| self.name.cmp(&other.name))
            .then(self.score.cmp(&other.score))
            .then_with(|| self.extra_fields.cmp(&other.extra_fields))
    }
}

impl PartialOrd for BedRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
