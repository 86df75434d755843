//! Complement command implementation.
//!
//! Returns genomic regions NOT covered by intervals, clipped to the
//! chromosome sizes of a genome. Chromosomes are emitted in name order.

use crate::bed::{BedError, BedReader};
use crate::genome::Genome;
use crate::interval::{BedRecord, Interval, Strand};
use crate::streaming::BedWriter;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complement command configuration.
#[derive(Debug, Clone)]
pub struct ComplementCommand {
    /// Name stamped on every gap
    pub name: String,
    /// Strand stamped on every gap
    pub strand: Strand,
}

impl Default for ComplementCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplementCommand {
    pub fn new() -> Self {
        Self {
            name: ".".to_string(),
            strand: Strand::Undefined,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }

    /// Compute the complement of `records` against `genome`.
    ///
    /// Records on chromosomes the genome does not know are ignored.
    /// Chromosomes without any record are returned whole.
    pub fn complement(&self, records: &[BedRecord], genome: &Genome) -> Vec<BedRecord> {
        let mut by_chrom: FxHashMap<&str, Vec<(u64, u64)>> = FxHashMap::default();
        for rec in records {
            if genome.has_chrom(rec.chrom()) {
                by_chrom
                    .entry(rec.chrom())
                    .or_default()
                    .push((rec.start(), rec.end()));
            }
        }

        let mut chroms: Vec<&String> = genome.chromosomes().collect();
        chroms.sort();

        let mut result = Vec::new();
        for chrom in chroms {
            let Some(chrom_size) = genome.chrom_size(chrom) else {
                continue;
            };
            let mut spans = by_chrom.remove(chrom.as_str()).unwrap_or_default();
            spans.sort_unstable();
            for (start, end) in find_gaps(&spans, chrom_size) {
                result.push(self.stamp(chrom, start, end));
            }
        }
        result
    }

    fn stamp(&self, chrom: &str, start: u64, end: u64) -> BedRecord {
        BedRecord {
            interval: Interval::new_unchecked(chrom, start, end),
            name: self.name.clone(),
            score: 0,
            strand: self.strand,
            extra_fields: Vec::new(),
        }
    }

    /// Run complement on a file.
    pub fn run<P: AsRef<Path>, W: Write>(
        &self,
        input: P,
        genome: &Genome,
        output: &mut W,
    ) -> Result<(), BedError> {
        let reader = BedReader::new(File::open(input)?);
        let records = reader.records().collect::<Result<Vec<_>, _>>()?;

        let mut writer = BedWriter::new(output);
        for rec in self.complement(&records, genome) {
            writer.write_record(&rec)?;
        }
        writer.flush()
    }
}

/// Gaps between position-sorted spans on a chromosome of `chrom_size` bases.
fn find_gaps(spans: &[(u64, u64)], chrom_size: u64) -> Vec<(u64, u64)> {
    let mut gaps = Vec::new();
    let mut prev_end: u64 = 0;

    for &(start, end) in spans {
        let start = start.min(chrom_size);
        if start > prev_end {
            gaps.push((prev_end, start));
        }
        prev_end = prev_end.max(end.min(chrom_size));
    }

    if prev_end < chrom_size {
        gaps.push((prev_end, chrom_size));
    }
    gaps
}
