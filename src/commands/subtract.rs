//! Subtract command implementation.
//!
//! Two modes: whole-feature (an A record survives untouched unless the
//! union of B covers all of it) and base-level (A is trimmed to the bases
//! B leaves uncovered).

use crate::bed::{read_records, BedError};
use crate::index::IntervalIndex;
use crate::interval::BedRecord;
use crate::parallel::{group_records_by_chromosome, map_chromosomes, sorted_chromosomes};
use crate::streaming::BedWriter;
use std::io::Write;
use std::path::Path;

/// What survives a subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubtractMode {
    /// Keep A in full if any base is left uncovered
    #[default]
    WholeFeature,
    /// Emit the uncovered fragments of A
    Bases,
}

/// Subtract command configuration.
#[derive(Debug, Clone, Default)]
pub struct SubtractCommand {
    pub mode: SubtractMode,
    /// Require same strand
    pub same_strand: bool,
}

impl SubtractCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: SubtractMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_strand(mut self, same_strand: bool) -> Self {
        self.same_strand = same_strand;
        self
    }

    /// Subtract B records from A records.
    pub fn subtract(&self, a_records: &[BedRecord], b_index: &IntervalIndex) -> Vec<BedRecord> {
        let mut results = Vec::new();

        for a in a_records {
            match self.mode {
                SubtractMode::WholeFeature => {
                    if !b_index.covers(a, self.same_strand) {
                        results.push(a.clone());
                    }
                }
                SubtractMode::Bases => {
                    let overlaps = b_index.find_overlaps(a, self.same_strand);
                    if overlaps.is_empty() {
                        results.push(a.clone());
                    } else {
                        subtract_fragments(a, &overlaps, &mut results);
                    }
                }
            }
        }

        results
    }

    /// Execute subtract on files; B files are subtracted as one union.
    pub fn run<P: AsRef<Path>, W: Write>(
        &self,
        a_path: P,
        b_paths: &[P],
        output: &mut W,
    ) -> Result<(), BedError> {
        let a_records = read_records(a_path)?;
        let mut b_records = Vec::new();
        for path in b_paths {
            b_records.extend(read_records(path)?);
        }

        let total = a_records.len() + b_records.len();
        let b_index = IntervalIndex::from_records(b_records);
        let a_by_chrom = group_records_by_chromosome(a_records);
        let chroms = sorted_chromosomes(&a_by_chrom);

        let buffers = map_chromosomes(&chroms, total, |chrom| {
            let kept = self.subtract(&a_by_chrom[chrom], &b_index);
            let mut buf = Vec::with_capacity(64 * 1024);
            {
                let mut writer = BedWriter::with_capacity(64 * 1024, &mut buf);
                for rec in &kept {
                    writer.write_record(rec)?;
                }
                writer.flush()?;
            }
            Ok::<_, BedError>(buf)
        });

        for buf in buffers {
            output.write_all(&buf?).map_err(BedError::Io)?;
        }
        Ok(())
    }
}

/// Subtract B intervals from A, pushing the uncovered fragments.
/// `b_sorted` must be in start order, as the index returns it.
fn subtract_fragments(a_rec: &BedRecord, b_sorted: &[&BedRecord], out: &mut Vec<BedRecord>) {
    let a_end = a_rec.end();
    let mut current_pos = a_rec.start();

    for b_rec in b_sorted {
        if b_rec.end() <= current_pos {
            continue;
        }
        if b_rec.start() >= a_end {
            break;
        }
        if b_rec.start() > current_pos {
            out.push(a_rec.with_coordinates(current_pos, b_rec.start()));
        }
        current_pos = current_pos.max(b_rec.end());
    }

    if current_pos < a_end {
        out.push(a_rec.with_coordinates(current_pos, a_end));
    }
}
