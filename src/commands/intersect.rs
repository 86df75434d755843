//! Intersect command implementation.
//!
//! Reports every overlapping (A, B) pair across one or more B sets
//! (`-wa -wb` semantics). Output order is A-major; ties between sets keep
//! the order in which the B sets were given.

use crate::bed::{read_records, BedError};
use crate::index::IntervalIndex;
use crate::interval::BedRecord;
use crate::parallel::{group_records_by_chromosome, map_chromosomes, sorted_chromosomes};
use crate::streaming::BedWriter;
use std::io::Write;
use std::path::Path;

/// Intersect command configuration.
#[derive(Debug, Clone, Default)]
pub struct IntersectCommand {
    /// Require same strand
    pub same_strand: bool,
}

/// One overlapping pair, by position in the inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectHit {
    pub a_index: usize,
    pub set_index: usize,
    pub b_index: usize,
}

impl IntersectCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set strand-aware matching.
    pub fn with_strand(mut self, same_strand: bool) -> Self {
        self.same_strand = same_strand;
        self
    }

    /// Find all intersecting pairs. `a` is walked in the given order.
    pub fn find_intersections(
        &self,
        a: &[BedRecord],
        b_sets: &[IntervalIndex],
    ) -> Vec<IntersectHit> {
        let mut hits = Vec::new();
        for (a_index, a_rec) in a.iter().enumerate() {
            for (set_index, b_index) in b_sets.iter().enumerate() {
                for idx in b_index.find_overlap_indices(a_rec, self.same_strand) {
                    hits.push(IntersectHit {
                        a_index,
                        set_index,
                        b_index: idx,
                    });
                }
            }
        }
        hits
    }

    /// Execute intersect on files.
    ///
    /// Each output line is the A record, the 0-based index of the B file
    /// and the B record, tab-separated.
    pub fn run<P: AsRef<Path>, W: Write>(
        &self,
        a_path: P,
        b_paths: &[P],
        output: &mut W,
    ) -> Result<(), BedError> {
        let a_records = read_records(a_path)?;
        let b_sets = b_paths
            .iter()
            .map(|p| read_records(p).map(IntervalIndex::from_records))
            .collect::<Result<Vec<_>, _>>()?;

        let total = a_records.len() + b_sets.iter().map(|s| s.len()).sum::<usize>();
        let a_by_chrom = group_records_by_chromosome(a_records);
        let chroms = sorted_chromosomes(&a_by_chrom);

        let buffers = map_chromosomes(&chroms, total, |chrom| {
            let a_list = &a_by_chrom[chrom];
            let hits = self.find_intersections(a_list, &b_sets);
            let mut buf = Vec::with_capacity(64 * 1024);
            {
                let mut writer = BedWriter::with_capacity(64 * 1024, &mut buf);
                for hit in hits {
                    writer.write_fields(&a_list[hit.a_index])?;
                    writer.write_tab()?;
                    writer.write_int(hit.set_index)?;
                    writer.write_tab()?;
                    let b_rec = b_sets[hit.set_index]
                        .get(hit.b_index)
                        .ok_or_else(|| BedError::InvalidFormat("dangling index".to_string()))?;
                    writer.write_record(b_rec)?;
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
