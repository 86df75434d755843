//! Closest command implementation - find nearest intervals.
//!
//! Uses O(log m) binary searches per query over B candidates that are
//! pre-sorted by start and by end. Overlapping B records are never
//! candidates. Every equidistant candidate is reported.
//! Distances follow bedtools `-D a`: book-ended features are 1 apart,
//! downstream of A is positive and the sign follows A's strand.

use crate::bed::{read_records, BedError};
use crate::interval::{BedRecord, Strand};
use crate::parallel::{group_records_by_chromosome, map_chromosomes, sorted_chromosomes};
use crate::streaming::BedWriter;
use rustc_hash::FxHashMap;
use std::io::Write;
use std::path::Path;

/// Closest command configuration.
#[derive(Debug, Clone)]
pub struct ClosestCommand {
    /// Require same strand
    pub same_strand: bool,
}

impl Default for ClosestCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// One nearest B record for an A record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosestHit {
    pub set_index: usize,
    pub b_index: usize,
    /// Signed distance relative to A (negative = upstream)
    pub distance: i64,
}

/// Result of a closest query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosestResult {
    pub a_index: usize,
    pub hits: Vec<ClosestHit>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    set_index: usize,
    b_index: usize,
    start: u64,
    end: u64,
}

/// B candidates of one (chromosome, strand) bucket.
#[derive(Debug, Default)]
struct CandidateList {
    by_start: Vec<Candidate>,
    /// Indices into `by_start`, ordered by end
    by_end: Vec<usize>,
}

impl CandidateList {
    fn finalize(&mut self) {
        self.by_start.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(a.end.cmp(&b.end))
                .then(a.set_index.cmp(&b.set_index))
                .then(a.b_index.cmp(&b.b_index))
        });
        let mut by_end: Vec<usize> = (0..self.by_start.len()).collect();
        by_end.sort_by_key(|&i| self.by_start[i].end);
        self.by_end = by_end;
    }
}

type BucketKey = (String, Option<Strand>);

impl ClosestCommand {
    pub fn new() -> Self {
        Self { same_strand: false }
    }

    /// Set strand-aware matching.
    pub fn with_strand(mut self, same_strand: bool) -> Self {
        self.same_strand = same_strand;
        self
    }

    fn bucket_strand(&self, strand: Strand) -> Option<Strand> {
        if self.same_strand {
            Some(strand)
        } else {
            None
        }
    }

    fn build_buckets(&self, b_sets: &[Vec<BedRecord>]) -> FxHashMap<BucketKey, CandidateList> {
        let mut buckets: FxHashMap<BucketKey, CandidateList> = FxHashMap::default();
        for (set_index, set) in b_sets.iter().enumerate() {
            for (b_index, b) in set.iter().enumerate() {
                if self.same_strand && b.strand == Strand::Undefined {
                    continue;
                }
                buckets
                    .entry((b.chrom().to_string(), self.bucket_strand(b.strand)))
                    .or_default()
                    .by_start
                    .push(Candidate {
                        set_index,
                        b_index,
                        start: b.start(),
                        end: b.end(),
                    });
            }
        }
        for list in buckets.values_mut() {
            list.finalize();
        }
        buckets
    }

    /// Find the closest B records for each A record.
    pub fn find_closest(&self, a: &[BedRecord], b_sets: &[Vec<BedRecord>]) -> Vec<ClosestResult> {
        let buckets = self.build_buckets(b_sets);
        a.iter()
            .enumerate()
            .map(|(a_index, a_rec)| {
                let hits = if self.same_strand && a_rec.strand == Strand::Undefined {
                    Vec::new()
                } else {
                    let key = (a_rec.chrom().to_string(), self.bucket_strand(a_rec.strand));
                    buckets
                        .get(&key)
                        .map(|list| self.closest_in_list(a_rec, list))
                        .unwrap_or_default()
                };
                ClosestResult { a_index, hits }
            })
            .collect()
    }

    /// Nearest candidates for one query.
    fn closest_in_list(&self, a: &BedRecord, list: &CandidateList) -> Vec<ClosestHit> {
        let (a_start, a_end) = (a.start(), a.end());
        let mut picked: Vec<(&Candidate, i64)> = Vec::new();

        // Downstream: first B with start >= A.end, plus ties on start
        let ds = list.by_start.partition_point(|c| c.start < a_end);
        let downstream: Vec<&Candidate> = match list.by_start.get(ds) {
            Some(first) => list.by_start[ds..]
                .iter()
                .take_while(|c| c.start == first.start)
                .collect(),
            None => Vec::new(),
        };
        let down_dist = downstream.first().map(|c| (c.start - a_end + 1) as i64);

        // Upstream: B with the largest end <= A.start, plus ties on end
        let us = list
            .by_end
            .partition_point(|&i| list.by_start[i].end <= a_start);
        let upstream: Vec<&Candidate> = if us > 0 {
            let best_end = list.by_start[list.by_end[us - 1]].end;
            list.by_end[..us]
                .iter()
                .rev()
                .map(|&i| &list.by_start[i])
                .take_while(|c| c.end == best_end)
                .collect()
        } else {
            Vec::new()
        };
        let up_dist = upstream.first().map(|c| -((a_start - c.end + 1) as i64));

        let best = match (up_dist, down_dist) {
            (Some(u), Some(d)) => u.abs().min(d),
            (Some(u), None) => u.abs(),
            (None, Some(d)) => d,
            (None, None) => return Vec::new(),
        };
        if let Some(u) = up_dist.filter(|u| u.abs() == best) {
            picked.extend(upstream.into_iter().map(|c| (c, u)));
        }
        if let Some(d) = down_dist.filter(|&d| d == best) {
            picked.extend(downstream.into_iter().map(|c| (c, d)));
        }

        let flip = a.strand == Strand::Reverse;
        let mut hits: Vec<ClosestHit> = picked
            .into_iter()
            .map(|(c, d)| ClosestHit {
                set_index: c.set_index,
                b_index: c.b_index,
                distance: if flip { -d } else { d },
            })
            .collect();
        hits.sort_by(|x, y| {
            x.set_index
                .cmp(&y.set_index)
                .then(x.b_index.cmp(&y.b_index))
        });
        hits
    }

    /// Execute closest on files.
    ///
    /// Output lines are the A record, the B file index, the B record and
    /// the signed distance. An A record without any candidate gets a single
    /// line with B file index `-1`, `.` and `-1` placeholders.
    pub fn run<P: AsRef<Path>, W: Write>(
        &self,
        a_path: P,
        b_paths: &[P],
        output: &mut W,
    ) -> Result<(), BedError> {
        let a_records = read_records(a_path)?;
        let b_sets = b_paths
            .iter()
            .map(read_records)
            .collect::<Result<Vec<_>, _>>()?;
        let b_width = b_sets
            .iter()
            .flat_map(|s| s.first())
            .map(|r| r.field_count())
            .max()
            .unwrap_or(6);

        let total = a_records.len() + b_sets.iter().map(|s| s.len()).sum::<usize>();
        let a_by_chrom = group_records_by_chromosome(a_records);
        let chroms = sorted_chromosomes(&a_by_chrom);

        let buffers = map_chromosomes(&chroms, total, |chrom| {
            let a_list = &a_by_chrom[chrom];
            let results = self.find_closest(a_list, &b_sets);
            let mut buf = Vec::with_capacity(64 * 1024);
            {
                let mut writer = BedWriter::with_capacity(64 * 1024, &mut buf);
                for result in results {
                    let a_rec = &a_list[result.a_index];
                    if result.hits.is_empty() {
                        writer.write_fields(a_rec)?;
                        write_no_closest(&mut writer, b_width)?;
                        continue;
                    }
                    for hit in result.hits {
                        writer.write_fields(a_rec)?;
                        writer.write_tab()?;
                        writer.write_int(hit.set_index)?;
                        writer.write_tab()?;
                        writer.write_fields(&b_sets[hit.set_index][hit.b_index])?;
                        writer.write_tab()?;
                        writer.write_int(hit.distance)?;
                        writer.write_newline()?;
                    }
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

/// Write the "no closest found" tail: set index, placeholder B columns and
/// distance.
fn write_no_closest<W: Write>(writer: &mut BedWriter<W>, b_width: usize) -> Result<(), BedError> {
    writer.write_bytes(b"\t-1\t.\t-1\t-1")?;
    for _ in 3..b_width {
        writer.write_bytes(b"\t.")?;
    }
    writer.write_bytes(b"\t-1")?;
    writer.write_newline()
}
