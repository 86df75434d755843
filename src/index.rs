//! Interval indexing for fast overlap queries.

use crate::interval::BedRecord;
use rustc_hash::FxHashMap;

/// Sorted intervals of one chromosome plus a running maximum of their ends,
/// which turns "first interval that can still reach the query" into a
/// binary search.
#[derive(Debug, Default)]
struct ChromBucket {
    /// (record index, start, end), sorted by start then end
    entries: Vec<(usize, u64, u64)>,
    max_end_prefix: Vec<u64>,
}

impl ChromBucket {
    fn finalize(&mut self) {
        self.entries
            .sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));
        let mut max_end = 0u64;
        self.max_end_prefix = self
            .entries
            .iter()
            .map(|e| {
                max_end = max_end.max(e.2);
                max_end
            })
            .collect();
    }

    /// Positions in `entries` that overlap [start, end).
    fn overlapping(&self, start: u64, end: u64) -> impl Iterator<Item = &(usize, u64, u64)> {
        let lo = self.max_end_prefix.partition_point(|&m| m <= start);
        let hi = self.entries.partition_point(|e| e.1 < end);
        self.entries[lo..hi.max(lo)]
            .iter()
            .filter(move |e| e.2 > start)
    }
}

/// An indexed collection of records organized by chromosome.
/// Uses a sorted list with binary search for efficient queries.
pub struct IntervalIndex {
    by_chrom: FxHashMap<String, ChromBucket>,
    records: Vec<BedRecord>,
}

impl IntervalIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self {
            by_chrom: FxHashMap::default(),
            records: Vec::new(),
        }
    }

    /// Build an index from BED records.
    pub fn from_records(records: Vec<BedRecord>) -> Self {
        let mut by_chrom: FxHashMap<String, ChromBucket> = FxHashMap::default();

        for (idx, record) in records.iter().enumerate() {
            by_chrom
                .entry(record.chrom().to_string())
                .or_default()
                .entries
                .push((idx, record.start(), record.end()));
        }

        for bucket in by_chrom.values_mut() {
            bucket.finalize();
        }

        Self { by_chrom, records }
    }

    /// Find all records overlapping a query, in positional order.
    pub fn find_overlaps(&self, query: &BedRecord, by_strand: bool) -> Vec<&BedRecord> {
        self.find_overlap_indices(query, by_strand)
            .into_iter()
            .map(|idx| &self.records[idx])
            .collect()
    }

    /// Find all records overlapping a query, returning their indices.
    pub fn find_overlap_indices(&self, query: &BedRecord, by_strand: bool) -> Vec<usize> {
        let Some(bucket) = self.by_chrom.get(query.chrom()) else {
            return Vec::new();
        };
        bucket
            .overlapping(query.start(), query.end())
            .filter(|e| query.strand.compatible(self.records[e.0].strand, by_strand))
            .map(|e| e.0)
            .collect()
    }

    /// Check whether the union of overlapping records covers every base of
    /// the query.
    pub fn covers(&self, query: &BedRecord, by_strand: bool) -> bool {
        let Some(bucket) = self.by_chrom.get(query.chrom()) else {
            return false;
        };
        let mut covered_to = query.start();
        for e in bucket.overlapping(query.start(), query.end()) {
            if !query.strand.compatible(self.records[e.0].strand, by_strand) {
                continue;
            }
            // Entries arrive sorted by start, so a gap cannot be closed later.
            if e.1 > covered_to {
                return false;
            }
            covered_to = covered_to.max(e.2);
            if covered_to >= query.end() {
                return true;
            }
        }
        false
    }

    /// Get a record by index.
    pub fn get(&self, index: usize) -> Option<&BedRecord> {
        self.records.get(index)
    }

    /// Get the total number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for IntervalIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Strand;

    fn rec(chrom: &str, start: u64, end: u64, strand: Strand) -> BedRecord {
        BedRecord::new(chrom, start, end, ".", 0, strand).unwrap()
    }

    fn sample_index() -> IntervalIndex {
        IntervalIndex::from_records(vec![
            rec("chr1", 100, 200, Strand::Forward),
            rec("chr1", 150, 250, Strand::Reverse),
            rec("chr1", 300, 400, Strand::Forward),
            rec("chr2", 100, 200, Strand::Forward),
            rec("chr1", 10, 1000, Strand::Undefined),
        ])
    }

    #[test]
    fn test_find_overlaps_unstranded() {
        let index = sample_index();
        let query = rec("chr1", 175, 225, Strand::Forward);
        assert_eq!(index.find_overlap_indices(&query, false), vec![4, 0, 1]);
    }

    #[test]
    fn test_find_overlaps_stranded() {
        let index = sample_index();
        let query = rec("chr1", 175, 225, Strand::Forward);
        assert_eq!(index.find_overlap_indices(&query, true), vec![0]);

        let undefined = rec("chr1", 175, 225, Strand::Undefined);
        assert!(index.find_overlaps(&undefined, true).is_empty());
    }

    #[test]
    fn test_long_interval_found_after_short_ones() {
        // The long record starts first but ends last; the prefix max keeps it.
        let index = sample_index();
        let query = rec("chr1", 900, 950, Strand::Undefined);
        assert_eq!(index.find_overlap_indices(&query, false), vec![4]);
    }

    #[test]
    fn test_covers() {
        let index = IntervalIndex::from_records(vec![
            rec("chr1", 100, 150, Strand::Forward),
            rec("chr1", 150, 200, Strand::Forward),
            rec("chr1", 250, 300, Strand::Forward),
        ]);
        assert!(index.covers(&rec("chr1", 120, 180, Strand::Forward), true));
        assert!(!index.covers(&rec("chr1", 180, 260, Strand::Forward), true));
        assert!(!index.covers(&rec("chr1", 120, 180, Strand::Reverse), true));
        assert!(!index.covers(&rec("chr3", 1, 2, Strand::Forward), false));
    }

    #[test]
    fn test_different_chrom() {
        let index = sample_index();
        let query = rec("chr3", 100, 200, Strand::Forward);
        assert!(index.find_overlaps(&query, false).is_empty());
        assert_eq!(index.len(), 5);
    }
}
