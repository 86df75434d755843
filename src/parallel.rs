//! Per-chromosome work distribution using Rayon.
//!
//! Toolkit commands split their input by chromosome, process each
//! chromosome independently and concatenate the results in sorted
//! chromosome order, so the output never depends on scheduling.

use crate::interval::BedRecord;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// Minimum number of records before enabling parallelization.
/// Below this threshold, sequential processing is faster due to
/// thread spawn overhead.
pub const PARALLEL_THRESHOLD: usize = 10_000;

/// Group BED records by chromosome, sorting each group positionally.
pub fn group_records_by_chromosome(records: Vec<BedRecord>) -> FxHashMap<String, Vec<BedRecord>> {
    let mut groups: FxHashMap<String, Vec<BedRecord>> = FxHashMap::default();

    for record in records {
        groups
            .entry(record.chrom().to_string())
            .or_default()
            .push(record);
    }

    for list in groups.values_mut() {
        // Stable so equal records keep their input order.
        list.sort();
    }

    groups
}

/// Sorted chromosome names of a grouping.
pub fn sorted_chromosomes<T>(groups: &FxHashMap<String, T>) -> Vec<String> {
    let mut chroms: Vec<String> = groups.keys().cloned().collect();
    chroms.sort();
    chroms
}

/// Run `f` for every chromosome and return the outputs in chromosome order.
///
/// Work fans out over the Rayon pool once `total` reaches
/// [`PARALLEL_THRESHOLD`]; the result order is the same either way.
pub fn map_chromosomes<F, T>(chroms: &[String], total: usize, f: F) -> Vec<T>
where
    F: Fn(&str) -> T + Sync + Send,
    T: Send,
{
    if total < PARALLEL_THRESHOLD {
        chroms.iter().map(|c| f(c)).collect()
    } else {
        chroms.par_iter().map(|c| f(c)).collect()
    }
}

/// Parallel sort of BED records into chrom-major, start-minor order.
pub fn parallel_sort_records(mut records: Vec<BedRecord>) -> Vec<BedRecord> {
    records.par_sort();
    records
}
