//! Merge command implementation.
//!
//! Uses O(n log n) sort + O(n) single-pass sweep-line merge. Names of the
//! merged records are collapsed into a distinct, delimiter-joined list.

use crate::bed::{read_records, BedError};
use crate::interval::{BedRecord, Interval, Strand};
use crate::parallel::parallel_sort_records;
use crate::streaming::BedWriter;
use std::io::Write;
use std::path::Path;

/// Merge command configuration.
#[derive(Debug, Clone)]
pub struct MergeCommand {
    /// Require strand to match for merging
    pub strand_specific: bool,
    /// Delimiter for collapsed names
    pub delimiter: String,
}

impl Default for MergeCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeCommand {
    pub fn new() -> Self {
        Self {
            strand_specific: false,
            delimiter: ",".to_string(),
        }
    }

    /// Set strand-specific merging.
    pub fn with_strand(mut self, strand: bool) -> Self {
        self.strand_specific = strand;
        self
    }

    /// Merge overlapping and book-ended records.
    ///
    /// Output records carry the distinct input names joined by the
    /// delimiter (first-seen order), score 0 and the group strand, or
    /// `Undefined` when merging ignores strand.
    pub fn merge_records(&self, records: Vec<BedRecord>) -> Vec<BedRecord> {
        if records.is_empty() {
            return Vec::new();
        }

        let mut records = parallel_sort_records(records);
        if self.strand_specific {
            records.sort_by(|a, b| {
                a.chrom()
                    .cmp(b.chrom())
                    .then(a.strand.cmp(&b.strand))
                    .then(a.start().cmp(&b.start()))
                    .then(a.end().cmp(&b.end()))
            });
        }

        let mut result = Vec::new();
        let mut iter = records.into_iter();
        let Some(first) = iter.next() else {
            return result;
        };
        let mut group = MergeGroup::start(first, self);

        for record in iter {
            let same_chrom = record.chrom() == group.interval.chrom;
            let same_strand = !self.strand_specific || record.strand == group.strand;
            if same_chrom && same_strand && record.start() <= group.interval.end {
                group.absorb(record, self);
            } else {
                result.push(group.finish(self));
                group = MergeGroup::start(record, self);
            }
        }
        result.push(group.finish(self));

        result.sort();
        result
    }

    /// Execute merge on a file.
    pub fn run<P: AsRef<Path>, W: Write>(&self, input: P, output: &mut W) -> Result<(), BedError> {
        let merged = self.merge_records(read_records(input)?);
        let mut writer = BedWriter::new(output);
        for rec in &merged {
            writer.write_record(rec)?;
        }
        writer.flush()
    }
}

struct MergeGroup {
    interval: Interval,
    strand: Strand,
    names: Vec<String>,
}

impl MergeGroup {
    fn start(record: BedRecord, cmd: &MergeCommand) -> Self {
        let mut group = Self {
            interval: record.interval.clone(),
            strand: record.strand,
            names: Vec::new(),
        };
        group.add_names(&record.name, cmd);
        group
    }

    fn absorb(&mut self, record: BedRecord, cmd: &MergeCommand) {
        self.interval.end = self.interval.end.max(record.end());
        self.add_names(&record.name, cmd);
    }

    fn add_names(&mut self, name: &str, cmd: &MergeCommand) {
        for part in name.split(cmd.delimiter.as_str()) {
            if !part.is_empty() && !self.names.iter().any(|n| n == part) {
                self.names.push(part.to_string());
            }
        }
    }

    fn finish(self, cmd: &MergeCommand) -> BedRecord {
        let strand = if cmd.strand_specific {
            self.strand
        } else {
            Strand::Undefined
        };
        BedRecord {
            interval: self.interval,
            name: self.names.join(&cmd.delimiter),
            score: 0,
            strand,
            extra_fields: Vec::new(),
        }
    }
}
