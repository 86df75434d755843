//! Per-record validation while streaming a bedRMod body.

use super::Result;
use crate::euf::EufReader;
use crate::genome::Genome;
use crate::record::{DatasetId, ModificationRecord};
use log::warn;
use std::io::Read;

/// Lines seen and dropped by [`validate_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilterStats {
    pub total: usize,
    pub dropped: usize,
}

impl RecordFilterStats {
    /// Whether the drop rate is above `budget` (a fraction).
    pub fn exceeds(&self, budget: f64) -> bool {
        self.total > 0 && self.dropped as f64 / self.total as f64 > budget
    }
}

/// Parse and check every data line.
///
/// A malformed line, a chromosome missing from `genome` or a name outside
/// `modifications` drops that record with a warning. I/O failures abort.
pub fn validate_records<R: Read>(
    reader: R,
    genome: &Genome,
    modifications: &[&str],
    dataset_id: &DatasetId,
) -> Result<(Vec<ModificationRecord>, RecordFilterStats)> {
    let mut reader = EufReader::new(reader);
    let mut stats = RecordFilterStats::default();
    let mut records = Vec::new();

    while let Some(line) = reader.next_line()? {
        stats.total += 1;
        let line_no = reader.line_number();
        let parsed = match line {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("dropping record: {}", e);
                stats.dropped += 1;
                continue;
            }
        };

        let chrom = parsed.bed.chrom();
        match genome.chrom_size(chrom) {
            None => {
                warn!("dropping record at line {}: unknown chromosome '{}'", line_no, chrom);
                stats.dropped += 1;
                continue;
            }
            Some(size) if parsed.bed.end() > size => {
                warn!(
                    "dropping record at line {}: end {} beyond {} ({})",
                    line_no,
                    parsed.bed.end(),
                    chrom,
                    size
                );
                stats.dropped += 1;
                continue;
            }
            Some(_) => {}
        }
        if !modifications.contains(&parsed.bed.name.as_str()) {
            warn!(
                "dropping record at line {}: unknown modification '{}'",
                line_no,
                parsed.bed.name
            );
            stats.dropped += 1;
            continue;
        }

        match parsed.into_modification(dataset_id.clone()) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("dropping record at line {}: {}", line_no, e);
                stats.dropped += 1;
            }
        }
    }

    if stats.dropped > 0 {
        warn!("{} of {} records dropped", stats.dropped, stats.total);
    }
    Ok((records, stats))
}
