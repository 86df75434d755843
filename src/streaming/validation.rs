//! Order checks for staged interval files.
//!
//! The file-level commands walk each chromosome once, so staged input is
//! ordered by chromosome name, then start. When the caller promises that
//! order, the toolkit checks it record by record instead of sorting.

use crate::bed::BedError;
use crate::interval::BedRecord;

/// Tracks the last (chromosome, start) seen and rejects anything earlier.
#[derive(Debug, Default)]
pub struct SortValidator {
    last: Option<(String, u64)>,
    seen: usize,
}

impl SortValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `record` if it does not sort before its predecessor.
    pub fn check(&mut self, record: &BedRecord) -> Result<(), BedError> {
        self.seen += 1;
        let (chrom, start) = (record.chrom(), record.start());

        match &mut self.last {
            Some((prev, prev_start)) if prev.as_str() == chrom => {
                if start < *prev_start {
                    return Err(BedError::InvalidFormat(format!(
                        "input not sorted: {}:{} (record {}) follows {}:{}",
                        chrom, start, self.seen, chrom, prev_start
                    )));
                }
                *prev_start = start;
            }
            Some((prev, _)) if chrom < prev.as_str() => {
                return Err(BedError::InvalidFormat(format!(
                    "input not sorted: chromosome {} (record {}) follows {}",
                    chrom, self.seen, prev
                )));
            }
            _ => self.last = Some((chrom.to_string(), start)),
        }
        Ok(())
    }

    /// Records checked so far, including a rejected one.
    pub fn record_count(&self) -> usize {
        self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Strand;

    fn rec(chrom: &str, start: u64) -> BedRecord {
        BedRecord::new(chrom, start, start + 1, "m6A", 0, Strand::Forward).unwrap()
    }

    #[test]
    fn test_accepts_chrom_major_order() {
        let mut validator = SortValidator::new();
        for (chrom, start) in [("1", 10), ("1", 10), ("1", 30), ("10", 0), ("2", 5)] {
            validator.check(&rec(chrom, start)).unwrap();
        }
        assert_eq!(validator.record_count(), 5);
    }

    #[test]
    fn test_rejects_regressions() {
        let mut validator = SortValidator::new();
        validator.check(&rec("2", 100)).unwrap();
        let err = validator.check(&rec("2", 50)).unwrap_err();
        assert!(err.to_string().contains("not sorted"));

        let mut validator = SortValidator::new();
        validator.check(&rec("2", 100)).unwrap();
        assert!(validator.check(&rec("1", 500)).is_err());
        assert_eq!(validator.record_count(), 2);
    }
}
