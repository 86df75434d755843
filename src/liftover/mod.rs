//! Coordinate liftover between assembly versions.
//!
//! Records of a non-current assembly are mapped onto the current one through
//! a chain file. A batch whose unmapped fraction exceeds the threshold is
//! rejected as a whole.

mod chain;

pub use chain::{read_chains, Block, Chain, ChainHeader};

use crate::error::ErrorClass;
use crate::index::IntervalIndex;
use crate::interval::{BedRecord, Interval, Strand};
use crate::record::{Assembly, ModificationRecord};
use crate::store::{ReferenceData, StoreError};
use log::{debug, warn};
use std::io::{self, Read};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiftOverError {
    #[error("assembly {0} is already the current assembly")]
    AssemblyVersion(String),

    #[error("no current assembly for taxon {0}")]
    NoCurrentAssembly(u32),

    #[error("{unmapped} of {total} records could not be lifted")]
    TooManyUnmapped { unmapped: usize, total: usize },

    #[error("chain file error at line {line}: {message}")]
    Chain { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LiftOverError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LiftOverError::AssemblyVersion(_) => ErrorClass::Specification,
            LiftOverError::NoCurrentAssembly(_) => ErrorClass::ReferenceIntegrity,
            LiftOverError::TooManyUnmapped { .. } => ErrorClass::DataQuality,
            LiftOverError::Chain { .. } | LiftOverError::Io(_) => ErrorClass::ExternalTool,
            LiftOverError::Store(e) => e.class(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LiftOverError>;

/// Maps one record onto another assembly.
pub trait CoordinateMapper {
    /// `None` when the record does not map unambiguously.
    fn map_record(&self, record: &ModificationRecord) -> Option<ModificationRecord>;
}

/// [`CoordinateMapper`] over the blocks of a chain file.
pub struct ChainMapper {
    headers: Vec<ChainHeader>,
    /// (chain position in `headers`, block)
    blocks: Vec<(usize, Block)>,
    index: IntervalIndex,
}

impl ChainMapper {
    pub fn new(chains: Vec<Chain>) -> Self {
        let mut headers = Vec::with_capacity(chains.len());
        let mut blocks = Vec::new();
        let mut spans = Vec::new();
        for (chain_idx, chain) in chains.into_iter().enumerate() {
            for block in chain.blocks {
                if block.t_end > block.t_start {
                    spans.push(BedRecord {
                        interval: Interval::new_unchecked(
                            chain.header.t_name.as_str(),
                            block.t_start,
                            block.t_end,
                        ),
                        name: String::new(),
                        score: 0,
                        strand: Strand::Undefined,
                        extra_fields: Vec::new(),
                    });
                    blocks.push((chain_idx, block));
                }
            }
            headers.push(chain.header);
        }
        debug!("chain index: {} chains, {} blocks", headers.len(), blocks.len());
        Self {
            headers,
            blocks,
            index: IntervalIndex::from_records(spans),
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(Self::new(read_chains(reader)?))
    }

    /// Position of `pos` on the chain's query strand, if a block holds it.
    fn lift_base(&self, candidates: &[usize], pos: u64) -> Option<u64> {
        candidates.iter().find_map(|&i| {
            let (_, block) = &self.blocks[i];
            (block.t_start <= pos && pos < block.t_end)
                .then(|| block.q_start + (pos - block.t_start))
        })
    }
}

impl CoordinateMapper for ChainMapper {
    fn map_record(&self, record: &ModificationRecord) -> Option<ModificationRecord> {
        let candidates = self.index.find_overlap_indices(&record.bed, false);
        let (&first, rest) = candidates.split_first()?;
        let chain_idx = self.blocks[first].0;
        if rest.iter().any(|&i| self.blocks[i].0 != chain_idx) {
            return None;
        }

        let (start, end) = (record.start(), record.end());
        let q_start = self.lift_base(&candidates, start)?;
        let q_last = self.lift_base(&candidates, end - 1)?;
        if q_last < q_start || q_last + 1 - q_start != end - start {
            return None;
        }

        let header = &self.headers[chain_idx];
        if header.q_strand == Strand::Reverse {
            let new_start = header.q_size.checked_sub(q_last + 1)?;
            let mut lifted = record.relocated(&header.q_name, new_start, record.strand().flip());
            // Mirror the thick range inside the record.
            lifted.thick_start = new_start + end.saturating_sub(record.thick_end);
            lifted.thick_end = lifted.thick_start + (record.thick_end - record.thick_start);
            Some(lifted)
        } else {
            Some(record.relocated(&header.q_name, q_start, record.strand()))
        }
    }
}

/// Mapped records of one batch and how many were lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiftSummary {
    pub mapped: Vec<ModificationRecord>,
    pub unmapped: usize,
}

impl LiftSummary {
    pub fn total(&self) -> usize {
        self.mapped.len() + self.unmapped
    }

    pub fn unmapped_fraction(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.unmapped as f64 / total as f64,
        }
    }

    /// Warning logged when a batch passes the gate with losses.
    pub fn warning(&self) -> Option<String> {
        (self.unmapped > 0).then(|| {
            format!("liftover discarded {} of {} records", self.unmapped, self.total())
        })
    }
}

/// Map every record of a batch; no gate is applied.
pub fn map_batch(mapper: &dyn CoordinateMapper, records: &[ModificationRecord]) -> LiftSummary {
    let mapped: Vec<ModificationRecord> =
        records.iter().filter_map(|r| mapper.map_record(r)).collect();
    LiftSummary {
        unmapped: records.len() - mapped.len(),
        mapped,
    }
}

/// Map a batch, enforcing the unmapped-fraction gate.
///
/// Above `threshold` nothing is returned; otherwise the mapped records are,
/// with a warning naming how many were dropped.
pub fn lift_records(
    mapper: &dyn CoordinateMapper,
    records: &[ModificationRecord],
    threshold: f64,
) -> Result<Vec<ModificationRecord>> {
    let summary = map_batch(mapper, records);
    if summary.unmapped_fraction() > threshold {
        return Err(LiftOverError::TooManyUnmapped {
            unmapped: summary.unmapped,
            total: summary.total(),
        });
    }
    if let Some(message) = summary.warning() {
        warn!("{}", message);
    }
    Ok(summary.mapped)
}

/// Lift records of `assembly` onto the current assembly of its taxon.
pub fn liftover(
    refs: &dyn ReferenceData,
    assembly: &Assembly,
    records: &[ModificationRecord],
    threshold: f64,
) -> Result<Vec<ModificationRecord>> {
    if assembly.is_current {
        return Err(LiftOverError::AssemblyVersion(assembly.name.clone()));
    }
    let current = refs
        .current_assembly(assembly.taxa_id)
        .ok_or(LiftOverError::NoCurrentAssembly(assembly.taxa_id))?;
    debug!("lifting {} records from {} to {}", records.len(), assembly.name, current.name);

    let mapper = ChainMapper::from_reader(refs.chain_reader(assembly, &current)?)?;
    lift_records(&mapper, records, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DatasetId;

    /// Forward chain shifting chr1:[0,100) by +1000, and a reverse chain
    /// for chr2:[0,50) onto a 500 bp chrR.
    const CHAINS: &str = "\
chain 10 chr1 200 + 0 100 chr1 5000 + 1000 1100 1
100

chain 10 chr2 100 + 0 50 chrR 500 - 0 48 2
20 5 3
25
";

    fn rec(chrom: &str, start: u64, end: u64, strand: Strand) -> ModificationRecord {
        let bed = BedRecord::new(chrom, start, end, "m6A", 0, strand).unwrap();
        let id: DatasetId = "AAAAAAAAAAAA".parse().unwrap();
        ModificationRecord::new(bed, start, end, "0", 10, 50, id).unwrap()
    }

    fn mapper() -> ChainMapper {
        ChainMapper::from_reader(CHAINS.as_bytes()).unwrap()
    }

    #[test]
    fn test_forward_chain() {
        let lifted = mapper().map_record(&rec("chr1", 10, 11, Strand::Forward)).unwrap();
        assert_eq!((lifted.chrom(), lifted.start(), lifted.end()), ("chr1", 1010, 1011));
        assert_eq!((lifted.thick_start, lifted.thick_end), (1010, 1011));
        assert_eq!(lifted.strand(), Strand::Forward);
    }

    #[test]
    fn test_reverse_chain_flips() {
        // chr2:10 -> query-strand 10 -> forward 500 - 11 = 489
        let lifted = mapper().map_record(&rec("chr2", 10, 11, Strand::Forward)).unwrap();
        assert_eq!((lifted.chrom(), lifted.start(), lifted.end()), ("chrR", 489, 490));
        assert_eq!(lifted.strand(), Strand::Reverse);
    }

    #[test]
    fn test_gap_and_split_do_not_map() {
        let m = mapper();
        assert!(m.map_record(&rec("chr2", 22, 23, Strand::Forward)).is_none());
        assert!(m.map_record(&rec("chr2", 18, 28, Strand::Forward)).is_none());
        assert!(m.map_record(&rec("chr9", 1, 2, Strand::Forward)).is_none());
    }

    #[test]
    fn test_unmapped_gate() {
        let m = mapper();
        let three = vec![
            rec("chr1", 1, 2, Strand::Forward),
            rec("chr1", 2, 3, Strand::Forward),
            rec("chr1", 150, 151, Strand::Forward),
        ];
        assert!(matches!(
            lift_records(&m, &three, 0.3),
            Err(LiftOverError::TooManyUnmapped { unmapped: 1, total: 3 })
        ));

        let mut ten: Vec<_> = (0..9).map(|i| rec("chr1", i, i + 1, Strand::Forward)).collect();
        ten.push(rec("chr1", 150, 151, Strand::Forward));
        assert_eq!(lift_records(&m, &ten, 0.3).unwrap().len(), 9);
    }

    #[test]
    fn test_summary_warns_only_on_loss() {
        let m = mapper();
        let mut ten: Vec<_> = (0..9).map(|i| rec("chr1", i, i + 1, Strand::Forward)).collect();
        ten.push(rec("chr1", 150, 151, Strand::Forward));

        let summary = map_batch(&m, &ten);
        assert_eq!((summary.mapped.len(), summary.unmapped, summary.total()), (9, 1, 10));
        assert!((summary.unmapped_fraction() - 0.1).abs() < 1e-9);
        assert_eq!(summary.warning().as_deref(), Some("liftover discarded 1 of 10 records"));

        let clean = map_batch(&m, &ten[..9]);
        assert_eq!(clean.warning(), None);
        assert_eq!(map_batch(&m, &[]).unmapped_fraction(), 0.0);
    }

    #[test]
    fn test_current_assembly_is_rejected() {
        let refs = crate::store::MemoryReference::default();
        let assembly = Assembly {
            id: 1,
            name: "GRCh38".into(),
            taxa_id: 9606,
            version: 2,
            is_current: true,
        };
        let err = liftover(&refs, &assembly, &[], 0.3).unwrap_err();
        assert!(matches!(err, LiftOverError::AssemblyVersion(_)));
        assert_eq!(err.class(), ErrorClass::Specification);
    }
}
