//! Typed records built on top of [`BedRecord`], plus the reference entities
//! the engines look up.

use crate::interval::{BedRecord, Interval, IntervalError, Strand};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a dataset identifier.
pub const DATASET_ID_LEN: usize = 12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error(transparent)]
    Interval(#[from] IntervalError),

    #[error("thick range {thick_start}-{thick_end} is empty")]
    InvalidThick { thick_start: u64, thick_end: u64 },

    #[error("frequency {0} is outside 1-100")]
    FrequencyOutOfRange(u64),

    #[error("invalid dataset id '{0}': expected 12 alphanumeric characters")]
    InvalidDatasetId(String),

    #[error("unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("unknown annotation source '{0}'")]
    UnknownSource(String),
}

/// Identifier of a stored modification record.
pub type RecordId = u64;

/// Short opaque dataset identifier (EUFID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(String);

impl DatasetId {
    /// Draw a fresh identifier.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let id: String = rng
            .sample_iter(&Alphanumeric)
            .take(DATASET_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DatasetId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == DATASET_ID_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Ok(Self(s.to_string()))
        } else {
            Err(RecordError::InvalidDatasetId(s.to_string()))
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One RNA-modification measurement.
///
/// `bed.name` holds the modification short name (e.g. `m6A`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationRecord {
    pub bed: BedRecord,
    pub thick_start: u64,
    pub thick_end: u64,
    pub item_rgb: String,
    pub coverage: u32,
    pub frequency: u8,
    pub dataset_id: DatasetId,
}

impl ModificationRecord {
    pub fn new(
        bed: BedRecord,
        thick_start: u64,
        thick_end: u64,
        item_rgb: impl Into<String>,
        coverage: u32,
        frequency: u8,
        dataset_id: DatasetId,
    ) -> Result<Self, RecordError> {
        if thick_start >= thick_end {
            return Err(RecordError::InvalidThick {
                thick_start,
                thick_end,
            });
        }
        if !(1..=100).contains(&frequency) {
            return Err(RecordError::FrequencyOutOfRange(frequency as u64));
        }
        Ok(Self {
            bed: bed.with_extra_fields(Vec::new()),
            thick_start,
            thick_end,
            item_rgb: item_rgb.into(),
            coverage,
            frequency,
            dataset_id,
        })
    }

    #[inline]
    pub fn chrom(&self) -> &str {
        self.bed.chrom()
    }

    #[inline]
    pub fn start(&self) -> u64 {
        self.bed.start()
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.bed.end()
    }

    #[inline]
    pub fn strand(&self) -> Strand {
        self.bed.strand
    }

    /// Same record at other coordinates; thick bounds keep their offsets.
    pub(crate) fn relocated(&self, chrom: &str, start: u64, strand: Strand) -> Self {
        let len = self.bed.len();
        let mut moved = self.clone();
        moved.bed.interval = Interval::new_unchecked(chrom, start, start + len);
        moved.bed.strand = strand;
        let lead = self.thick_start.saturating_sub(self.start());
        let thick_len = self.thick_end - self.thick_start;
        moved.thick_start = start + lead;
        moved.thick_end = moved.thick_start + thick_len;
        moved
    }
}

impl fmt::Display for ModificationRecord {
    /// bedRMod data line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.bed, self.thick_start, self.thick_end, self.item_rgb, self.coverage, self.frequency
        )
    }
}

/// A modification record with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub record: ModificationRecord,
}

/// A modification record tagged with the set it came from, for one
/// comparison call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRecord {
    pub bed: BedRecord,
    pub thick_start: u64,
    pub thick_end: u64,
    pub item_rgb: String,
    pub coverage: u32,
    pub frequency: u8,
    /// Dataset id, or an upload tag
    pub tag: String,
}

impl ComparisonRecord {
    pub fn tagged(record: &ModificationRecord, tag: impl Into<String>) -> Self {
        Self {
            bed: record.bed.clone(),
            thick_start: record.thick_start,
            thick_end: record.thick_end,
            item_rgb: record.item_rgb.clone(),
            coverage: record.coverage,
            frequency: record.frequency,
            tag: tag.into(),
        }
    }
}

impl From<&ModificationRecord> for ComparisonRecord {
    fn from(record: &ModificationRecord) -> Self {
        Self::tagged(record, record.dataset_id.as_str())
    }
}

/// Which reference the annotation release was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationSource {
    Ensembl,
    GtRnaDb,
}

impl AnnotationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationSource::Ensembl => "ensembl",
            AnnotationSource::GtRnaDb => "gtrnadb",
        }
    }
}

impl FromStr for AnnotationSource {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ensembl" => Ok(AnnotationSource::Ensembl),
            "gtrnadb" => Ok(AnnotationSource::GtRnaDb),
            _ => Err(RecordError::UnknownSource(s.to_string())),
        }
    }
}

impl fmt::Display for AnnotationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// exon / UTR / CDS, allowed to overlap each other
    Conventional,
    /// intron / intergenic, mutually exclusive catch-alls
    Extended,
}

/// Partition a feature interval belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKind {
    Exon,
    FivePrimeUtr,
    ThreePrimeUtr,
    Cds,
    Intron,
    Intergenic,
}

impl FeatureKind {
    /// All features in assignment order.
    pub const ALL: [FeatureKind; 6] = [
        FeatureKind::Exon,
        FeatureKind::FivePrimeUtr,
        FeatureKind::ThreePrimeUtr,
        FeatureKind::Cds,
        FeatureKind::Intron,
        FeatureKind::Intergenic,
    ];

    /// Name of the partition file.
    pub fn stem(self) -> &'static str {
        match self {
            FeatureKind::Exon => "exon",
            FeatureKind::FivePrimeUtr => "five_prime_utr",
            FeatureKind::ThreePrimeUtr => "three_prime_utr",
            FeatureKind::Cds => "CDS",
            FeatureKind::Intron => "intron",
            FeatureKind::Intergenic => "intergenic",
        }
    }

    /// Label stored on association rows.
    pub fn label(self) -> &'static str {
        match self {
            FeatureKind::Exon => "Exonic",
            FeatureKind::FivePrimeUtr => "5'UTR",
            FeatureKind::ThreePrimeUtr => "3'UTR",
            FeatureKind::Cds => "CDS",
            FeatureKind::Intron => "Intronic",
            FeatureKind::Intergenic => "Intergenic",
        }
    }

    pub fn tier(self) -> Tier {
        match self {
            FeatureKind::Intron | FeatureKind::Intergenic => Tier::Extended,
            _ => Tier::Conventional,
        }
    }

    /// Map a GTF feature column onto a conventional partition.
    pub fn from_gtf_feature(feature: &str) -> Option<Self> {
        match feature {
            "exon" => Some(FeatureKind::Exon),
            "five_prime_utr" => Some(FeatureKind::FivePrimeUtr),
            "three_prime_utr" => Some(FeatureKind::ThreePrimeUtr),
            "CDS" => Some(FeatureKind::Cds),
            _ => None,
        }
    }
}

impl FromStr for FeatureKind {
    type Err = RecordError;

    /// Accepts either the file stem or the label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureKind::ALL
            .into_iter()
            .find(|k| k.stem() == s || k.label() == s)
            .ok_or_else(|| RecordError::UnknownFeature(s.to_string()))
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One interval of a derived feature partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationFeatureRecord {
    pub interval: Interval,
    pub strand: Strand,
    pub gene_id: String,
    pub gene_name: Option<String>,
    pub gene_biotype: Option<String>,
}

/// Association between a stored record and a gene feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataAnnotationRecord {
    pub gene_id: String,
    pub data_record_id: RecordId,
    pub feature: FeatureKind,
}

impl DataAnnotationRecord {
    pub fn feature_name(&self) -> &'static str {
        self.feature.label()
    }
}

/// Genome assembly of a taxon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    pub id: u32,
    pub name: String,
    pub taxa_id: u32,
    pub version: u32,
    pub is_current: bool,
}

/// One annotation release of a taxon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub id: u32,
    pub taxa_id: u32,
    pub release: u32,
    pub source: AnnotationSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organism {
    pub id: u32,
    pub taxa_id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub id: u32,
    pub short_name: String,
}

/// A registered (modification, organism, technology) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    pub modification_id: u32,
    pub organism_id: u32,
    pub technology_id: u32,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(modification {}, organism {}, technology {})",
            self.modification_id, self.organism_id, self.technology_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub id: DatasetId,
    pub project_id: String,
    pub title: String,
    pub modification_ids: Vec<u32>,
    pub organism_id: u32,
    pub technology_id: u32,
    pub assembly_id: u32,
}

impl Dataset {
    /// Whether `other` describes the same experiment (duplicate key).
    pub fn same_experiment(&self, other: &Dataset) -> bool {
        let mut mine = self.modification_ids.clone();
        let mut theirs = other.modification_ids.clone();
        mine.sort_unstable();
        theirs.sort_unstable();
        self.project_id == other.project_id
            && self.title == other.title
            && mine == theirs
            && self.organism_id == other.organism_id
            && self.technology_id == other.technology_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn dataset_id() -> DatasetId {
        "AbCdEf123456".parse().unwrap()
    }

    #[test]
    fn test_dataset_id() {
        let mut rng = SmallRng::seed_from_u64(7);
        let id = DatasetId::generate(&mut rng);
        assert_eq!(id.as_str().len(), DATASET_ID_LEN);
        assert_eq!(id.as_str().parse::<DatasetId>().unwrap(), id);
        assert!("short".parse::<DatasetId>().is_err());
        assert!("AbCdEf12345!".parse::<DatasetId>().is_err());
    }

    #[test]
    fn test_modification_record_validation() {
        let bed = BedRecord::new("1", 10, 11, "m6A", 100, Strand::Forward).unwrap();
        assert!(
            ModificationRecord::new(bed.clone(), 10, 11, "0,0,0", 30, 0, dataset_id()).is_err()
        );
        assert!(
            ModificationRecord::new(bed.clone(), 11, 11, "0,0,0", 30, 50, dataset_id()).is_err()
        );

        let rec = ModificationRecord::new(bed, 10, 11, "0,0,0", 30, 50, dataset_id()).unwrap();
        assert_eq!(rec.to_string(), "1\t10\t11\tm6A\t100\t+\t10\t11\t0,0,0\t30\t50");
    }

    #[test]
    fn test_relocated_keeps_thick_offsets() {
        let bed = BedRecord::new("1", 100, 110, "m6A", 0, Strand::Forward).unwrap();
        let rec = ModificationRecord::new(bed, 102, 105, "0", 1, 1, dataset_id()).unwrap();
        let moved = rec.relocated("chr1", 1000, Strand::Reverse);
        assert_eq!((moved.start(), moved.end()), (1000, 1010));
        assert_eq!((moved.thick_start, moved.thick_end), (1002, 1005));
        assert_eq!(moved.strand(), Strand::Reverse);
    }

    #[test]
    fn test_feature_kind_names() {
        assert_eq!(FeatureKind::Cds.stem(), "CDS");
        assert_eq!(FeatureKind::FivePrimeUtr.label(), "5'UTR");
        assert_eq!("intron".parse::<FeatureKind>().unwrap(), FeatureKind::Intron);
        assert_eq!("Exonic".parse::<FeatureKind>().unwrap(), FeatureKind::Exon);
        assert_eq!(FeatureKind::Intergenic.tier(), Tier::Extended);
        assert_eq!(FeatureKind::from_gtf_feature("gene"), None);
    }

    #[test]
    fn test_duplicate_key_ignores_modification_order() {
        let a = Dataset {
            id: dataset_id(),
            project_id: "SMID00000001".into(),
            title: "HEK293 m6A".into(),
            modification_ids: vec![1, 2],
            organism_id: 3,
            technology_id: 4,
            assembly_id: 5,
        };
        let mut b = a.clone();
        b.modification_ids = vec![2, 1];
        assert!(a.same_experiment(&b));
        b.technology_id = 9;
        assert!(!a.same_experiment(&b));
    }
}
