//! bedRMod import.
//!
//! Validation runs as a fixed sequence of stages over the header, the
//! caller's parameters and the reference catalog, then streams the records.
//! Nothing is written until every stage has passed; the dataset, its records
//! and their annotation rows then land in one commit.

mod records;

pub use records::{validate_records, RecordFilterStats};

use crate::annotation::{AnnotationError, AnnotationRegistry};
use crate::config::EngineConfig;
use crate::error::ErrorClass;
use crate::euf::{EufError, EufHeader};
use crate::liftover::{liftover, LiftOverError};
use crate::record::{
    AnnotationSource, Assembly, Dataset, DatasetId, Modification, Organism, RecordError, Selection,
    StoredRecord,
};
use crate::store::{BatchItem, BatchWriter, ReferenceData, Storage, StoreError};
use log::{debug, info};
use std::fmt;
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Header(#[from] EufError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("organism {0} not found")]
    UnknownOrganism(u32),

    #[error("header organism {header} does not match taxon {expected} of the selected organism")]
    TaxonMismatch { header: u32, expected: u32 },

    #[error("assembly '{assembly}' does not belong to taxon {taxa_id}")]
    AssemblyMismatch { assembly: String, taxa_id: u32 },

    #[error("modification {0} not found")]
    UnknownModification(u32),

    #[error("no selection for {0}")]
    MissingSelection(Selection),

    #[error("dataset {0} already holds this experiment")]
    Duplicate(DatasetId),

    #[error("dataset {0} to update not found")]
    DatasetNotFound(DatasetId),

    #[error("no dataset matches the experiment of update target {0}")]
    NoDuplicate(DatasetId),

    #[error("update target {expected} differs from matching dataset {found}")]
    UpdateMismatch { expected: DatasetId, found: DatasetId },

    #[error("{dropped} of {total} records dropped, budget is {budget}")]
    RecordBudgetExceeded { dropped: usize, total: usize, budget: f64 },

    #[error("no valid records")]
    NoRecords,

    #[error(transparent)]
    LiftOver(#[from] LiftOverError),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ImportError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ImportError::Header(e) => e.class(),
            ImportError::Record(_) | ImportError::NoRecords => ErrorClass::Specification,
            ImportError::UnknownOrganism(_)
            | ImportError::UnknownModification(_)
            | ImportError::MissingSelection(_)
            | ImportError::DatasetNotFound(_) => ErrorClass::ReferenceIntegrity,
            ImportError::TaxonMismatch { .. }
            | ImportError::AssemblyMismatch { .. }
            | ImportError::Duplicate(_)
            | ImportError::NoDuplicate(_)
            | ImportError::UpdateMismatch { .. } => ErrorClass::Consistency,
            ImportError::RecordBudgetExceeded { .. } => ErrorClass::DataQuality,
            ImportError::LiftOver(e) => e.class(),
            ImportError::Annotation(e) => e.class(),
            ImportError::Store(e) => e.class(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// Validation stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    HeaderParsed,
    TaxonValidated,
    AssemblyResolved { liftover: bool },
    SelectionResolved,
    DuplicateChecked,
    RecordsValidated,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStage::HeaderParsed => f.write_str("header parsed"),
            ImportStage::TaxonValidated => f.write_str("taxon validated"),
            ImportStage::AssemblyResolved { liftover } => {
                write!(f, "assembly resolved (liftover: {})", liftover)
            }
            ImportStage::SelectionResolved => f.write_str("selection resolved"),
            ImportStage::DuplicateChecked => f.write_str("duplicate checked"),
            ImportStage::RecordsValidated => f.write_str("records validated"),
        }
    }
}

/// What the caller supplies besides the file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportParams {
    pub project_id: String,
    pub title: String,
    pub organism_id: u32,
    pub technology_id: u32,
    pub modification_ids: Vec<u32>,
    /// Replace the records of this dataset instead of creating one
    pub update: Option<DatasetId>,
}

/// Header checks: supported version and required fields.
pub fn check_header(header: &EufHeader) -> Result<()> {
    header.validate()?;
    Ok(())
}

/// The caller's organism must be the taxon the header names.
pub fn resolve_taxon(
    refs: &dyn ReferenceData,
    header: &EufHeader,
    params: &ImportParams,
) -> Result<Organism> {
    let organism = refs
        .organism(params.organism_id)
        .ok_or(ImportError::UnknownOrganism(params.organism_id))?;
    let header_taxa = header.taxa_id()?;
    if header_taxa != organism.taxa_id {
        return Err(ImportError::TaxonMismatch {
            header: header_taxa,
            expected: organism.taxa_id,
        });
    }
    Ok(organism)
}

/// The header assembly, looked up within the taxon. Records of a
/// non-current assembly need liftover.
pub fn resolve_assembly(
    refs: &dyn ReferenceData,
    header: &EufHeader,
    organism: &Organism,
) -> Result<Assembly> {
    let name = header.get("assembly").unwrap_or_default();
    refs.assembly_by_name(organism.taxa_id, name)
        .ok_or_else(|| ImportError::AssemblyMismatch {
            assembly: name.to_string(),
            taxa_id: organism.taxa_id,
        })
}

/// Every (modification, organism, technology) triple must be registered.
pub fn resolve_selections(
    refs: &dyn ReferenceData,
    params: &ImportParams,
) -> Result<Vec<Modification>> {
    params
        .modification_ids
        .iter()
        .map(|&id| {
            let modification = refs.modification(id).ok_or(ImportError::UnknownModification(id))?;
            let selection = Selection {
                modification_id: id,
                organism_id: params.organism_id,
                technology_id: params.technology_id,
            };
            if !refs.selection_exists(&selection) {
                return Err(ImportError::MissingSelection(selection));
            }
            Ok(modification)
        })
        .collect()
}

/// A fresh import must not repeat a stored experiment; an update must match
/// exactly its own target.
pub fn check_duplicate(
    storage: &dyn Storage,
    candidate: &Dataset,
    update: Option<&DatasetId>,
) -> Result<()> {
    let found = storage
        .datasets()?
        .into_iter()
        .find(|d| d.same_experiment(candidate))
        .map(|d| d.id);

    match (update, found) {
        (None, None) => Ok(()),
        (None, Some(found)) => Err(ImportError::Duplicate(found)),
        (Some(target), found) => {
            if storage.get_dataset(target)?.is_none() {
                return Err(ImportError::DatasetNotFound(target.clone()));
            }
            match found {
                Some(found) if &found == target => Ok(()),
                Some(found) => Err(ImportError::UpdateMismatch {
                    expected: target.clone(),
                    found,
                }),
                None => Err(ImportError::NoDuplicate(target.clone())),
            }
        }
    }
}

fn fresh_dataset_id(storage: &dyn Storage) -> Result<DatasetId> {
    let mut rng = rand::thread_rng();
    loop {
        let id = DatasetId::generate(&mut rng);
        if storage.get_dataset(&id)?.is_none() {
            return Ok(id);
        }
    }
}

/// Validate a bedRMod file and import it as one dataset.
///
/// `header` and `records` may be two readers over the same file; the record
/// reader skips header lines.
pub fn validate_and_import<H: Read, R: Read>(
    storage: &mut dyn Storage,
    refs: &dyn ReferenceData,
    registry: &AnnotationRegistry,
    config: &EngineConfig,
    header: H,
    records: R,
    params: &ImportParams,
) -> Result<DatasetId> {
    let header = EufHeader::parse(header)?;
    check_header(&header)?;
    debug!("import: {}", ImportStage::HeaderParsed);

    let organism = resolve_taxon(refs, &header, params)?;
    debug!("import: {}", ImportStage::TaxonValidated);

    let assembly = resolve_assembly(refs, &header, &organism)?;
    let needs_liftover = !assembly.is_current;
    debug!("import: {}", ImportStage::AssemblyResolved { liftover: needs_liftover });

    let modifications = resolve_selections(refs, params)?;
    debug!("import: {}", ImportStage::SelectionResolved);

    let target_assembly = if needs_liftover {
        refs.current_assembly(organism.taxa_id)
            .ok_or(LiftOverError::NoCurrentAssembly(organism.taxa_id))?
    } else {
        assembly.clone()
    };
    let dataset_id = match &params.update {
        Some(id) => id.clone(),
        None => fresh_dataset_id(storage)?,
    };
    let dataset = Dataset {
        id: dataset_id.clone(),
        project_id: params.project_id.clone(),
        title: params.title.clone(),
        modification_ids: params.modification_ids.clone(),
        organism_id: params.organism_id,
        technology_id: params.technology_id,
        assembly_id: target_assembly.id,
    };
    check_duplicate(storage, &dataset, params.update.as_ref())?;
    debug!("import: {}", ImportStage::DuplicateChecked);

    let budget = if needs_liftover {
        config.import.liftover_record_error_budget
    } else {
        config.import.record_error_budget
    };
    let genome = refs.chrom_sizes(&assembly)?;
    let names: Vec<&str> = modifications.iter().map(|m| m.short_name.as_str()).collect();
    let (mut valid, stats) = validate_records(records, &genome, &names, &dataset_id)?;
    if stats.exceeds(budget) {
        return Err(ImportError::RecordBudgetExceeded {
            dropped: stats.dropped,
            total: stats.total,
            budget,
        });
    }
    debug!("import: {}", ImportStage::RecordsValidated);

    if needs_liftover {
        valid = liftover(refs, &assembly, &valid, config.import.liftover_unmapped_threshold)?;
    }
    if valid.is_empty() {
        return Err(ImportError::NoRecords);
    }

    let source: AnnotationSource = header.get("annotation_source").unwrap_or_default().parse()?;
    let service = registry.get(source)?;
    let annotation = service.get_annotation(refs, organism.taxa_id)?;
    service.create_annotation(storage, refs, &annotation)?;

    let ids = storage.reserve_record_ids(valid.len())?;
    let stored: Vec<StoredRecord> = ids
        .zip(valid)
        .map(|(id, record)| StoredRecord { id, record })
        .collect();
    let rows = service.annotate_records(refs, &annotation, &stored)?;

    let mut writer = BatchWriter::new(storage);
    match &params.update {
        Some(id) => writer.queue(BatchItem::ClearRecords(id.clone())),
        None => writer.queue(dataset),
    }
    let record_count = stored.len();
    for record in stored {
        writer.queue(record);
    }
    let row_count = rows.len();
    for row in rows {
        writer.queue(row);
    }
    writer.flush()?;

    info!(
        "imported dataset {}: {} records, {} annotation rows",
        dataset_id, record_count, row_count
    );
    Ok(dataset_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryReference, MemoryStore};

    fn header(assembly: &str) -> EufHeader {
        let text = format!(
            "#fileformat=bedRModv1.8\n#organism=9606\n#modification_type=RNA\n#assembly={}\n\
             #annotation_source=ensembl\n#annotation_version=110\n",
            assembly
        );
        EufHeader::parse(text.as_bytes()).unwrap()
    }

    fn refs() -> MemoryReference {
        MemoryReference {
            organisms: vec![Organism {
                id: 1,
                taxa_id: 9606,
                name: "H. sapiens".into(),
            }],
            modifications: vec![Modification {
                id: 1,
                short_name: "m6A".into(),
            }],
            selections: vec![Selection {
                modification_id: 1,
                organism_id: 1,
                technology_id: 1,
            }],
            assemblies: vec![
                Assembly {
                    id: 1,
                    name: "GRCh38".into(),
                    taxa_id: 9606,
                    version: 2,
                    is_current: true,
                },
                Assembly {
                    id: 2,
                    name: "GRCh37".into(),
                    taxa_id: 9606,
                    version: 1,
                    is_current: false,
                },
            ],
            ..MemoryReference::default()
        }
    }

    fn params() -> ImportParams {
        ImportParams {
            project_id: "P1".into(),
            title: "HEK293".into(),
            organism_id: 1,
            technology_id: 1,
            modification_ids: vec![1],
            update: None,
        }
    }

    #[test]
    fn test_taxon_and_assembly() {
        let refs = refs();
        let organism = resolve_taxon(&refs, &header("GRCh38"), &params()).unwrap();
        assert!(resolve_assembly(&refs, &header("GRCh37"), &organism).unwrap().id == 2);
        assert!(matches!(
            resolve_assembly(&refs, &header("GRCm39"), &organism),
            Err(ImportError::AssemblyMismatch { .. })
        ));

        let mut wrong = header("GRCh38");
        wrong.insert("organism", "10090");
        let err = resolve_taxon(&refs, &wrong, &params()).unwrap_err();
        assert!(matches!(err, ImportError::TaxonMismatch { header: 10090, expected: 9606 }));
        assert_eq!(err.class(), ErrorClass::Consistency);
    }

    #[test]
    fn test_missing_selection_names_triple() {
        let mut p = params();
        p.technology_id = 7;
        let err = resolve_selections(&refs(), &p).unwrap_err();
        assert!(err.to_string().contains("technology 7"));
        assert_eq!(err.class(), ErrorClass::ReferenceIntegrity);
    }

    #[test]
    fn test_duplicate_rules() {
        let mut store = MemoryStore::new();
        let existing = Dataset {
            id: "AAAAAAAAAAAA".parse().unwrap(),
            project_id: "P1".into(),
            title: "HEK293".into(),
            modification_ids: vec![1],
            organism_id: 1,
            technology_id: 1,
            assembly_id: 1,
        };
        let mut writer = BatchWriter::new(&mut store);
        writer.queue(existing.clone());
        writer.flush().unwrap();

        let mut candidate = existing.clone();
        candidate.id = "BBBBBBBBBBBB".parse().unwrap();
        assert!(matches!(
            check_duplicate(&store, &candidate, None),
            Err(ImportError::Duplicate(_))
        ));
        check_duplicate(&store, &existing, Some(&existing.id)).unwrap();

        let mut other = existing.clone();
        other.title = "HeLa".into();
        assert!(matches!(
            check_duplicate(&store, &other, Some(&existing.id)),
            Err(ImportError::NoDuplicate(_))
        ));
        assert!(matches!(
            check_duplicate(&store, &other, Some(&candidate.id)),
            Err(ImportError::DatasetNotFound(_))
        ));
        check_duplicate(&store, &other, None).unwrap();
    }

    #[test]
    fn test_unsupported_version() {
        let mut h = header("GRCh38");
        h.insert("fileformat", "bedRModv1.2");
        let err = check_header(&h).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Specification);
    }
}
