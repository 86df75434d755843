//! Feature annotation.
//!
//! An annotation release is turned once into feature partition files
//! (`exon.bed`, `intron.bed`, ...) under a write-once directory, and its gene
//! rows are persisted. Records are then annotated by intersecting them with
//! each partition in turn.
//!
//! Two reference sources exist, Ensembl (GTF) and GtRNAdb (BED12). Each is an
//! [`AnnotationService`]; the [`AnnotationRegistry`] picks one by
//! [`AnnotationSource`].

mod ensembl;
mod features;
pub mod gtf;
mod gtrnadb;

pub use ensembl::EnsemblAnnotation;
pub use features::{assign_features, read_partition, write_partition, Partitions};
pub use gtrnadb::GtRnaAnnotation;

use crate::bed::BedError;
use crate::config::EngineConfig;
use crate::error::ErrorClass;
use crate::genome::Genome;
use crate::record::{
    Annotation, AnnotationSource, DataAnnotationRecord, DatasetId, FeatureKind, StoredRecord,
};
use crate::store::{BatchItem, BatchWriter, ReferenceData, Storage, StoreError};
use crate::toolkit::{IntervalToolkit, ToolkitError};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotationError {
    /// An expected partition file is missing.
    #[error("annotation format error: {0}")]
    Format(String),

    /// Partition files and persisted rows disagree.
    #[error("annotation version error: {0}")]
    Version(String),

    #[error("reference parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Bed(#[from] BedError),

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AnnotationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AnnotationError::Format(_) | AnnotationError::Version(_) | AnnotationError::Bed(_) => {
                ErrorClass::Consistency
            }
            AnnotationError::Parse { .. } => ErrorClass::Specification,
            AnnotationError::NotFound(_) => ErrorClass::ReferenceIntegrity,
            AnnotationError::Io(_) | AnnotationError::Toolkit(_) => ErrorClass::ExternalTool,
            AnnotationError::Store(e) => e.class(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnnotationError>;

/// Lifecycle of one annotation release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationState {
    NotCreated,
    Downloading,
    FeaturePartitioning,
    Ready,
}

impl AnnotationState {
    /// Current state from what is on disk and in the store.
    ///
    /// Persisted rows mean `Ready`. A partition directory without rows is an
    /// inconsistency and is never repaired.
    pub fn resolve(dir: &Path, persisted_rows: usize) -> Result<Self> {
        match (persisted_rows > 0, dir.exists()) {
            (true, _) => Ok(AnnotationState::Ready),
            (false, true) => Err(AnnotationError::Version(format!(
                "{} exists but no feature rows are persisted",
                dir.display()
            ))),
            (false, false) => Ok(AnnotationState::NotCreated),
        }
    }
}

/// What every annotation source shares.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub data_dir: PathBuf,
    pub intergenic_prefix: String,
    pub toolkit: IntervalToolkit,
}

impl ServiceContext {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            data_dir: config.annotation.data_dir.clone(),
            intergenic_prefix: config.annotation.intergenic_prefix.clone(),
            toolkit: IntervalToolkit::new(&config.toolkit),
        }
    }

    /// Synthetic gene id of intergenic regions, stable per release.
    pub fn intergenic_id(&self, annotation: &Annotation) -> String {
        format!("{}{}", self.intergenic_prefix, annotation.release)
    }
}

/// Capability interface of an annotation source.
pub trait AnnotationService {
    fn source(&self) -> AnnotationSource;

    /// Partitions this source produces, in assignment order.
    fn features(&self) -> &'static [FeatureKind];

    fn context(&self) -> &ServiceContext;

    /// Turn the raw reference stream into partitions and gene rows.
    fn build_partitions(
        &self,
        reference: &mut dyn Read,
        genome: &Genome,
        annotation: &Annotation,
    ) -> Result<Partitions>;

    /// Latest release of this source for a taxon.
    fn get_annotation(&self, refs: &dyn ReferenceData, taxa_id: u32) -> Result<Annotation> {
        refs.current_annotation(taxa_id, self.source())
            .ok_or_else(|| {
                let what = format!("{} annotation for taxon {}", self.source(), taxa_id);
                AnnotationError::NotFound(what)
            })
    }

    /// Build and persist a release unless it is already `Ready`.
    fn create_annotation(
        &self,
        storage: &mut dyn Storage,
        refs: &dyn ReferenceData,
        annotation: &Annotation,
    ) -> Result<AnnotationState> {
        let dir = annotation_dir(self.context(), refs, annotation)?;
        let state = AnnotationState::resolve(&dir, storage.feature_count(annotation.id)?)?;
        if state == AnnotationState::Ready {
            debug!("annotation {} is ready", annotation.id);
            return Ok(state);
        }

        let assembly = current_assembly(refs, annotation.taxa_id)?;
        let genome = refs.chrom_sizes(&assembly)?;

        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&dir).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => {
                AnnotationError::Version(format!("{} was created concurrently", dir.display()))
            }
            _ => AnnotationError::Io(e),
        })?;

        let built = (|| -> Result<()> {
            info!("annotation {}: {:?}", annotation.id, AnnotationState::Downloading);
            let mut reference = refs.annotation_reader(annotation)?;

            info!("annotation {}: {:?}", annotation.id, AnnotationState::FeaturePartitioning);
            let partitions = self.build_partitions(&mut reference, &genome, annotation)?;
            if partitions.genes.is_empty() {
                return Err(AnnotationError::Format(format!(
                    "reference of annotation {} contains no genes",
                    annotation.id
                )));
            }
            for (kind, records) in &partitions.files {
                write_partition(&dir, *kind, records)?;
            }

            let mut writer = BatchWriter::new(storage);
            for gene in partitions.genes {
                writer.queue(BatchItem::Feature {
                    annotation_id: annotation.id,
                    feature: gene,
                });
            }
            writer.flush()?;
            Ok(())
        })();

        if let Err(e) = built {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                warn!("could not remove {}: {}", dir.display(), cleanup);
            }
            return Err(e);
        }

        info!("annotation {}: {:?}", annotation.id, AnnotationState::Ready);
        Ok(AnnotationState::Ready)
    }

    /// Association rows for `records`; nothing is written.
    fn annotate_records(
        &self,
        refs: &dyn ReferenceData,
        annotation: &Annotation,
        records: &[StoredRecord],
    ) -> Result<Vec<DataAnnotationRecord>> {
        let ctx = self.context();
        let dir = annotation_dir(ctx, refs, annotation)?;
        assign_features(&ctx.toolkit.sorting(), &dir, self.features(), records)
    }
}

/// Partition directory of a release: `{data_dir}/{taxa}/{assembly}/{source}/{release}`.
pub fn annotation_dir(
    ctx: &ServiceContext,
    refs: &dyn ReferenceData,
    annotation: &Annotation,
) -> Result<PathBuf> {
    let assembly = current_assembly(refs, annotation.taxa_id)?;
    Ok(ctx
        .data_dir
        .join(annotation.taxa_id.to_string())
        .join(&assembly.name)
        .join(annotation.source.as_str())
        .join(annotation.release.to_string()))
}

fn current_assembly(refs: &dyn ReferenceData, taxa_id: u32) -> Result<crate::record::Assembly> {
    refs.current_assembly(taxa_id)
        .ok_or_else(|| AnnotationError::NotFound(format!("current assembly for taxon {}", taxa_id)))
}

/// Annotation services by source, built once.
pub struct AnnotationRegistry {
    services: FxHashMap<AnnotationSource, Box<dyn AnnotationService>>,
}

impl AnnotationRegistry {
    pub fn new(config: &EngineConfig) -> Self {
        let ctx = ServiceContext::new(config);
        let mut services: FxHashMap<AnnotationSource, Box<dyn AnnotationService>> =
            FxHashMap::default();
        services.insert(AnnotationSource::Ensembl, Box::new(EnsemblAnnotation::new(ctx.clone())));
        services.insert(AnnotationSource::GtRnaDb, Box::new(GtRnaAnnotation::new(ctx)));
        Self { services }
    }

    pub fn get(&self, source: AnnotationSource) -> Result<&dyn AnnotationService> {
        self.services
            .get(&source)
            .map(Box::as_ref)
            .ok_or_else(|| AnnotationError::NotFound(format!("annotation service {}", source)))
    }
}

/// Annotate a stored dataset and commit its association rows as one unit.
///
/// Returns the number of rows written.
pub fn annotate(
    storage: &mut dyn Storage,
    refs: &dyn ReferenceData,
    registry: &AnnotationRegistry,
    source: AnnotationSource,
    taxa_id: u32,
    dataset_id: &DatasetId,
) -> Result<usize> {
    let service = registry.get(source)?;
    let annotation = service.get_annotation(refs, taxa_id)?;
    service.create_annotation(storage, refs, &annotation)?;

    let records = storage.get_records_by_dataset(dataset_id)?;
    let rows = service.annotate_records(refs, &annotation, &records)?;
    info!(
        "dataset {}: {} annotation rows for {} records",
        dataset_id,
        rows.len(),
        records.len()
    );

    let mut writer = BatchWriter::new(storage);
    for row in rows {
        writer.queue(row);
    }
    Ok(writer.flush()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("110");

        assert_eq!(AnnotationState::resolve(&missing, 0).unwrap(), AnnotationState::NotCreated);
        assert_eq!(AnnotationState::resolve(dir.path(), 3).unwrap(), AnnotationState::Ready);
        let err = AnnotationState::resolve(dir.path(), 0).unwrap_err();
        assert!(matches!(err, AnnotationError::Version(_)));
        assert_eq!(err.class(), ErrorClass::Consistency);
    }
}
