//! Persistence and reference-data contracts.
//!
//! The engines never write through [`Storage`] directly: they queue rows on
//! a [`BatchWriter`] and flush once per unit of work. A writer dropped
//! without a flush discards everything it queued.

mod memory;

pub use memory::{MemoryReference, MemoryStore};

use crate::error::ErrorClass;
use crate::genome::Genome;
use crate::record::{
    Annotation, AnnotationFeatureRecord, AnnotationSource, Assembly, DataAnnotationRecord, Dataset,
    DatasetId, Modification, Organism, RecordId, Selection, StoredRecord,
};
use log::debug;
use std::io::Read;
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::NotFound(_) => ErrorClass::ReferenceIntegrity,
            StoreError::Conflict(_) => ErrorClass::Consistency,
            StoreError::Io(_) => ErrorClass::ExternalTool,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persisted datasets, records and annotation rows.
pub trait Storage {
    fn get_dataset(&self, id: &DatasetId) -> Result<Option<Dataset>>;

    fn datasets(&self) -> Result<Vec<Dataset>>;

    /// Records of a dataset in insertion order.
    fn get_records_by_dataset(&self, id: &DatasetId) -> Result<Vec<StoredRecord>>;

    /// Association rows of every record in a dataset.
    fn get_annotations_by_dataset(&self, id: &DatasetId) -> Result<Vec<DataAnnotationRecord>>;

    /// Number of persisted feature rows of an annotation release.
    fn feature_count(&self, annotation_id: u32) -> Result<usize>;

    /// Reserve ids for records about to be queued. Reserved ids are never
    /// reused, even if the batch is discarded.
    fn reserve_record_ids(&mut self, count: usize) -> Result<Range<RecordId>>;

    /// Apply a batch atomically: either every row lands or none does.
    fn commit(&mut self, batch: WriteBatch) -> Result<()>;
}

/// Reference entities and raw reference files, read-only to the engines.
pub trait ReferenceData {
    fn organism(&self, id: u32) -> Option<Organism>;

    fn modification(&self, id: u32) -> Option<Modification>;

    fn selection_exists(&self, selection: &Selection) -> bool;

    fn assembly_by_name(&self, taxa_id: u32, name: &str) -> Option<Assembly>;

    fn current_assembly(&self, taxa_id: u32) -> Option<Assembly>;

    /// Latest release of `source` for a taxon.
    fn current_annotation(&self, taxa_id: u32, source: AnnotationSource) -> Option<Annotation>;

    fn chrom_sizes(&self, assembly: &Assembly) -> Result<Genome>;

    /// Raw GTF (Ensembl) or BED12 (GtRNAdb) stream of an annotation release.
    fn annotation_reader(&self, annotation: &Annotation) -> Result<Box<dyn Read + '_>>;

    /// Chain file mapping `from` onto `to`.
    fn chain_reader(&self, from: &Assembly, to: &Assembly) -> Result<Box<dyn Read + '_>>;
}

/// One row waiting to be committed.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    Dataset(Dataset),
    /// Remove a dataset's records (and their annotation rows) before the
    /// rest of the batch is applied
    ClearRecords(DatasetId),
    Record(StoredRecord),
    Annotation(DataAnnotationRecord),
    Feature {
        annotation_id: u32,
        feature: AnnotationFeatureRecord,
    },
}

impl From<Dataset> for BatchItem {
    fn from(dataset: Dataset) -> Self {
        BatchItem::Dataset(dataset)
    }
}

impl From<StoredRecord> for BatchItem {
    fn from(record: StoredRecord) -> Self {
        BatchItem::Record(record)
    }
}

impl From<DataAnnotationRecord> for BatchItem {
    fn from(row: DataAnnotationRecord) -> Self {
        BatchItem::Annotation(row)
    }
}

/// Rows committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub items: Vec<BatchItem>,
}

impl WriteBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Queue-then-flush writer over a [`Storage`].
///
/// `flush` consumes the writer, so it runs at most once; dropping an
/// unflushed writer rolls the queued rows back.
pub struct BatchWriter<'s, S: Storage + ?Sized> {
    storage: &'s mut S,
    batch: WriteBatch,
}

impl<'s, S: Storage + ?Sized> BatchWriter<'s, S> {
    pub fn new(storage: &'s mut S) -> Self {
        Self {
            storage,
            batch: WriteBatch::default(),
        }
    }

    pub fn queue<T: Into<BatchItem>>(&mut self, item: T) {
        self.batch.items.push(item.into());
    }

    /// Commit everything queued as one unit. Returns the number of rows.
    pub fn flush(mut self) -> Result<usize> {
        let batch = std::mem::take(&mut self.batch);
        let rows = batch.len();
        self.storage.commit(batch)?;
        debug!("committed {} rows", rows);
        Ok(rows)
    }
}

impl<S: Storage + ?Sized> Drop for BatchWriter<'_, S> {
    fn drop(&mut self) {
        if !self.batch.is_empty() {
            debug!("discarding {} uncommitted rows", self.batch.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(id: &str) -> Dataset {
        Dataset {
            id: id.parse().unwrap(),
            project_id: "P".into(),
            title: "t".into(),
            modification_ids: vec![1],
            organism_id: 1,
            technology_id: 1,
            assembly_id: 1,
        }
    }

    #[test]
    fn test_flush_commits() {
        let mut store = MemoryStore::new();
        let mut writer = BatchWriter::new(&mut store);
        writer.queue(dataset("AAAAAAAAAAAA"));
        assert_eq!(writer.flush().unwrap(), 1);
        assert!(store.get_dataset(&"AAAAAAAAAAAA".parse().unwrap()).unwrap().is_some());
    }

    #[test]
    fn test_drop_discards() {
        let mut store = MemoryStore::new();
        {
            let mut writer = BatchWriter::new(&mut store);
            writer.queue(dataset("AAAAAAAAAAAA"));
        }
        assert!(store.datasets().unwrap().is_empty());
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(StoreError::NotFound("x".into()).class(), ErrorClass::ReferenceIntegrity);
        assert_eq!(StoreError::Conflict("x".into()).class(), ErrorClass::Consistency);
    }
}
