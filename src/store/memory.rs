//! In-memory store and reference catalog.

use super::{BatchItem, ReferenceData, Result, Storage, StoreError, WriteBatch};
use crate::genome::Genome;
use crate::record::{
    Annotation, AnnotationFeatureRecord, AnnotationSource, Assembly, DataAnnotationRecord, Dataset,
    DatasetId, Modification, Organism, RecordId, Selection, StoredRecord,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::ops::Range;

/// [`Storage`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: BTreeMap<DatasetId, Dataset>,
    records: BTreeMap<RecordId, StoredRecord>,
    by_dataset: FxHashMap<DatasetId, Vec<RecordId>>,
    annotations: BTreeSet<DataAnnotationRecord>,
    features: FxHashMap<u32, Vec<AnnotationFeatureRecord>>,
    next_record_id: RecordId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_record_id: 1,
            ..Self::default()
        }
    }

    /// Persisted features of an annotation release.
    pub fn features(&self, annotation_id: u32) -> &[AnnotationFeatureRecord] {
        self.features
            .get(&annotation_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Check a batch against the current state without touching it.
    fn validate(&self, batch: &WriteBatch) -> Result<()> {
        let mut new_datasets: FxHashSet<&DatasetId> = FxHashSet::default();
        let mut cleared: FxHashSet<&DatasetId> = FxHashSet::default();

        for item in &batch.items {
            match item {
                BatchItem::Dataset(ds) => {
                    if self.datasets.contains_key(&ds.id) || !new_datasets.insert(&ds.id) {
                        return Err(StoreError::Conflict(format!(
                            "dataset {} already exists",
                            ds.id
                        )));
                    }
                }
                BatchItem::ClearRecords(id) => {
                    if !self.datasets.contains_key(id) {
                        return Err(StoreError::NotFound(format!("dataset {}", id)));
                    }
                    cleared.insert(id);
                }
                _ => {}
            }
        }

        let mut known: FxHashSet<RecordId> = self
            .records
            .values()
            .filter(|r| !cleared.contains(&r.record.dataset_id))
            .map(|r| r.id)
            .collect();

        for item in &batch.items {
            match item {
                BatchItem::Record(rec) => {
                    let ds = &rec.record.dataset_id;
                    if !self.datasets.contains_key(ds) && !new_datasets.contains(ds) {
                        return Err(StoreError::NotFound(format!("dataset {}", ds)));
                    }
                    if !known.insert(rec.id) {
                        return Err(StoreError::Conflict(format!(
                            "record {} already exists",
                            rec.id
                        )));
                    }
                }
                BatchItem::Annotation(row) => {
                    if !known.contains(&row.data_record_id) {
                        return Err(StoreError::NotFound(format!("record {}", row.data_record_id)));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn clear_records(&mut self, id: &DatasetId) {
        let Some(ids) = self.by_dataset.remove(id) else {
            return;
        };
        let removed: FxHashSet<RecordId> = ids.into_iter().collect();
        for rid in &removed {
            self.records.remove(rid);
        }
        self.annotations.retain(|row| !removed.contains(&row.data_record_id));
    }
}

impl Storage for MemoryStore {
    fn get_dataset(&self, id: &DatasetId) -> Result<Option<Dataset>> {
        Ok(self.datasets.get(id).cloned())
    }

    fn datasets(&self) -> Result<Vec<Dataset>> {
        Ok(self.datasets.values().cloned().collect())
    }

    fn get_records_by_dataset(&self, id: &DatasetId) -> Result<Vec<StoredRecord>> {
        if !self.datasets.contains_key(id) {
            return Err(StoreError::NotFound(format!("dataset {}", id)));
        }
        Ok(self
            .by_dataset
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.records.get(rid).cloned())
            .collect())
    }

    fn get_annotations_by_dataset(&self, id: &DatasetId) -> Result<Vec<DataAnnotationRecord>> {
        let ids: FxHashSet<RecordId> = self
            .by_dataset
            .get(id)
            .into_iter()
            .flatten()
            .copied()
            .collect();
        Ok(self
            .annotations
            .iter()
            .filter(|row| ids.contains(&row.data_record_id))
            .cloned()
            .collect())
    }

    fn feature_count(&self, annotation_id: u32) -> Result<usize> {
        Ok(self.features(annotation_id).len())
    }

    fn reserve_record_ids(&mut self, count: usize) -> Result<Range<RecordId>> {
        let start = self.next_record_id;
        self.next_record_id += count as RecordId;
        Ok(start..self.next_record_id)
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        self.validate(&batch)?;

        let (clears, rest): (Vec<_>, Vec<_>) = batch
            .items
            .into_iter()
            .partition(|item| matches!(item, BatchItem::ClearRecords(_)));
        for item in clears {
            if let BatchItem::ClearRecords(id) = item {
                self.clear_records(&id);
            }
        }

        for item in rest {
            match item {
                BatchItem::Dataset(ds) => {
                    self.datasets.insert(ds.id.clone(), ds);
                }
                BatchItem::Record(rec) => {
                    self.by_dataset
                        .entry(rec.record.dataset_id.clone())
                        .or_default()
                        .push(rec.id);
                    self.next_record_id = self.next_record_id.max(rec.id + 1);
                    self.records.insert(rec.id, rec);
                }
                BatchItem::Annotation(row) => {
                    self.annotations.insert(row);
                }
                BatchItem::Feature {
                    annotation_id,
                    feature,
                } => {
                    self.features.entry(annotation_id).or_default().push(feature);
                }
                BatchItem::ClearRecords(_) => {}
            }
        }
        Ok(())
    }
}

/// [`ReferenceData`] backed by in-memory tables and file contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryReference {
    pub organisms: Vec<Organism>,
    pub modifications: Vec<Modification>,
    pub selections: Vec<Selection>,
    pub assemblies: Vec<Assembly>,
    pub annotations: Vec<Annotation>,
    /// Chromosome sizes per assembly id
    pub chrom_sizes: FxHashMap<u32, Genome>,
    /// Raw reference annotation per annotation id
    pub annotation_files: FxHashMap<u32, Vec<u8>>,
    /// Chain files per (from assembly id, to assembly id)
    pub chain_files: FxHashMap<(u32, u32), Vec<u8>>,
}

impl ReferenceData for MemoryReference {
    fn organism(&self, id: u32) -> Option<Organism> {
        self.organisms.iter().find(|o| o.id == id).cloned()
    }

    fn modification(&self, id: u32) -> Option<Modification> {
        self.modifications.iter().find(|m| m.id == id).cloned()
    }

    fn selection_exists(&self, selection: &Selection) -> bool {
        self.selections.contains(selection)
    }

    fn assembly_by_name(&self, taxa_id: u32, name: &str) -> Option<Assembly> {
        self.assemblies
            .iter()
            .find(|a| a.taxa_id == taxa_id && a.name == name)
            .cloned()
    }

    fn current_assembly(&self, taxa_id: u32) -> Option<Assembly> {
        self.assemblies
            .iter()
            .find(|a| a.taxa_id == taxa_id && a.is_current)
            .cloned()
    }

    fn current_annotation(&self, taxa_id: u32, source: AnnotationSource) -> Option<Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.taxa_id == taxa_id && a.source == source)
            .max_by_key(|a| a.release)
            .cloned()
    }

    fn chrom_sizes(&self, assembly: &Assembly) -> Result<Genome> {
        self.chrom_sizes
            .get(&assembly.id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("chromosome sizes of {}", assembly.name)))
    }

    fn annotation_reader(&self, annotation: &Annotation) -> Result<Box<dyn Read + '_>> {
        self.annotation_files
            .get(&annotation.id)
            .map(|bytes| Box::new(bytes.as_slice()) as Box<dyn Read + '_>)
            .ok_or_else(|| {
                StoreError::NotFound(format!("reference file of annotation {}", annotation.id))
            })
    }

    fn chain_reader(&self, from: &Assembly, to: &Assembly) -> Result<Box<dyn Read + '_>> {
        self.chain_files
            .get(&(from.id, to.id))
            .map(|bytes| Box::new(bytes.as_slice()) as Box<dyn Read + '_>)
            .ok_or_else(|| StoreError::NotFound(format!("chain file {} to {}", from.name, to.name)))
    }
}
