//! Feature partition files and record-to-feature assignment.

use super::{AnnotationError, Result};
use crate::bed::read_records;
use crate::interval::{BedRecord, Strand};
use crate::record::{AnnotationFeatureRecord, DataAnnotationRecord, FeatureKind, StoredRecord};
use crate::streaming::BedWriter;
use crate::toolkit::{IntervalToolkit, ToolkitError};
use log::debug;
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Everything one reference release yields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partitions {
    /// Partition contents; `name` holds comma-joined gene ids
    pub files: Vec<(FeatureKind, Vec<BedRecord>)>,
    pub genes: Vec<AnnotationFeatureRecord>,
}

fn partition_path(dir: &Path, kind: FeatureKind) -> PathBuf {
    dir.join(format!("{}.bed", kind.stem()))
}

/// Write one partition as `{dir}/{stem}.bed`.
pub fn write_partition(dir: &Path, kind: FeatureKind, records: &[BedRecord]) -> Result<()> {
    let path = partition_path(dir, kind);
    let mut writer = BedWriter::new(File::create(&path)?);
    for record in records {
        writer.write_record(record)?;
    }
    writer.flush()?;
    debug!("wrote {} {} intervals to {}", records.len(), kind.stem(), path.display());
    Ok(())
}

/// Read one partition back; a missing file is a format error.
pub fn read_partition(dir: &Path, kind: FeatureKind) -> Result<Vec<BedRecord>> {
    let path = partition_path(dir, kind);
    if !path.is_file() {
        return Err(AnnotationError::Format(format!("missing partition {}", path.display())));
    }
    Ok(read_records(&path)?)
}

/// Associate records with the genes of each feature partition.
///
/// Stranded records only match features on their own strand; records with an
/// undefined strand match either. `Intergenic` is a catch-all and only
/// applies to records no earlier partition matched.
pub fn assign_features(
    toolkit: &IntervalToolkit,
    dir: &Path,
    features: &[FeatureKind],
    records: &[StoredRecord],
) -> Result<Vec<DataAnnotationRecord>> {
    let (stranded, unstranded): (Vec<BedRecord>, Vec<BedRecord>) = records
        .iter()
        .map(|r| {
            let mut bed = r.record.bed.clone();
            bed.name = r.id.to_string();
            bed
        })
        .partition(|bed| bed.strand != Strand::Undefined);

    let mut rows = BTreeSet::new();
    let mut matched: FxHashSet<u64> = FxHashSet::default();

    for &kind in features {
        let partition = read_partition(dir, kind)?;
        let catch_all = kind == FeatureKind::Intergenic;

        for (query, by_strand) in [(&stranded, true), (&unstranded, false)] {
            if query.is_empty() {
                continue;
            }
            let pending: Vec<BedRecord>;
            let query = if catch_all {
                pending = query
                    .iter()
                    .filter(|bed| record_id(bed).is_ok_and(|id| !matched.contains(&id)))
                    .cloned()
                    .collect();
                &pending
            } else {
                query
            };
            if query.is_empty() {
                continue;
            }

            for pair in toolkit.intersect(query, std::slice::from_ref(&partition), by_strand)? {
                let data_record_id = record_id(&pair.a)?;
                matched.insert(data_record_id);
                for gene_id in pair.b.name.split(',').filter(|g| !g.is_empty()) {
                    rows.insert(DataAnnotationRecord {
                        gene_id: gene_id.to_string(),
                        data_record_id,
                        feature: kind,
                    });
                }
            }
        }
    }

    debug!(
        "{} of {} records matched {} partitions",
        matched.len(),
        records.len(),
        features.len()
    );
    Ok(rows.into_iter().collect())
}

fn record_id(bed: &BedRecord) -> std::result::Result<u64, ToolkitError> {
    bed.name.parse().map_err(|_| ToolkitError::Decode {
        line: 0,
        message: format!("record id '{}' is not numeric", bed.name),
    })
}
