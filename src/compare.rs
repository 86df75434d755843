//! Cross-dataset comparison.
//!
//! One reference set is compared against one or more comparison sets with a
//! single strand flag. Output order is chromosome, then start, then the
//! position of the comparison set in the call.

use crate::error::ErrorClass;
use crate::euf::{EufError, EufReader};
use crate::interval::Strand;
use crate::record::{ComparisonRecord, DatasetId};
use crate::store::{Storage, StoreError};
use crate::toolkit::{IntervalToolkit, ToolkitError};
use log::{debug, warn};
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComparisonError {
    #[error("comparison datasets and an uploaded file are mutually exclusive")]
    ConflictingSources,

    #[error("no comparison set given")]
    NoComparisonSets,

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("invalid filter '{0}'")]
    InvalidFilter(String),

    #[error("dataset {0} not found")]
    DatasetNotFound(DatasetId),

    #[error(transparent)]
    Upload(#[from] EufError),

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ComparisonError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ComparisonError::ConflictingSources
            | ComparisonError::NoComparisonSets
            | ComparisonError::UnknownOperation(_)
            | ComparisonError::InvalidFilter(_) => ErrorClass::Specification,
            ComparisonError::DatasetNotFound(_) => ErrorClass::ReferenceIntegrity,
            ComparisonError::Upload(e) => e.class(),
            ComparisonError::Toolkit(e) => e.class(),
            ComparisonError::Store(e) => e.class(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ComparisonError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Intersect,
    Closest,
    Subtract,
}

impl FromStr for Operation {
    type Err = ComparisonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "intersect" => Ok(Operation::Intersect),
            "closest" => Ok(Operation::Closest),
            "subtract" => Ok(Operation::Subtract),
            _ => Err(ComparisonError::UnknownOperation(s.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Intersect => "intersect",
            Operation::Closest => "closest",
            Operation::Subtract => "subtract",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonResult {
    /// A reference record and one matched record. `distance` is set for
    /// closest only.
    Pair {
        reference: ComparisonRecord,
        other: ComparisonRecord,
        distance: Option<i64>,
    },
    /// A reference record that survived subtraction.
    Survivor(ComparisonRecord),
}

impl ComparisonResult {
    pub fn reference(&self) -> &ComparisonRecord {
        match self {
            ComparisonResult::Pair { reference, .. } => reference,
            ComparisonResult::Survivor(reference) => reference,
        }
    }
}

impl fmt::Display for ComparisonResult {
    /// Tab-separated: the reference columns, then the other record and the
    /// distance when present.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_record(f, self.reference())?;
        if let ComparisonResult::Pair { other, distance, .. } = self {
            f.write_str("\t")?;
            write_record(f, other)?;
            if let Some(d) = distance {
                write!(f, "\t{}", d)?;
            }
        }
        Ok(())
    }
}

fn write_record(f: &mut fmt::Formatter<'_>, r: &ComparisonRecord) -> fmt::Result {
    write!(
        f,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        r.bed, r.thick_start, r.thick_end, r.item_rgb, r.coverage, r.frequency, r.tag
    )
}

/// Run one comparison.
///
/// Chromosomes missing from a comparison set simply yield no matches (or no
/// removal). Comparing a set against itself is allowed.
pub fn compare(
    toolkit: &IntervalToolkit,
    operation: Operation,
    reference: &[ComparisonRecord],
    sets: &[Vec<ComparisonRecord>],
    by_strand: bool,
) -> Result<Vec<ComparisonResult>> {
    if sets.is_empty() {
        return Err(ComparisonError::NoComparisonSets);
    }
    debug!(
        "{}: {} reference records against {} sets (by_strand={})",
        operation,
        reference.len(),
        sets.len(),
        by_strand
    );

    let results = match operation {
        Operation::Intersect => toolkit
            .intersect(reference, sets, by_strand)?
            .into_iter()
            .map(|p| ComparisonResult::Pair {
                reference: p.a,
                other: p.b,
                distance: None,
            })
            .collect(),
        Operation::Closest => toolkit
            .closest(reference, sets, by_strand)?
            .into_iter()
            .filter_map(|p| {
                p.hit.map(|hit| ComparisonResult::Pair {
                    reference: p.a,
                    other: hit.b,
                    distance: Some(hit.distance),
                })
            })
            .collect(),
        Operation::Subtract => toolkit
            .subtract(reference, sets, by_strand)?
            .into_iter()
            .map(ComparisonResult::Survivor)
            .collect(),
    };
    Ok(results)
}

/// An ad-hoc bedRMod upload used as the single comparison set.
pub struct Upload {
    pub reader: Box<dyn Read>,
    /// Tag carried by every uploaded record
    pub tag: String,
}

/// A comparison between stored datasets, or against one upload.
pub struct ComparisonRequest {
    pub operation: Operation,
    pub reference_ids: Vec<DatasetId>,
    pub comparison_ids: Vec<DatasetId>,
    pub upload: Option<Upload>,
    pub by_strand: bool,
}

/// Resolve a request through the store and run it.
pub fn compare_datasets(
    storage: &dyn Storage,
    toolkit: &IntervalToolkit,
    request: ComparisonRequest,
) -> Result<Vec<ComparisonResult>> {
    let sets = match (request.comparison_ids.is_empty(), request.upload) {
        (false, Some(_)) => return Err(ComparisonError::ConflictingSources),
        (true, None) => return Err(ComparisonError::NoComparisonSets),
        (false, None) => request
            .comparison_ids
            .iter()
            .map(|id| load_dataset(storage, id))
            .collect::<Result<Vec<_>>>()?,
        (true, Some(upload)) => vec![read_upload(upload)?],
    };

    let mut reference = Vec::new();
    for id in &request.reference_ids {
        reference.extend(load_dataset(storage, id)?);
    }

    // Stored and concatenated sets carry no ordering promise.
    let toolkit = toolkit.sorting();
    compare(&toolkit, request.operation, &reference, &sets, request.by_strand)
}

fn load_dataset(storage: &dyn Storage, id: &DatasetId) -> Result<Vec<ComparisonRecord>> {
    if storage.get_dataset(id)?.is_none() {
        return Err(ComparisonError::DatasetNotFound(id.clone()));
    }
    Ok(storage
        .get_records_by_dataset(id)?
        .iter()
        .map(|r| ComparisonRecord::from(&r.record))
        .collect())
}

/// Parse an upload; malformed lines are skipped with a warning.
pub fn read_upload(upload: Upload) -> Result<Vec<ComparisonRecord>> {
    let mut reader = EufReader::new(upload.reader);
    let mut records = Vec::new();
    let mut skipped = 0usize;
    while let Some(line) = reader.next_line()? {
        match line {
            Ok(record) => records.push(record.into_comparison(upload.tag.clone())),
            Err(e) => {
                warn!("skipping upload line: {}", e);
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!("{} of {} upload lines skipped", skipped, skipped + records.len());
    }
    Ok(records)
}

/// Column a [`RecordFilter`] tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterColumn {
    Chrom,
    Start,
    End,
    Name,
    Score,
    Strand,
    Coverage,
    Frequency,
    Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}

enum FilterValue {
    Number(u64),
    Text(String),
}

/// One `column operator value` condition on a comparison record.
///
/// Numeric columns accept the ordering operators; text columns accept
/// equality and `contains`.
pub struct RecordFilter {
    column: FilterColumn,
    operator: FilterOperator,
    value: FilterValue,
}

impl RecordFilter {
    pub fn new(column: FilterColumn, operator: FilterOperator, value: &str) -> Result<Self> {
        let invalid =
            || ComparisonError::InvalidFilter(format!("{:?} {:?} {}", column, operator, value));
        let numeric = matches!(
            column,
            FilterColumn::Start
                | FilterColumn::End
                | FilterColumn::Score
                | FilterColumn::Coverage
                | FilterColumn::Frequency
        );
        let value = if numeric {
            if operator == FilterOperator::Contains {
                return Err(invalid());
            }
            FilterValue::Number(value.parse().map_err(|_| invalid())?)
        } else {
            if !matches!(
                operator,
                FilterOperator::Eq | FilterOperator::Ne | FilterOperator::Contains
            ) {
                return Err(invalid());
            }
            if column == FilterColumn::Strand {
                value.parse::<Strand>().map_err(|_| invalid())?;
            }
            FilterValue::Text(value.to_string())
        };
        Ok(Self {
            column,
            operator,
            value,
        })
    }

    pub fn matches(&self, record: &ComparisonRecord) -> bool {
        match &self.value {
            FilterValue::Number(want) => {
                let got = match self.column {
                    FilterColumn::Start => record.bed.start(),
                    FilterColumn::End => record.bed.end(),
                    FilterColumn::Score => u64::from(record.bed.score),
                    FilterColumn::Coverage => u64::from(record.coverage),
                    FilterColumn::Frequency => u64::from(record.frequency),
                    _ => return false,
                };
                match self.operator {
                    FilterOperator::Eq => got == *want,
                    FilterOperator::Ne => got != *want,
                    FilterOperator::Lt => got < *want,
                    FilterOperator::Le => got <= *want,
                    FilterOperator::Gt => got > *want,
                    FilterOperator::Ge => got >= *want,
                    FilterOperator::Contains => false,
                }
            }
            FilterValue::Text(want) => {
                let strand;
                let got = match self.column {
                    FilterColumn::Chrom => record.bed.chrom(),
                    FilterColumn::Name => record.bed.name.as_str(),
                    FilterColumn::Tag => record.tag.as_str(),
                    FilterColumn::Strand => {
                        strand = record.bed.strand.to_string();
                        strand.as_str()
                    }
                    _ => return false,
                };
                match self.operator {
                    FilterOperator::Eq => got == want,
                    FilterOperator::Ne => got != want,
                    FilterOperator::Contains => got.contains(want.as_str()),
                    _ => false,
                }
            }
        }
    }
}

impl FromStr for RecordFilter {
    type Err = ComparisonError;

    /// `frequency>=50`, `chrom=1`, `name~m6`.
    fn from_str(s: &str) -> Result<Self> {
        const OPERATORS: [(&str, FilterOperator); 7] = [
            (">=", FilterOperator::Ge),
            ("<=", FilterOperator::Le),
            ("!=", FilterOperator::Ne),
            ("=", FilterOperator::Eq),
            ("<", FilterOperator::Lt),
            (">", FilterOperator::Gt),
            ("~", FilterOperator::Contains),
        ];
        let invalid = || ComparisonError::InvalidFilter(s.to_string());
        // The operator is the first operator character; the value may hold more.
        let at = s
            .find(|c: char| matches!(c, '<' | '>' | '=' | '!' | '~'))
            .ok_or_else(invalid)?;
        let (column, rest) = s.split_at(at);
        let (operator, value) = OPERATORS
            .iter()
            .find_map(|(token, op)| rest.strip_prefix(token).map(|v| (*op, v.trim())))
            .ok_or_else(invalid)?;
        let column = match column.trim().to_ascii_lowercase().as_str() {
            "chrom" => FilterColumn::Chrom,
            "start" => FilterColumn::Start,
            "end" => FilterColumn::End,
            "name" => FilterColumn::Name,
            "score" => FilterColumn::Score,
            "strand" => FilterColumn::Strand,
            "coverage" => FilterColumn::Coverage,
            "frequency" => FilterColumn::Frequency,
            "tag" => FilterColumn::Tag,
            _ => return Err(invalid()),
        };
        RecordFilter::new(column, operator, value)
    }
}

/// Keep results whose reference record passes every filter.
pub fn filter_results(
    results: Vec<ComparisonResult>,
    filters: &[RecordFilter],
) -> Vec<ComparisonResult> {
    results
        .into_iter()
        .filter(|r| filters.iter().all(|f| f.matches(r.reference())))
        .collect()
}
