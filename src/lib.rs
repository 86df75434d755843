// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::type_complexity)]

//! modbed: RNA-modification interval annotation and comparison
//!
//! Records are bedRMod (EUF) rows: 0-based half-open BED6 coordinates plus
//! thick range, colour, coverage and modification frequency. The engine
//! annotates them with gene features, compares record sets, lifts them
//! across assembly versions and validates whole files before import.
//!
//! # Features
//!
//! - **Annotation**: Ensembl GTF and GtRNAdb BED12 references, partitioned
//!   into exon / UTR / CDS / intron / intergenic feature files
//! - **Comparison**: strand-aware intersect, closest and subtract
//! - **Liftover**: UCSC chain files with an unmapped-fraction gate
//! - **Import**: staged validation with an atomic commit
//!
//! # Example
//!
//! ```rust,no_run
//! use modbed::compare::{compare, read_upload, Operation, Upload};
//! use modbed::config::EngineConfig;
//! use modbed::toolkit::IntervalToolkit;
//! use std::fs::File;
//!
//! let config = EngineConfig::default();
//! let toolkit = IntervalToolkit::new(&config.toolkit);
//! let upload = |path: &str, tag: &str| Upload {
//!     reader: Box::new(File::open(path).unwrap()),
//!     tag: tag.into(),
//! };
//! let a = read_upload(upload("a.bedrmod", "a")).unwrap();
//! let b = read_upload(upload("b.bedrmod", "b")).unwrap();
//! let results = compare(&toolkit, Operation::Intersect, &a, &[b], true).unwrap();
//! ```

pub mod annotation;
pub mod bed;
pub mod commands;
pub mod compare;
pub mod config;
pub mod error;
pub mod euf;
pub mod genome;
pub mod import;
pub mod index;
pub mod interval;
pub mod liftover;
pub mod parallel;
pub mod record;
pub mod store;
pub mod streaming;
pub mod toolkit;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::ErrorClass;
pub use index::IntervalIndex;
pub use interval::{BedRecord, Interval, Strand};
pub use record::{ComparisonRecord, DatasetId, ModificationRecord};
pub use toolkit::IntervalToolkit;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::annotation::{annotate, AnnotationRegistry, AnnotationService};
    pub use crate::compare::{
        compare, compare_datasets, ComparisonRequest, ComparisonResult, Operation,
    };
    pub use crate::config::EngineConfig;
    pub use crate::import::{validate_and_import, ImportParams};
    pub use crate::interval::{BedRecord, Interval, Strand};
    pub use crate::liftover::{lift_records, liftover, ChainMapper, CoordinateMapper};
    pub use crate::record::{ComparisonRecord, DatasetId, FeatureKind, ModificationRecord};
    pub use crate::store::{MemoryReference, MemoryStore, ReferenceData, Storage};
    pub use crate::toolkit::IntervalToolkit;
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_merge_workflow() {
        use crate::bed::parse_records;
        use crate::config::ToolkitConfig;
        use crate::toolkit::IntervalToolkit;

        let content = "chr1\t100\t200\ta\t0\t+\nchr1\t150\t250\tb\t0\t+\nchr1\t300\t400\tc\t0\t+\n";
        let records = parse_records(content).unwrap();

        let toolkit = IntervalToolkit::new(&ToolkitConfig::default());
        let merged = toolkit.merge(&records, true).unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start(), 100);
        assert_eq!(merged[0].end(), 250);
        assert_eq!(merged[0].name, "a,b");
    }

    #[test]
    fn test_index_workflow() {
        use crate::bed::parse_records;
        use crate::index::IntervalIndex;

        let a = parse_records("chr1\t100\t200\ta\t0\t+\nchr1\t300\t400\tb\t0\t-\n").unwrap();
        let b = parse_records("chr1\t150\t250\tx\t0\t-\n").unwrap();

        let index = IntervalIndex::from_records(b);
        assert_eq!(index.find_overlaps(&a[0], false).len(), 1);
        assert!(index.find_overlaps(&a[0], true).is_empty());
        assert!(index.find_overlaps(&a[1], false).is_empty());
    }
}
