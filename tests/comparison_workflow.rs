//! Comparison of stored datasets and uploads, through the library and the
//! `modbed` binary.

use modbed::compare::{
    compare, compare_datasets, filter_results, ComparisonError, ComparisonRequest, ComparisonResult,
    Operation, RecordFilter, Upload,
};
use modbed::config::ToolkitConfig;
use modbed::interval::{BedRecord, Strand};
use modbed::record::{ComparisonRecord, Dataset, DatasetId, ModificationRecord, StoredRecord};
use modbed::store::{BatchWriter, MemoryStore, Storage};
use modbed::toolkit::IntervalToolkit;
use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

// =============================================================================
// Helper functions
// =============================================================================

const HEADER: &str = "\
#fileformat=bedRModv1.8
#organism=9606
#modification_type=RNA
#assembly=GRCh38
#annotation_source=ensembl
#annotation_version=110
#chrom\tchromStart\tchromEnd\tname\tscore\tstrand\tthickStart\tthickEnd\titemRgb\tcoverage\tfrequency
";

fn line(start: u64, end: u64, strand: char, frequency: u8) -> String {
    format!(
        "1\t{s}\t{e}\tm6A\t900\t{strand}\t{s}\t{e}\t0,0,0\t30\t{frequency}\n",
        s = start,
        e = end
    )
}

fn modification(start: u64, end: u64, strand: Strand, dataset: &DatasetId) -> ModificationRecord {
    let bed = BedRecord::new("1", start, end, "m6A", 900, strand).unwrap();
    ModificationRecord::new(bed, start, end, "0,0,0", 30, 50, dataset.clone()).unwrap()
}

fn tagged(start: u64, end: u64, strand: Strand, tag: &str) -> ComparisonRecord {
    let id: DatasetId = "AAAAAAAAAAAA".parse().unwrap();
    ComparisonRecord::tagged(&modification(start, end, strand, &id), tag)
}

fn store_dataset(store: &mut MemoryStore, id: &DatasetId, records: Vec<ModificationRecord>) {
    let ids = store.reserve_record_ids(records.len()).unwrap();
    let mut writer = BatchWriter::new(store);
    writer.queue(Dataset {
        id: id.clone(),
        project_id: "P1".into(),
        title: id.to_string(),
        modification_ids: vec![1],
        organism_id: 1,
        technology_id: 1,
        assembly_id: 1,
    });
    for (id, record) in ids.zip(records) {
        writer.queue(StoredRecord { id, record });
    }
    writer.flush().unwrap();
}

fn rendered(results: &[ComparisonResult]) -> Vec<String> {
    results.iter().map(ToString::to_string).collect()
}

fn create_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file.flush().unwrap();
    file
}

fn run_modbed(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_modbed"))
        .args(args)
        .output()
        .expect("Failed to run modbed")
}

// =============================================================================
// Library
// =============================================================================

#[test]
fn test_strand_aware_intersect() {
    let toolkit = IntervalToolkit::default();
    let reference = vec![tagged(200, 201, Strand::Forward, "A")];
    let same = vec![tagged(197, 202, Strand::Forward, "B")];
    let opposite = vec![tagged(197, 202, Strand::Reverse, "B")];

    let hits = compare(&toolkit, Operation::Intersect, &reference, &[same], true).unwrap();
    assert_eq!(hits.len(), 1);
    match &hits[0] {
        ComparisonResult::Pair { other, distance, .. } => {
            assert_eq!(other.tag, "B");
            assert_eq!(*distance, None);
        }
        other => panic!("unexpected result {:?}", other),
    }

    let stranded =
        compare(&toolkit, Operation::Intersect, &reference, &[opposite.clone()], true).unwrap();
    assert!(stranded.is_empty());
    let unstranded =
        compare(&toolkit, Operation::Intersect, &reference, &[opposite], false).unwrap();
    assert_eq!(unstranded.len(), 1);
}

#[test]
fn test_stored_datasets() {
    let mut store = MemoryStore::new();
    let a: DatasetId = "RefDataset01".parse().unwrap();
    let b: DatasetId = "CmpDataset01".parse().unwrap();
    store_dataset(
        &mut store,
        &a,
        vec![
            modification(100, 101, Strand::Forward, &a),
            modification(500, 501, Strand::Forward, &a),
        ],
    );
    store_dataset(&mut store, &b, vec![modification(100, 101, Strand::Forward, &b)]);

    let toolkit = IntervalToolkit::default();
    let request = |operation| ComparisonRequest {
        operation,
        reference_ids: vec![a.clone()],
        comparison_ids: vec![b.clone()],
        upload: None,
        by_strand: true,
    };

    let hits = compare_datasets(&store, &toolkit, request(Operation::Intersect)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].reference().tag, a.as_str());

    let survivors = compare_datasets(&store, &toolkit, request(Operation::Subtract)).unwrap();
    assert_eq!(
        survivors,
        vec![ComparisonResult::Survivor(tagged(500, 501, Strand::Forward, a.as_str()))]
    );

    // Overlaps are not candidates, so the record at 100 has no neighbour
    let closest = compare_datasets(&store, &toolkit, request(Operation::Closest)).unwrap();
    assert_eq!(closest.len(), 1);
    assert_eq!(closest[0].reference().bed.start(), 500);
}

#[test]
fn test_repeat_comparisons_are_identical() {
    let on = |chrom: &str, start: u64, dataset: &DatasetId| {
        let bed = BedRecord::new(chrom, start, start + 1, "m6A", 900, Strand::Forward).unwrap();
        ModificationRecord::new(bed, start, start + 1, "0,0,0", 30, 50, dataset.clone()).unwrap()
    };
    let mut store = MemoryStore::new();
    let r: DatasetId = "RefDataset02".parse().unwrap();
    let c1: DatasetId = "CmpDataset02".parse().unwrap();
    let c2: DatasetId = "CmpDataset03".parse().unwrap();
    // Stored out of order on purpose
    store_dataset(&mut store, &r, vec![on("2", 50, &r), on("1", 300, &r), on("1", 100, &r)]);
    store_dataset(&mut store, &c1, vec![on("1", 400, &c1), on("1", 200, &c1)]);
    store_dataset(&mut store, &c2, vec![on("2", 10, &c2), on("1", 300, &c2)]);

    // Caller's sorted-input promise does not extend to stored data
    let toolkit = IntervalToolkit::new(&ToolkitConfig {
        temp_dir: None,
        assume_sorted: true,
    });
    let run = |operation| {
        let request = ComparisonRequest {
            operation,
            reference_ids: vec![r.clone()],
            comparison_ids: vec![c1.clone(), c2.clone()],
            upload: None,
            by_strand: true,
        };
        compare_datasets(&store, &toolkit, request).unwrap()
    };
    let closest = run(Operation::Closest);
    assert_eq!(closest, run(Operation::Closest));
    assert_eq!(rendered(&closest), rendered(&run(Operation::Closest)));
    let summary: Vec<_> = closest
        .iter()
        .map(|result| match result {
            ComparisonResult::Pair {
                reference,
                other,
                distance,
            } => (
                reference.bed.chrom().to_string(),
                reference.bed.start(),
                other.bed.start(),
                *distance,
            ),
            other => panic!("unexpected result {:?}", other),
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("1".to_string(), 100, 200, Some(100)),
            ("1".to_string(), 300, 200, Some(-100)),
            ("1".to_string(), 300, 400, Some(100)),
            ("2".to_string(), 50, 10, Some(-40)),
        ]
    );

    let survivors = run(Operation::Subtract);
    assert_eq!(rendered(&survivors), rendered(&run(Operation::Subtract)));
    let kept: Vec<_> = survivors
        .iter()
        .map(|s| (s.reference().bed.chrom().to_string(), s.reference().bed.start()))
        .collect();
    assert_eq!(kept, vec![("1".to_string(), 100), ("2".to_string(), 50)]);
}

#[test]
fn test_request_shape_errors() {
    let mut store = MemoryStore::new();
    let a: DatasetId = "RefDataset01".parse().unwrap();
    store_dataset(&mut store, &a, vec![modification(100, 101, Strand::Forward, &a)]);
    let toolkit = IntervalToolkit::default();

    let both = ComparisonRequest {
        operation: Operation::Intersect,
        reference_ids: vec![a.clone()],
        comparison_ids: vec![a.clone()],
        upload: Some(Upload {
            reader: Box::new(std::io::empty()),
            tag: "upload".into(),
        }),
        by_strand: false,
    };
    assert!(matches!(
        compare_datasets(&store, &toolkit, both),
        Err(ComparisonError::ConflictingSources)
    ));

    let missing = ComparisonRequest {
        operation: Operation::Intersect,
        reference_ids: vec![a.clone()],
        comparison_ids: vec!["Missing00000".parse().unwrap()],
        upload: None,
        by_strand: false,
    };
    assert!(matches!(
        compare_datasets(&store, &toolkit, missing),
        Err(ComparisonError::DatasetNotFound(_))
    ));
}

#[test]
fn test_upload_against_dataset() {
    let mut store = MemoryStore::new();
    let a: DatasetId = "RefDataset01".parse().unwrap();
    store_dataset(
        &mut store,
        &a,
        vec![
            modification(100, 101, Strand::Forward, &a),
            modification(300, 301, Strand::Forward, &a),
        ],
    );
    let body = format!("{}{}{}", HEADER, line(100, 101, '+', 80), "1\tbroken\n");

    let request = ComparisonRequest {
        operation: Operation::Intersect,
        reference_ids: vec![a.clone()],
        comparison_ids: Vec::new(),
        upload: Some(Upload {
            reader: Box::new(std::io::Cursor::new(body.into_bytes())),
            tag: "upload".into(),
        }),
        by_strand: true,
    };
    let hits = compare_datasets(&store, &IntervalToolkit::default(), request).unwrap();
    assert_eq!(hits.len(), 1);
    match &hits[0] {
        ComparisonResult::Pair { other, .. } => {
            assert_eq!((other.tag.as_str(), other.frequency), ("upload", 80))
        }
        other => panic!("unexpected result {:?}", other),
    }

    let keep: RecordFilter = "start>=200".parse().unwrap();
    assert!(filter_results(hits, &[keep]).is_empty());
}

// =============================================================================
// Binary
// =============================================================================

#[test]
fn test_cli_compare_closest() {
    let a = create_file(&format!("{}{}", HEADER, line(200, 201, '+', 50)));
    let b = create_file(&format!(
        "{}{}{}",
        HEADER,
        line(210, 211, '+', 50),
        line(150, 151, '-', 50)
    ));

    let output = run_modbed(&[
        "compare",
        "-a",
        a.path().to_str().unwrap(),
        "-b",
        b.path().to_str().unwrap(),
        "--operation",
        "closest",
        "-s",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let rows: Vec<&str> = stdout.lines().collect();
    assert_eq!(rows.len(), 1);
    let fields: Vec<&str> = rows[0].split('\t').collect();
    assert_eq!(fields[1], "200");
    assert_eq!(fields[13], "210");
    assert_eq!(fields.last().copied(), Some("10"));
}

#[test]
fn test_cli_rejects_bad_filter() {
    let a = create_file(&format!("{}{}", HEADER, line(200, 201, '+', 50)));
    let output = run_modbed(&[
        "compare",
        "-a",
        a.path().to_str().unwrap(),
        "-b",
        a.path().to_str().unwrap(),
        "--filter",
        "strand>=1",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("Error"));
}

#[test]
fn test_cli_validate_reports_drops() {
    let body = format!(
        "{}{}{}{}",
        HEADER,
        line(10, 11, '+', 50),
        line(20, 21, '+', 0),
        line(30, 31, '-', 60)
    );
    let file = create_file(&body);
    let genome = create_file("1\t1000\n");

    let output = run_modbed(&[
        "validate",
        "-i",
        file.path().to_str().unwrap(),
        "-g",
        genome.path().to_str().unwrap(),
        "-m",
        "m6A",
    ]);
    // One of three dropped is over the default 5% budget
    assert!(!output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("3 records\t2 valid\t1 dropped"), "{}", stdout);
}
