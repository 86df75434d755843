//! `modbed annotate` and `modbed liftover` over files.

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
";

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

fn record(chrom: &str, start: u64, strand: char) -> String {
    format!(
        "{}\t{}\t{}\tm6A\t900\t{}\t{}\t{}\t0,0,0\t30\t50\n",
        chrom,
        start,
        start + 1,
        strand,
        start,
        start + 1
    )
}

// =============================================================================
// annotate
// =============================================================================

#[test]
fn test_annotate_prints_features() {
    let gtf = create_file(
        "1\tensembl\tgene\t65301\t69036\t.\t+\t.\tgene_id \"ENSG00000186092\";\n\
         1\tensembl\texon\t65419\t65433\t.\t+\t.\tgene_id \"ENSG00000186092\";\n",
    );
    let genome = create_file("1\t100000\n");
    let input = create_file(&format!(
        "{}{}{}{}",
        HEADER,
        record("1", 65420, '+'),
        record("1", 65300, '+'),
        record("1", 0, '+')
    ));

    let output = run_modbed(&[
        "annotate",
        "-i",
        input.path().to_str().unwrap(),
        "-r",
        gtf.path().to_str().unwrap(),
        "-g",
        genome.path().to_str().unwrap(),
        "--release",
        "110",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let rows: Vec<Vec<&str>> = stdout.lines().map(|l| l.split('\t').collect()).collect();
    assert_eq!(rows.len(), 3);
    let by_start = |start: &str| {
        rows.iter()
            .find(|r| r[1] == start)
            .map(|r| (r[r.len() - 2], r[r.len() - 1]))
    };
    assert_eq!(by_start("65420"), Some(("ENSG00000186092", "Exonic")));
    assert_eq!(by_start("65300"), Some(("ENSG00000186092", "Intronic")));
    assert_eq!(by_start("0"), Some(("INTERGENIC110", "Intergenic")));
}

#[test]
fn test_annotate_unknown_source() {
    let empty = create_file("");
    let path = empty.path().to_str().unwrap();
    let output = run_modbed(&[
        "annotate", "-i", path, "-r", path, "-g", path, "--release", "1", "--source", "refseq",
    ]);
    assert!(!output.status.success());
}

// =============================================================================
// liftover
// =============================================================================

#[test]
fn test_liftover_shifts_records() {
    let chain = create_file("chain 1000 1 100000 + 0 90000 1 200000 + 1000 91000 1\n90000\n");
    let input = create_file(&format!(
        "{}{}{}",
        HEADER,
        record("1", 100, '+'),
        record("1", 200, '-')
    ));

    let output = run_modbed(&[
        "liftover",
        "-i",
        input.path().to_str().unwrap(),
        "--chain",
        chain.path().to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let starts: Vec<&str> = stdout.lines().map(|l| l.split('\t').nth(1).unwrap()).collect();
    assert_eq!(starts, vec!["1100", "1200"]);
}

#[test]
fn test_liftover_gate_fails_the_run() {
    let chain = create_file("chain 1000 1 100000 + 0 90000 1 200000 + 1000 91000 1\n90000\n");
    let input = create_file(&format!(
        "{}{}{}{}",
        HEADER,
        record("1", 100, '+'),
        record("1", 95_000, '+'),
        record("2", 10, '+')
    ));

    let output = run_modbed(&[
        "liftover",
        "-i",
        input.path().to_str().unwrap(),
        "--chain",
        chain.path().to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("data-quality"), "{}", stderr);
    assert!(output.stdout.is_empty());
}
