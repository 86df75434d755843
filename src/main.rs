//! modbed: annotation, comparison and liftover of bedRMod records
//!
//! Usage: modbed <COMMAND> [OPTIONS]

use clap::{ArgAction, Parser, Subcommand};
use log::{warn, LevelFilter};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;

use modbed::annotation::{annotate, AnnotationError, AnnotationRegistry};
use modbed::bed::BedError;
use modbed::compare::{
    compare, filter_results, read_upload, ComparisonError, Operation, RecordFilter, Upload,
};
use modbed::config::{ConfigError, EngineConfig};
use modbed::error::ErrorClass;
use modbed::euf::{EufError, EufHeader, EufReader};
use modbed::genome::Genome;
use modbed::import::{check_header, validate_records, ImportError};
use modbed::liftover::{lift_records, ChainMapper, LiftOverError};
use modbed::record::{
    Annotation, AnnotationSource, Assembly, Dataset, DatasetId, ModificationRecord, RecordError,
    StoredRecord,
};
use modbed::store::{BatchWriter, MemoryReference, MemoryStore, Storage, StoreError};
use modbed::toolkit::IntervalToolkit;

#[derive(Parser)]
#[command(name = "modbed")]
#[command(version)]
#[command(
    about = "Annotation, comparison and liftover of RNA-modification records",
    long_about = None
)]
struct Cli {
    /// Number of threads to use (default: number of CPUs)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    /// Engine configuration (JSON)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate bedRMod records with gene features
    Annotate {
        /// bedRMod records
        #[arg(short, long)]
        input: PathBuf,

        /// Reference annotation (GTF for ensembl, BED12 for gtrnadb)
        #[arg(short, long)]
        reference: PathBuf,

        /// Chromosome sizes of the assembly
        #[arg(short = 'g', long)]
        genome: PathBuf,

        /// Annotation source
        #[arg(long, default_value = "ensembl")]
        source: AnnotationSource,

        /// NCBI taxonomy id
        #[arg(long, default_value = "9606")]
        taxa: u32,

        /// Assembly name
        #[arg(long, default_value = "GRCh38")]
        assembly: String,

        /// Annotation release
        #[arg(long)]
        release: u32,

        /// Directory for feature partitions; must not hold this release yet
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Compare bedRMod files
    Compare {
        /// Reference records
        #[arg(short = 'a', long)]
        file_a: PathBuf,

        /// Comparison records, one set per file
        #[arg(short = 'b', long, required = true, num_args = 1..)]
        file_b: Vec<PathBuf>,

        /// intersect, closest or subtract
        #[arg(short, long, default_value = "intersect")]
        operation: Operation,

        /// Require same strand
        #[arg(short, long)]
        strand: bool,

        /// Keep results whose reference record matches, e.g. `frequency>=50`
        #[arg(short, long)]
        filter: Vec<String>,
    },

    /// Lift bedRMod records through a chain file
    Liftover {
        /// bedRMod records
        #[arg(short, long)]
        input: PathBuf,

        /// UCSC chain file from the records' assembly to the target
        #[arg(long)]
        chain: PathBuf,

        /// Maximum unmapped fraction (overrides the config)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Check a bedRMod file without importing it
    Validate {
        /// bedRMod file
        #[arg(short, long)]
        input: PathBuf,

        /// Chromosome sizes of the header assembly
        #[arg(short = 'g', long)]
        genome: PathBuf,

        /// Accepted modification short names
        #[arg(short, long, required = true)]
        modification: Vec<String>,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bed(#[from] BedError),
    #[error(transparent)]
    Euf(#[from] EufError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Annotation(#[from] AnnotationError),
    #[error(transparent)]
    Comparison(#[from] ComparisonError),
    #[error(transparent)]
    LiftOver(#[from] LiftOverError),
    #[error(transparent)]
    Import(#[from] ImportError),
}

impl CliError {
    fn class(&self) -> Option<ErrorClass> {
        match self {
            CliError::Io(_) | CliError::Config(_) | CliError::Bed(_) | CliError::Record(_) => None,
            CliError::Euf(e) => Some(e.class()),
            CliError::Store(e) => Some(e.class()),
            CliError::Annotation(e) => Some(e.class()),
            CliError::Comparison(e) => Some(e.class()),
            CliError::LiftOver(e) => Some(e.class()),
            CliError::Import(e) => Some(e.class()),
        }
    }
}

type Result<T> = std::result::Result<T, CliError>;

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    pretty_env_logger::formatted_builder().filter_level(level).init();

    if let Some(n) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
            eprintln!("Error: failed to initialize thread pool: {}", e);
            process::exit(1);
        }
    }

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Annotate {
            input,
            reference,
            genome,
            source,
            taxa,
            assembly,
            release,
            data_dir,
        } => run_annotate(
            config, input, reference, genome, source, taxa, assembly, release, data_dir,
        ),
        Commands::Compare {
            file_a,
            file_b,
            operation,
            strand,
            filter,
        } => run_compare(config, file_a, file_b, operation, strand, filter),
        Commands::Liftover {
            input,
            chain,
            threshold,
        } => run_liftover(config, input, chain, threshold),
        Commands::Validate {
            input,
            genome,
            modification,
        } => run_validate(config, input, genome, modification),
    });

    if let Err(e) = result {
        match e.class() {
            Some(class) => eprintln!("Error ({}): {}", class, e),
            None => eprintln!("Error: {}", e),
        }
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    Ok(match path {
        Some(p) => EngineConfig::from_path(p)?,
        None => EngineConfig::default(),
    })
}

/// Read bedRMod records, skipping lines that do not form a valid record.
fn read_modifications(path: &Path, dataset_id: &DatasetId) -> Result<Vec<ModificationRecord>> {
    let mut reader = EufReader::new(File::open(path)?);
    let mut records = Vec::new();
    while let Some(line) = reader.next_line()? {
        let record = line
            .map_err(CliError::from)
            .and_then(|r| Ok(r.into_modification(dataset_id.clone())?));
        match record {
            Ok(record) => records.push(record),
            Err(e) => warn!("skipping {}: {}", path.display(), e),
        }
    }
    Ok(records)
}

fn upload_tag(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn run_annotate(
    mut config: EngineConfig,
    input: PathBuf,
    reference: PathBuf,
    genome: PathBuf,
    source: AnnotationSource,
    taxa: u32,
    assembly: String,
    release: u32,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    // Partitions are write-once per directory, so without an explicit
    // directory each run builds into a scratch one.
    let _scratch = match data_dir {
        Some(dir) => {
            config.annotation.data_dir = dir;
            None
        }
        None => {
            let scratch = tempfile::tempdir()?;
            config.annotation.data_dir = scratch.path().to_path_buf();
            Some(scratch)
        }
    };

    let assembly = Assembly {
        id: 1,
        name: assembly,
        taxa_id: taxa,
        version: 1,
        is_current: true,
    };
    let mut refs = MemoryReference {
        assemblies: vec![assembly],
        annotations: vec![Annotation {
            id: 1,
            taxa_id: taxa,
            release,
            source,
        }],
        ..MemoryReference::default()
    };
    refs.chrom_sizes.insert(1, Genome::from_file(&genome)?);
    refs.annotation_files.insert(1, fs::read(&reference)?);

    let mut store = MemoryStore::new();
    let dataset_id = DatasetId::generate(&mut rand::thread_rng());
    let records = read_modifications(&input, &dataset_id)?;
    let ids = store.reserve_record_ids(records.len())?;
    let mut writer = BatchWriter::new(&mut store);
    writer.queue(Dataset {
        id: dataset_id.clone(),
        project_id: String::new(),
        title: upload_tag(&input),
        modification_ids: Vec::new(),
        organism_id: 0,
        technology_id: 0,
        assembly_id: 1,
    });
    for (id, record) in ids.zip(records) {
        writer.queue(StoredRecord { id, record });
    }
    writer.flush()?;

    let registry = AnnotationRegistry::new(&config);
    annotate(&mut store, &refs, &registry, source, taxa, &dataset_id)?;

    let records = store.get_records_by_dataset(&dataset_id)?;
    let rows = store.get_annotations_by_dataset(&dataset_id)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for stored in &records {
        for row in rows.iter().filter(|r| r.data_record_id == stored.id) {
            writeln!(out, "{}\t{}\t{}", stored.record, row.gene_id, row.feature_name())?;
        }
    }
    out.flush()?;
    Ok(())
}

fn run_compare(
    config: EngineConfig,
    file_a: PathBuf,
    file_b: Vec<PathBuf>,
    operation: Operation,
    strand: bool,
    filter: Vec<String>,
) -> Result<()> {
    let filters = filter
        .iter()
        .map(|f| f.parse::<RecordFilter>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let load = |path: &Path| -> Result<_> {
        Ok(read_upload(Upload {
            reader: Box::new(File::open(path)?),
            tag: upload_tag(path),
        })?)
    };
    let reference = load(&file_a)?;
    let sets = file_b.iter().map(|p| load(p)).collect::<Result<Vec<_>>>()?;

    let toolkit = IntervalToolkit::new(&config.toolkit);
    let results = compare(&toolkit, operation, &reference, &sets, strand)?;
    let results = filter_results(results, &filters);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for result in &results {
        writeln!(out, "{}", result)?;
    }
    out.flush()?;
    Ok(())
}

fn run_liftover(
    config: EngineConfig,
    input: PathBuf,
    chain: PathBuf,
    threshold: Option<f64>,
) -> Result<()> {
    let dataset_id = DatasetId::generate(&mut rand::thread_rng());
    let records = read_modifications(&input, &dataset_id)?;
    let mapper = ChainMapper::from_reader(File::open(&chain)?)?;
    let threshold = threshold.unwrap_or(config.liftover.unmapped_threshold);
    let lifted = lift_records(&mapper, &records, threshold)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for record in &lifted {
        writeln!(out, "{}", record)?;
    }
    out.flush()?;
    Ok(())
}

fn run_validate(
    config: EngineConfig,
    input: PathBuf,
    genome: PathBuf,
    modification: Vec<String>,
) -> Result<()> {
    let header = EufHeader::parse(File::open(&input)?)?;
    check_header(&header)?;
    let genome = Genome::from_file(&genome)?;
    let names: Vec<&str> = modification.iter().map(String::as_str).collect();
    let dataset_id = DatasetId::generate(&mut rand::thread_rng());
    let (records, stats) = validate_records(File::open(&input)?, &genome, &names, &dataset_id)?;

    let budget = config.import.record_error_budget;
    println!(
        "{}\t{} records\t{} valid\t{} dropped",
        input.display(),
        stats.total,
        records.len(),
        stats.dropped
    );
    if stats.exceeds(budget) {
        return Err(ImportError::RecordBudgetExceeded {
            dropped: stats.dropped,
            total: stats.total,
            budget,
        }
        .into());
    }
    Ok(())
}
