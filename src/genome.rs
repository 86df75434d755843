//! Chromosome-size table for one assembly.
//!
//! Parses `chrom<TAB>size` files as supplied by the reference-data
//! provider. The table bounds intergenic regions and decides which
//! chromosomes an import accepts.

use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::bed::BedError;
use crate::streaming::parsing::{parse_u64_fast, should_skip_line, split_fields};

/// Chromosome sizes in file order.
#[derive(Debug, Clone, Default)]
pub struct Genome {
    chroms: Vec<(String, u64)>,
    /// chrom name -> position in `chroms`
    lookup: FxHashMap<String, usize>,
}

impl Genome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BedError> {
        Self::from_reader(File::open(path)?)
    }

    /// Extra columns are ignored. A chromosome listed twice keeps its last
    /// size.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, BedError> {
        let mut reader = BufReader::new(reader);
        let mut genome = Self::new();
        let mut line = Vec::new();
        let mut line_no = 0usize;

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            line_no += 1;
            let fields = split_fields(&line);
            if should_skip_line(fields[0]) {
                continue;
            }
            let (chrom, size) = match fields.as_slice() {
                [chrom, size, ..] => (*chrom, *size),
                _ => {
                    return Err(BedError::Parse {
                        line: line_no,
                        message: "expected chrom and size columns".to_string(),
                    })
                }
            };
            let size = parse_u64_fast(size).ok_or_else(|| BedError::Parse {
                line: line_no,
                message: format!("invalid chromosome size '{}'", String::from_utf8_lossy(size)),
            })?;
            genome.insert(String::from_utf8_lossy(chrom).into_owned(), size);
        }
        Ok(genome)
    }

    #[inline]
    pub fn chrom_size(&self, chrom: &str) -> Option<u64> {
        self.lookup.get(chrom).map(|&i| self.chroms[i].1)
    }

    #[inline]
    pub fn has_chrom(&self, chrom: &str) -> bool {
        self.lookup.contains_key(chrom)
    }

    /// Chromosome names in insertion order.
    pub fn chromosomes(&self) -> impl Iterator<Item = &String> {
        self.chroms.iter().map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.chroms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chroms.is_empty()
    }

    pub fn insert(&mut self, chrom: String, size: u64) {
        match self.lookup.get(&chrom) {
            Some(&i) => self.chroms[i].1 = size,
            None => {
                self.lookup.insert(chrom.clone(), self.chroms.len());
                self.chroms.push((chrom, size));
            }
        }
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for Genome {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut genome = Genome::new();
        for (chrom, size) in iter {
            genome.insert(chrom.into(), size);
        }
        genome
    }
}
