//! GtRNAdb (BED12 tRNA genes) annotation source.
//!
//! Each BED12 line is one tRNA gene. Its blocks are the exons and the gaps
//! between blocks are introns. There is no intergenic partition, so records
//! outside tRNA genes stay unannotated.

use super::{AnnotationError, AnnotationService, Partitions, Result, ServiceContext};
use crate::bed::BedReader;
use crate::genome::Genome;
use crate::interval::{BedRecord, Interval};
use crate::record::{Annotation, AnnotationFeatureRecord, AnnotationSource, FeatureKind};
use crate::streaming::parsing::parse_u64_fast;
use log::info;
use std::io::Read;

/// Columns a BED12 line carries beyond BED6.
const BED12_EXTRA: usize = 6;

const BIOTYPE: &str = "tRNA";

pub struct GtRnaAnnotation {
    ctx: ServiceContext,
}

impl GtRnaAnnotation {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }
}

impl AnnotationService for GtRnaAnnotation {
    fn source(&self) -> AnnotationSource {
        AnnotationSource::GtRnaDb
    }

    fn features(&self) -> &'static [FeatureKind] {
        &[FeatureKind::Exon, FeatureKind::Intron]
    }

    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    fn build_partitions(
        &self,
        reference: &mut dyn Read,
        _genome: &Genome,
        _annotation: &Annotation,
    ) -> Result<Partitions> {
        let mut reader = BedReader::new(reference);
        let mut exons = Vec::new();
        let mut introns = Vec::new();
        let mut genes = Vec::new();

        while let Some(gene) = reader.read_record()? {
            let blocks = blocks(&gene, reader.line_number())?;
            for pair in blocks.windows(2) {
                let (_, prev_end) = pair[0];
                let (next_start, _) = pair[1];
                if next_start > prev_end {
                    introns.push(piece(&gene, prev_end, next_start));
                }
            }
            exons.extend(blocks.into_iter().map(|(s, e)| piece(&gene, s, e)));
            genes.push(AnnotationFeatureRecord {
                interval: gene.interval.clone(),
                strand: gene.strand,
                gene_id: gene.name.clone(),
                gene_name: Some(gene.name.clone()),
                gene_biotype: Some(BIOTYPE.to_string()),
            });
        }
        info!("{} tRNA genes, {} with introns", genes.len(), introns.len());

        let toolkit = self.ctx.toolkit.sorting();
        Ok(Partitions {
            files: vec![
                (FeatureKind::Exon, toolkit.merge(&exons, true)?),
                (FeatureKind::Intron, toolkit.merge(&introns, true)?),
            ],
            genes,
        })
    }
}

/// Absolute `[start, end)` of every block, in block order.
fn blocks(gene: &BedRecord, line: usize) -> Result<Vec<(u64, u64)>> {
    let parse_err = |message: String| AnnotationError::Parse { line, message };
    if gene.extra_fields.len() < BED12_EXTRA {
        return Err(parse_err(format!(
            "expected 12 columns, got {}",
            6 + gene.extra_fields.len()
        )));
    }

    let count = parse_u64_fast(gene.extra_fields[3].as_bytes())
        .ok_or_else(|| parse_err(format!("invalid blockCount '{}'", gene.extra_fields[3])))?
        as usize;
    let list = |idx: usize, name: &str| -> Result<Vec<u64>> {
        gene.extra_fields[idx]
            .split(',')
            .filter(|v| !v.is_empty())
            .map(|v| {
                parse_u64_fast(v.as_bytes())
                    .ok_or_else(|| parse_err(format!("invalid {} '{}'", name, v)))
            })
            .collect()
    };
    let sizes = list(4, "blockSizes")?;
    let starts = list(5, "blockStarts")?;
    if sizes.len() != count || starts.len() != count {
        return Err(parse_err(format!(
            "blockCount {} does not match {} sizes and {} starts",
            count,
            sizes.len(),
            starts.len()
        )));
    }

    let mut out = Vec::with_capacity(count);
    for (size, offset) in sizes.into_iter().zip(starts) {
        let start = gene.start() + offset;
        let block = Interval::new(gene.chrom(), start, start + size)
            .map_err(|e| parse_err(e.to_string()))?;
        if !block.within(&gene.interval) {
            return Err(parse_err(format!("block {}+{} outside {}", offset, size, gene.interval)));
        }
        out.push((block.start, block.end));
    }
    out.sort_unstable();
    Ok(out)
}

fn piece(gene: &BedRecord, start: u64, end: u64) -> BedRecord {
    let mut piece = gene.with_coordinates(start, end);
    piece.score = 0;
    piece.extra_fields.clear();
    piece
}
