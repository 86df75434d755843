//! Ensembl (GTF) annotation source.

use super::gtf::{read_gtf, GtfRecord};
use super::{AnnotationService, Partitions, Result, ServiceContext};
use crate::genome::Genome;
use crate::interval::{BedRecord, Interval, Strand};
use crate::record::{Annotation, AnnotationFeatureRecord, AnnotationSource, FeatureKind, Tier};
use log::{info, warn};
use rustc_hash::FxHashMap;
use std::io::Read;

pub struct EnsemblAnnotation {
    ctx: ServiceContext,
}

impl EnsemblAnnotation {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }
}

impl AnnotationService for EnsemblAnnotation {
    fn source(&self) -> AnnotationSource {
        AnnotationSource::Ensembl
    }

    fn features(&self) -> &'static [FeatureKind] {
        &FeatureKind::ALL
    }

    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    fn build_partitions(
        &self,
        reference: &mut dyn Read,
        genome: &Genome,
        annotation: &Annotation,
    ) -> Result<Partitions> {
        let (rows, unstranded): (Vec<GtfRecord>, Vec<GtfRecord>) =
            read_gtf(reference)?.into_iter().partition(|r| r.strand != Strand::Undefined);
        if !unstranded.is_empty() {
            warn!("skipped {} GTF rows without a strand", unstranded.len());
        }
        let genes = gene_bodies(&rows);
        info!("{} GTF rows, {} genes", rows.len(), genes.len());

        let toolkit = self.ctx.toolkit.sorting();
        let gene_beds: Vec<BedRecord> = genes.iter().map(feature_bed).collect();
        let mut files: Vec<(FeatureKind, Vec<BedRecord>)> = Vec::new();

        for &kind in self.features() {
            let records = match kind {
                FeatureKind::Intron => {
                    let exons = files
                        .iter()
                        .find(|(k, _)| *k == FeatureKind::Exon)
                        .map(|(_, recs)| recs.clone())
                        .unwrap_or_default();
                    let introns = toolkit.subtract_bases(&gene_beds, &[exons], true)?;
                    toolkit.merge(&introns, true)?
                }
                FeatureKind::Intergenic => {
                    let id = self.ctx.intergenic_id(annotation);
                    let mut gaps = Vec::new();
                    for strand in [Strand::Forward, Strand::Reverse] {
                        let on_strand: Vec<BedRecord> =
                            gene_beds.iter().filter(|g| g.strand == strand).cloned().collect();
                        let merged = toolkit.merge(&on_strand, true)?;
                        gaps.extend(toolkit.complement(&merged, genome, &id, strand)?);
                    }
                    gaps
                }
                conventional => {
                    debug_assert_eq!(conventional.tier(), Tier::Conventional);
                    let rows: Vec<BedRecord> = rows
                        .iter()
                        .filter(|r| FeatureKind::from_gtf_feature(&r.feature) == Some(conventional))
                        .map(gtf_bed)
                        .collect();
                    toolkit.merge(&rows, true)?
                }
            };
            files.push((kind, records));
        }

        Ok(Partitions { files, genes })
    }
}

/// One row per gene: its `gene` line, or the extent of its other lines when
/// the file has no `gene` lines.
fn gene_bodies(rows: &[GtfRecord]) -> Vec<AnnotationFeatureRecord> {
    let has_gene_rows = rows.iter().any(|r| r.feature == "gene");
    let mut genes: FxHashMap<&str, AnnotationFeatureRecord> = FxHashMap::default();

    for row in rows.iter().filter(|r| !has_gene_rows || r.feature == "gene") {
        genes
            .entry(row.gene_id())
            .and_modify(|g| {
                g.interval.start = g.interval.start.min(row.interval.start);
                g.interval.end = g.interval.end.max(row.interval.end);
                if g.gene_name.is_none() {
                    g.gene_name = row.gene_name().map(str::to_string);
                }
                if g.gene_biotype.is_none() {
                    g.gene_biotype = row.gene_biotype().map(str::to_string);
                }
            })
            .or_insert_with(|| AnnotationFeatureRecord {
                interval: row.interval.clone(),
                strand: row.strand,
                gene_id: row.gene_id().to_string(),
                gene_name: row.gene_name().map(str::to_string),
                gene_biotype: row.gene_biotype().map(str::to_string),
            });
    }

    let mut genes: Vec<AnnotationFeatureRecord> = genes.into_values().collect();
    genes.sort_by(|a, b| a.interval.cmp(&b.interval).then_with(|| a.gene_id.cmp(&b.gene_id)));
    genes
}

fn gtf_bed(row: &GtfRecord) -> BedRecord {
    bed(&row.interval, row.gene_id(), row.strand)
}

fn feature_bed(gene: &AnnotationFeatureRecord) -> BedRecord {
    bed(&gene.interval, &gene.gene_id, gene.strand)
}

fn bed(interval: &Interval, name: &str, strand: Strand) -> BedRecord {
    BedRecord {
        interval: interval.clone(),
        name: name.to_string(),
        score: 0,
        strand,
        extra_fields: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolkitConfig;
    use crate::toolkit::IntervalToolkit;
    use std::path::PathBuf;

    const GTF: &str = "\
#!genome-build GRCh38
1\thavana\tgene\t101\t400\t.\t+\t.\tgene_id \"G1\"; gene_name \"ONE\"; gene_biotype \"protein_coding\";
1\thavana\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
1\thavana\texon\t301\t400\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
1\thavana\tCDS\t121\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
1\thavana\tgene\t201\t260\t.\t-\t.\tgene_id \"G2\"; gene_biotype \"lncRNA\";
1\thavana\texon\t201\t260\t.\t-\t.\tgene_id \"G2\"; transcript_id \"T2\";
";

    fn service() -> EnsemblAnnotation {
        service_with(IntervalToolkit::default())
    }

    fn service_with(toolkit: IntervalToolkit) -> EnsemblAnnotation {
        EnsemblAnnotation::new(ServiceContext {
            data_dir: PathBuf::from("unused"),
            intergenic_prefix: "INTERGENIC".into(),
            toolkit,
        })
    }

    fn genome_and_release() -> (Genome, Annotation) {
        let genome: Genome = [("1", 1000u64)].into_iter().collect();
        let annotation = Annotation {
            id: 1,
            taxa_id: 9606,
            release: 110,
            source: AnnotationSource::Ensembl,
        };
        (genome, annotation)
    }

    fn spans(partitions: &Partitions, kind: FeatureKind) -> Vec<(u64, u64, String, Strand)> {
        partitions
            .files
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, recs)| {
                recs.iter()
                    .map(|r| (r.start(), r.end(), r.name.clone(), r.strand))
                    .collect()
            })
            .unwrap()
    }

    #[test]
    fn test_partitions() {
        let (genome, annotation) = genome_and_release();
        let partitions = service()
            .build_partitions(&mut GTF.as_bytes(), &genome, &annotation)
            .unwrap();

        assert_eq!(partitions.genes.len(), 2);
        assert_eq!(partitions.genes[0].gene_name.as_deref(), Some("ONE"));
        assert_eq!(partitions.genes[1].gene_biotype.as_deref(), Some("lncRNA"));

        assert_eq!(
            spans(&partitions, FeatureKind::Exon),
            vec![
                (100, 150, "G1".into(), Strand::Forward),
                (200, 260, "G2".into(), Strand::Reverse),
                (300, 400, "G1".into(), Strand::Forward),
            ]
        );
        assert_eq!(
            spans(&partitions, FeatureKind::Cds),
            vec![(120, 150, "G1".into(), Strand::Forward)]
        );
        assert!(spans(&partitions, FeatureKind::FivePrimeUtr).is_empty());
        assert_eq!(
            spans(&partitions, FeatureKind::Intron),
            vec![(150, 300, "G1".into(), Strand::Forward)]
        );
        assert_eq!(
            spans(&partitions, FeatureKind::Intergenic),
            vec![
                (0, 100, "INTERGENIC110".into(), Strand::Forward),
                (400, 1000, "INTERGENIC110".into(), Strand::Forward),
                (0, 200, "INTERGENIC110".into(), Strand::Reverse),
                (260, 1000, "INTERGENIC110".into(), Strand::Reverse),
            ]
        );
    }

    #[test]
    fn test_partitions_with_sorted_input_promise() {
        // Minus-strand exons listed 3' to 5', as Ensembl writes them.
        let gtf = format!(
            "{}1\thavana\tgene\t501\t700\t.\t-\t.\tgene_id \"G3\";\n\
             1\thavana\texon\t651\t700\t.\t-\t.\tgene_id \"G3\";\n\
             1\thavana\texon\t501\t550\t.\t-\t.\tgene_id \"G3\";\n",
            GTF
        );
        let (genome, annotation) = genome_and_release();
        let promised = service_with(IntervalToolkit::new(&ToolkitConfig {
            temp_dir: None,
            assume_sorted: true,
        }));

        let partitions = promised
            .build_partitions(&mut gtf.as_bytes(), &genome, &annotation)
            .unwrap();
        let expected = service()
            .build_partitions(&mut gtf.as_bytes(), &genome, &annotation)
            .unwrap();
        assert_eq!(partitions, expected);
        assert_eq!(
            spans(&partitions, FeatureKind::Intron),
            vec![
                (150, 300, "G1".into(), Strand::Forward),
                (550, 650, "G3".into(), Strand::Reverse),
            ]
        );
    }

    #[test]
    fn test_unstranded_gene_rows_skipped() {
        let gtf = format!(
            "{}1\thavana\tgene\t601\t800\t.\t.\t.\tgene_id \"G4\";\n\
             1\thavana\texon\t601\t650\t.\t.\t.\tgene_id \"G4\";\n",
            GTF
        );
        let (genome, annotation) = genome_and_release();
        let partitions = service()
            .build_partitions(&mut gtf.as_bytes(), &genome, &annotation)
            .unwrap();
        let expected = service()
            .build_partitions(&mut GTF.as_bytes(), &genome, &annotation)
            .unwrap();

        assert!(partitions.genes.iter().all(|g| g.gene_id != "G4"));
        assert_eq!(partitions, expected);
    }

    #[test]
    fn test_gene_extent_without_gene_rows() {
        let gtf = "1\tx\texon\t11\t20\t.\t+\t.\tgene_id \"G\";\n\
                   1\tx\texon\t41\t50\t.\t+\t.\tgene_id \"G\";\n";
        let rows = read_gtf(gtf.as_bytes()).unwrap();
        let genes = gene_bodies(&rows);
        assert_eq!(genes.len(), 1);
        assert_eq!((genes[0].interval.start, genes[0].interval.end), (10, 50));
    }
}
