//! Streaming GTF reader.
//!
//! GTF coordinates are 1-based and closed; records leave this module as
//! 0-based half-open intervals.

use super::AnnotationError;
use crate::interval::{Interval, Strand};
use crate::streaming::parsing::parse_u64_fast;
use rustc_hash::FxHashMap;
use std::io::{BufRead, BufReader, Read};

/// One GTF line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtfRecord {
    pub interval: Interval,
    pub feature: String,
    pub strand: Strand,
    attributes: FxHashMap<String, String>,
}

impl GtfRecord {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Required on every line; checked on parse.
    pub fn gene_id(&self) -> &str {
        self.attribute("gene_id").unwrap_or_default()
    }

    pub fn gene_name(&self) -> Option<&str> {
        self.attribute("gene_name")
    }

    pub fn gene_biotype(&self) -> Option<&str> {
        self.attribute("gene_biotype")
    }
}

/// Parse one GTF data line.
pub fn parse_gtf_line(line: &str, line_number: usize) -> Result<GtfRecord, AnnotationError> {
    let parse_err = |message: String| AnnotationError::Parse {
        line: line_number,
        message,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 9 {
        return Err(parse_err(format!("expected 9 fields, got {}", fields.len())));
    }

    let position = |raw: &str, name: &str| {
        parse_u64_fast(raw.as_bytes())
            .ok_or_else(|| parse_err(format!("invalid {}: '{}'", name, raw)))
    };
    let start = position(fields[3], "start")?;
    let end = position(fields[4], "end")?;
    if start == 0 {
        return Err(parse_err("GTF start is 1-based".to_string()));
    }
    let interval = Interval::new(fields[0], start - 1, end).map_err(|e| parse_err(e.to_string()))?;
    let strand = fields[6]
        .parse()
        .map_err(|_| parse_err(format!("invalid strand '{}'", fields[6])))?;

    let attributes = parse_attributes(fields[8]).map_err(parse_err)?;
    if !attributes.contains_key("gene_id") {
        return Err(parse_err("missing gene_id attribute".to_string()));
    }

    Ok(GtfRecord {
        interval,
        feature: fields[2].to_string(),
        strand,
        attributes,
    })
}

/// `key "value"; key2 "value2";`
fn parse_attributes(raw: &str) -> Result<FxHashMap<String, String>, String> {
    let mut attributes = FxHashMap::default();
    for part in raw.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, value) = part
            .split_once(' ')
            .ok_or_else(|| format!("malformed attribute '{}'", part))?;
        let value = value.trim().trim_matches('"');
        // Repeated keys (e.g. `tag`) keep the first value.
        attributes
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
    Ok(attributes)
}

/// Read every data line of a GTF stream.
pub fn read_gtf<R: Read>(reader: R) -> Result<Vec<GtfRecord>, AnnotationError> {
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        records.push(parse_gtf_line(line, idx + 1)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_converts_coordinates() {
        let line = "1\thavana\tgene\t65301\t69036\t.\t+\t.\tgene_id \"ENSG00000186092\"; gene_name \"OR4F5\"; gene_biotype \"protein_coding\";";
        let rec = parse_gtf_line(line, 1).unwrap();
        assert_eq!((rec.interval.start, rec.interval.end), (65300, 69036));
        assert_eq!(rec.gene_id(), "ENSG00000186092");
        assert_eq!(rec.gene_name(), Some("OR4F5"));
        assert_eq!(rec.gene_biotype(), Some("protein_coding"));
        assert_eq!(rec.strand, Strand::Forward);
    }

    #[test]
    fn test_rejects_missing_gene_id() {
        let line = "1\tx\texon\t1\t10\t.\t-\t.\ttranscript_id \"T1\";";
        assert!(matches!(
            parse_gtf_line(line, 3),
            Err(AnnotationError::Parse { line: 3, .. })
        ));
    }

    #[test]
    fn test_read_skips_comments() {
        let gtf = "#!genome-build GRCh38\n1\tx\texon\t1\t10\t.\t-\t.\tgene_id \"G\"; tag \"a\"; tag \"b\";\n";
        let records = read_gtf(gtf.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attribute("tag"), Some("a"));
        assert_eq!(records[0].interval.start, 0);
    }
}
