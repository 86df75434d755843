//! UCSC chain files.
//!
//! ```text
//! chain score tName tSize tStrand tStart tEnd qName qSize qStrand qStart qEnd id
//! size dt dq
//! size
//! ```
//!
//! The target (`t`) side is the assembly records come from, the query (`q`)
//! side the one they are lifted onto. Query positions on a `-` chain count
//! from the end of the query chromosome.

use super::{LiftOverError, Result};
use crate::interval::Strand;
use crate::streaming::parsing::parse_u64_fast;
use std::io::{BufRead, BufReader, Read};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHeader {
    pub score: u64,
    pub t_name: String,
    pub t_size: u64,
    pub t_start: u64,
    pub t_end: u64,
    pub q_name: String,
    pub q_size: u64,
    pub q_strand: Strand,
    pub q_start: u64,
    pub q_end: u64,
    pub id: String,
}

/// One ungapped alignment block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub t_start: u64,
    pub t_end: u64,
    /// Query start on the chain's query strand
    pub q_start: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub header: ChainHeader,
    pub blocks: Vec<Block>,
}

fn chain_err(line: usize, message: impl Into<String>) -> LiftOverError {
    LiftOverError::Chain {
        line,
        message: message.into(),
    }
}

fn number(raw: &str, what: &str, line: usize) -> Result<u64> {
    parse_u64_fast(raw.as_bytes())
        .ok_or_else(|| chain_err(line, format!("invalid {} '{}'", what, raw)))
}

fn parse_header(fields: &[&str], line: usize) -> Result<ChainHeader> {
    if fields.len() < 12 {
        return Err(chain_err(line, format!("chain header has {} fields", fields.len())));
    }
    if fields[4] != "+" {
        return Err(chain_err(line, "target strand must be '+'"));
    }
    let q_strand = match fields[9] {
        "+" => Strand::Forward,
        "-" => Strand::Reverse,
        other => return Err(chain_err(line, format!("invalid query strand '{}'", other))),
    };
    Ok(ChainHeader {
        score: number(fields[1], "score", line)?,
        t_name: fields[2].to_string(),
        t_size: number(fields[3], "tSize", line)?,
        t_start: number(fields[5], "tStart", line)?,
        t_end: number(fields[6], "tEnd", line)?,
        q_name: fields[7].to_string(),
        q_size: number(fields[8], "qSize", line)?,
        q_strand,
        q_start: number(fields[10], "qStart", line)?,
        q_end: number(fields[11], "qEnd", line)?,
        id: fields.get(12).copied().unwrap_or_default().to_string(),
    })
}

/// Parse every chain of a stream.
pub fn read_chains<R: Read>(reader: R) -> Result<Vec<Chain>> {
    let mut chains = Vec::new();
    // (chain, next t position, next q position, finished)
    let mut current: Option<(Chain, u64, u64, bool)> = None;

    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();

        if fields[0] == "chain" {
            if let Some((chain, _, _, finished)) = current.take() {
                if !finished {
                    return Err(chain_err(
                        line_no,
                        format!("chain {} has no final block", chain.header.id),
                    ));
                }
                chains.push(chain);
            }
            let header = parse_header(&fields, line_no)?;
            let (t, q) = (header.t_start, header.q_start);
            current = Some((
                Chain {
                    header,
                    blocks: Vec::new(),
                },
                t,
                q,
                false,
            ));
            continue;
        }

        let Some((chain, t, q, finished)) = current.as_mut() else {
            return Err(chain_err(line_no, "alignment data before chain header"));
        };
        if *finished {
            return Err(chain_err(line_no, "alignment data after final block"));
        }
        let size = number(fields[0], "block size", line_no)?;
        chain.blocks.push(Block {
            t_start: *t,
            t_end: *t + size,
            q_start: *q,
        });
        match fields.len() {
            1 => {
                *finished = true;
                if *t + size != chain.header.t_end {
                    return Err(chain_err(line_no, "blocks do not end at tEnd"));
                }
            }
            3 => {
                *t += size + number(fields[1], "dt", line_no)?;
                *q += size + number(fields[2], "dq", line_no)?;
            }
            n => return Err(chain_err(line_no, format!("alignment line has {} fields", n))),
        }
    }

    if let Some((chain, _, _, finished)) = current {
        if !finished {
            return Err(chain_err(0, format!("chain {} has no final block", chain.header.id)));
        }
        chains.push(chain);
    }
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_chain_blocks() {
        let data = "chain 100 chr1 1000 + 100 400 1 1200 - 50 340 7\n100 20 10\n180\n\n";
        let chains = read_chains(data.as_bytes()).unwrap();
        assert_eq!(chains.len(), 1);
        let chain = &chains[0];
        assert_eq!(chain.header.q_strand, Strand::Reverse);
        assert_eq!(chain.header.id, "7");
        assert_eq!(
            chain.blocks,
            vec![
                Block {
                    t_start: 100,
                    t_end: 200,
                    q_start: 50
                },
                Block {
                    t_start: 220,
                    t_end: 400,
                    q_start: 160
                },
            ]
        );
    }

    #[test]
    fn test_rejects_truncated_chain() {
        let data = "chain 1 chr1 1000 + 0 100 chr1 1000 + 0 100 1\n50 0 0\n";
        assert!(matches!(read_chains(data.as_bytes()), Err(LiftOverError::Chain { .. })));
    }
}
