//! Block (MAF) aligner output.
//!
//! Each hit is an `a` line carrying `score=` followed by two `s` lines, the
//! reference first and the read second. Coordinates on an `s` line are
//! 0-based and, for a `-` strand row, counted on the reverse complement.

use crate::alignment::extremity::AlignStrand;
use crate::storage::value::{row, Row};
use crate::{PoreflowError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct MafRow {
    pub name: String,
    pub start: u64,
    pub aln_size: u64,
    pub strand: AlignStrand,
    pub src_size: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentBlock {
    pub score: i64,
    pub reference: MafRow,
    pub query: MafRow,
}

impl AlignmentBlock {
    pub fn strand(&self) -> AlignStrand {
        self.query.strand
    }

    /// Raw row for the `last_align_maf_*` tables
    pub fn to_row(&self, basename_id: i64, refid: i64, alignnum: i64) -> Row {
        row([
            ("basename_id", basename_id.into()),
            ("refid", refid.into()),
            ("alignnum", alignnum.into()),
            ("alignstrand", self.strand().as_str().into()),
            ("score", self.score.into()),
            ("r_start", (self.reference.start as i64).into()),
            ("q_start", (self.query.start as i64).into()),
            ("r_align_len", (self.reference.aln_size as i64).into()),
            ("q_align_len", (self.query.aln_size as i64).into()),
            ("r_align_string", self.reference.text.as_str().into()),
            ("q_align_string", self.query.text.as_str().into()),
        ])
    }
}

fn parse_score(line: &str) -> Result<i64> {
    line.split_whitespace()
        .find_map(|f| f.strip_prefix("score="))
        .ok_or_else(|| PoreflowError::Parse(format!("MAF block has no score: {}", line)))?
        .parse::<f64>()
        .map(|s| s.round() as i64)
        .map_err(|_| PoreflowError::Parse(format!("Bad MAF score: {}", line)))
}

fn parse_row(line: &str) -> Result<MafRow> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 7 || fields[0] != "s" {
        return Err(PoreflowError::Parse(format!("Malformed MAF s line: {}", line)));
    }
    let num = |idx: usize| -> Result<u64> {
        fields[idx]
            .parse()
            .map_err(|_| PoreflowError::Parse(format!("Bad MAF field {} in: {}", idx, line)))
    };
    let strand = match fields[4] {
        "+" => AlignStrand::Forward,
        "-" => AlignStrand::Reverse,
        other => {
            return Err(PoreflowError::Parse(format!("Bad MAF strand {:?} in: {}", other, line)))
        }
    };
    Ok(MafRow {
        name: fields[1].to_string(),
        start: num(2)?,
        aln_size: num(3)?,
        strand,
        src_size: num(5)?,
        text: fields[6].to_string(),
    })
}

/// Parse every `a`/`s`/`s` triple in the aligner output
pub fn parse_maf(output: &str) -> Result<Vec<AlignmentBlock>> {
    let lines: Vec<&str> = output.lines().map(|l| l.trim_end_matches('\r')).collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !lines[i].starts_with('a') {
            i += 1;
            continue;
        }
        let score = parse_score(lines[i])?;
        let rows: Vec<&str> = lines[i + 1..]
            .iter()
            .take_while(|l| !l.trim().is_empty() && !l.starts_with('a'))
            .copied()
            .filter(|l| l.starts_with('s'))
            .take(2)
            .collect();
        if rows.len() < 2 {
            return Err(PoreflowError::Parse(format!(
                "MAF block at line {} has fewer than two s lines",
                i + 1
            )));
        }
        blocks.push(AlignmentBlock {
            score,
            reference: parse_row(rows[0])?,
            query: parse_row(rows[1])?,
        });
        i += 1;
    }

    Ok(blocks)
}
