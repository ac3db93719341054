//! Tabular (SAM) aligner output.

use crate::alignment::extremity::AlignStrand;
use crate::storage::value::{row, Row};
use crate::{PoreflowError, Result};

pub const FLAG_UNMAPPED: u16 = 0x4;
pub const FLAG_REVERSE: u16 = 0x10;
pub const FLAG_SECONDARY: u16 = 0x100;
pub const FLAG_SUPPLEMENTARY: u16 = 0x800;

/// One aligned SAM line
#[derive(Debug, Clone, PartialEq)]
pub struct SamRecord {
    pub qname: String,
    pub flag: u16,
    pub rname: String,
    /// 1-based leftmost reference position
    pub pos: u64,
    pub mapq: i64,
    pub cigar: String,
    pub rnext: String,
    pub pnext: i64,
    pub tlen: i64,
    pub seq: String,
    pub qual: String,
    /// Optional fields as printed, e.g. `NM:i:3`
    pub tags: Vec<String>,
}

impl SamRecord {
    pub fn strand(&self) -> AlignStrand {
        if self.flag & FLAG_REVERSE != 0 {
            AlignStrand::Reverse
        } else {
            AlignStrand::Forward
        }
    }

    /// Neither secondary nor supplementary
    pub fn is_primary(&self) -> bool {
        self.flag & (FLAG_SECONDARY | FLAG_SUPPLEMENTARY) == 0
    }

    /// The full optional field with the given two-letter name
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .map(String::as_str)
            .find(|t| t.len() > 2 && t.starts_with(name) && t.as_bytes()[2] == b':')
    }

    /// Value part of an optional field (`MD:Z:10A2` gives `10A2`)
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tag(name).and_then(|t| t.splitn(3, ':').nth(2))
    }

    /// Raw row for the `align_sam_*` tables
    pub fn to_row(&self, basename_id: i64) -> Row {
        let tag = |name: &str| self.tag(name).unwrap_or("").to_string();
        row([
            ("basename_id", basename_id.into()),
            ("qname", self.qname.as_str().into()),
            ("flag", (self.flag as i64).into()),
            ("rname", self.rname.as_str().into()),
            ("pos", (self.pos as i64).into()),
            ("mapq", self.mapq.into()),
            ("cigar", self.cigar.as_str().into()),
            ("rnext", self.rnext.as_str().into()),
            ("pnext", self.pnext.into()),
            ("tlen", self.tlen.into()),
            ("seq", self.seq.as_str().into()),
            ("qual", self.qual.as_str().into()),
            ("n_m", tag("NM").into()),
            ("m_d", tag("MD").into()),
            ("a_s", tag("AS").into()),
            ("x_s", tag("XS").into()),
        ])
    }
}

fn field<'a>(fields: &[&'a str], idx: usize, line: &str) -> Result<&'a str> {
    fields
        .get(idx)
        .copied()
        .ok_or_else(|| PoreflowError::Parse(format!("SAM line has too few fields: {}", line)))
}

fn number<T: std::str::FromStr>(fields: &[&str], idx: usize, line: &str) -> Result<T> {
    let text = field(fields, idx, line)?;
    text.parse()
        .map_err(|_| PoreflowError::Parse(format!("Bad SAM field {} ({:?}) in: {}", idx + 1, text, line)))
}

/// Parse aligner output, skipping header and unmapped lines
pub fn parse_sam(output: &str) -> Result<Vec<SamRecord>> {
    let mut records = Vec::new();

    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('@') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 11 {
            return Err(PoreflowError::Parse(format!(
                "SAM line has {} fields, expected at least 11: {}",
                fields.len(),
                line
            )));
        }

        let flag: u16 = number(&fields, 1, line)?;
        let rname = field(&fields, 2, line)?;
        if flag & FLAG_UNMAPPED != 0 || rname == "*" {
            continue;
        }

        records.push(SamRecord {
            qname: field(&fields, 0, line)?.to_string(),
            flag,
            rname: rname.to_string(),
            pos: number(&fields, 3, line)?,
            mapq: number(&fields, 4, line)?,
            cigar: field(&fields, 5, line)?.to_string(),
            rnext: field(&fields, 6, line)?.to_string(),
            pnext: number(&fields, 7, line)?,
            tlen: number(&fields, 8, line)?,
            seq: field(&fields, 9, line)?.to_string(),
            qual: field(&fields, 10, line)?.to_string(),
            tags: fields[11..].iter().map(|t| t.to_string()).collect(),
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value::Value;
    use pretty_assertions::assert_eq;

    const OUTPUT: &str = "@SQ\tSN:lambda\tLN:48502\n\
@PG\tID:bwa\tPN:bwa\n\
r1.basecalled_template\t0\tlambda\t100\t60\t2S8M\t*\t0\t0\tTTACGTACGT\t*\tNM:i:0\tMD:Z:8\tAS:i:8\tXS:i:0\n\
r1.basecalled_template\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t*\n\
r1.basecalled_template\t2064\tlambda\t500\t3\t4M\t*\t0\t0\tACGT\t*\tNM:i:1\tMD:Z:2A1\n";

    #[test]
    fn test_parse_skips_headers_and_unmapped() {
        let records = parse_sam(OUTPUT).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.qname, "r1.basecalled_template");
        assert_eq!(first.pos, 100);
        assert_eq!(first.strand(), AlignStrand::Forward);
        assert!(first.is_primary());
        assert_eq!(first.tag("MD"), Some("MD:Z:8"));
        assert_eq!(first.tag_value("AS"), Some("8"));

        let second = &records[1];
        assert_eq!(second.strand(), AlignStrand::Reverse);
        assert!(!second.is_primary());
        assert_eq!(second.tag("XS"), None);
    }

    #[test]
    fn test_row_keeps_raw_tags() {
        let records = parse_sam(OUTPUT).unwrap();
        let row = records[1].to_row(3);
        assert_eq!(row["n_m"], Value::Text("NM:i:1".to_string()));
        assert_eq!(row["x_s"], Value::Text(String::new()));
        assert_eq!(row["flag"], Value::Integer(2064));
    }

    #[test]
    fn test_short_line_is_error() {
        assert!(parse_sam("r1\t0\tlambda\t1\n").is_err());
        assert!(parse_sam("r1\tzero\tlambda\t1\t0\t4M\t*\t0\t0\tACGT\t*\n").is_err());
    }
}
