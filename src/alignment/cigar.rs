//! Edit-operation strings and mismatch descriptions as reported by aligners.
//!
//! A SAM record carries a CIGAR string and (optionally) an `MD:Z` tag; MAF
//! blocks are turned into the same pair by [`from_gapped`] so that both
//! protocols go through one coordinate translator.

use crate::{PoreflowError, Result};

/// CIGAR operation type with zero-cost conversion to/from bytes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CigarOp {
    M = b'M',  // Match/mismatch
    I = b'I',  // Insertion to reference
    D = b'D',  // Deletion from reference
    S = b'S',  // Soft clip
    H = b'H',  // Hard clip
    N = b'N',  // Skipped region
    X = b'X',  // Sequence mismatch
    Eq = b'=', // Sequence match
    P = b'P',  // Padding
}

impl CigarOp {
    /// Convert from byte representation
    #[inline(always)]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'M' => Some(Self::M),
            b'I' => Some(Self::I),
            b'D' => Some(Self::D),
            b'S' => Some(Self::S),
            b'H' => Some(Self::H),
            b'N' => Some(Self::N),
            b'X' => Some(Self::X),
            b'=' => Some(Self::Eq),
            b'P' => Some(Self::P),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Returns true if this operation consumes query bases
    #[inline(always)]
    pub const fn consumes_query(self) -> bool {
        matches!(self, Self::M | Self::I | Self::S | Self::Eq | Self::X)
    }

    /// Returns true if this operation consumes reference bases
    #[inline(always)]
    pub const fn consumes_ref(self) -> bool {
        matches!(self, Self::M | Self::D | Self::N | Self::Eq | Self::X)
    }

    /// Returns true if this operation is a clip (soft or hard)
    #[inline(always)]
    pub const fn is_clip(self) -> bool {
        matches!(self, Self::S | Self::H)
    }
}

pub type Cigar = Vec<(CigarOp, u32)>;

/// Parse a CIGAR string such as `3S10M2I5M1D4M`
pub fn parse_cigar(text: &str) -> Result<Cigar> {
    let mut ops = Vec::new();
    let mut len: u32 = 0;
    let mut have_digits = false;

    for b in text.bytes() {
        if b.is_ascii_digit() {
            len = len
                .checked_mul(10)
                .and_then(|l| l.checked_add((b - b'0') as u32))
                .ok_or_else(|| PoreflowError::Parse(format!("CIGAR length overflow in {}", text)))?;
            have_digits = true;
            continue;
        }
        let op = CigarOp::from_byte(b).ok_or_else(|| {
            PoreflowError::Parse(format!("Unknown CIGAR operation {:?} in {}", b as char, text))
        })?;
        if !have_digits {
            return Err(PoreflowError::Parse(format!(
                "CIGAR operation {:?} has no length in {}",
                b as char, text
            )));
        }
        if len > 0 {
            ops.push((op, len));
        }
        len = 0;
        have_digits = false;
    }

    if have_digits {
        return Err(PoreflowError::Parse(format!("Trailing length in CIGAR {}", text)));
    }
    Ok(ops)
}

pub fn cigar_to_string(cigar: &[(CigarOp, u32)]) -> String {
    cigar
        .iter()
        .map(|(op, len)| format!("{}{}", len, op.to_byte() as char))
        .collect()
}

/// Number of reference bases spanned by the alignment
pub fn reference_span(cigar: &[(CigarOp, u32)]) -> usize {
    cigar
        .iter()
        .filter(|(op, _)| op.consumes_ref())
        .map(|(_, len)| *len as usize)
        .sum()
}

/// Number of read bases the CIGAR expects in SEQ (hard clips excluded)
pub fn query_length(cigar: &[(CigarOp, u32)]) -> usize {
    cigar
        .iter()
        .filter(|(op, _)| op.consumes_query())
        .map(|(_, len)| *len as usize)
        .sum()
}

/// One element of a mismatch description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdToken {
    /// Run of reference bases identical to the read
    Match(u32),
    /// Single substituted reference base
    Mismatch(u8),
    /// Reference bases absent from the read
    Deletion(Vec<u8>),
}

/// Parse an `MD:Z` value, with or without the `MD:Z:` prefix
pub fn parse_md(text: &str) -> Result<Vec<MdToken>> {
    let body = text.strip_prefix("MD:Z:").unwrap_or(text);
    let bytes = body.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let n: u32 = body[start..i]
                .parse()
                .map_err(|_| PoreflowError::Parse(format!("Bad match count in MD {}", body)))?;
            if n > 0 {
                tokens.push(MdToken::Match(n));
            }
        } else if b == b'^' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                i += 1;
            }
            if start == i {
                return Err(PoreflowError::Parse(format!("Empty deletion in MD {}", body)));
            }
            tokens.push(MdToken::Deletion(bytes[start..i].to_ascii_uppercase()));
        } else if b.is_ascii_alphabetic() {
            tokens.push(MdToken::Mismatch(b.to_ascii_uppercase()));
            i += 1;
        } else {
            return Err(PoreflowError::Parse(format!(
                "Unexpected {:?} in MD {}",
                b as char, body
            )));
        }
    }
    Ok(tokens)
}

/// Reference bases covered by a mismatch description
pub fn md_span(tokens: &[MdToken]) -> usize {
    tokens
        .iter()
        .map(|t| match t {
            MdToken::Match(n) => *n as usize,
            MdToken::Mismatch(_) => 1,
            MdToken::Deletion(bases) => bases.len(),
        })
        .sum()
}

fn push_op(cigar: &mut Cigar, op: CigarOp) {
    match cigar.last_mut() {
        Some((last, len)) if *last == op => *len += 1,
        _ => cigar.push((op, 1)),
    }
}

fn push_match(md: &mut Vec<MdToken>, n: u32) {
    match md.last_mut() {
        Some(MdToken::Match(m)) => *m += n,
        _ => md.push(MdToken::Match(n)),
    }
}

/// Turn a pair of gapped alignment rows into CIGAR ops plus a mismatch
/// description, as if an aligner had reported them in SAM form.
///
/// Columns where both rows hold a gap are ignored.
pub fn from_gapped(reference: &[u8], query: &[u8]) -> Result<(Cigar, Vec<MdToken>)> {
    if reference.len() != query.len() {
        return Err(PoreflowError::Alignment(format!(
            "Gapped rows differ in length ({} vs {})",
            reference.len(),
            query.len()
        )));
    }

    let mut cigar = Cigar::new();
    let mut md = Vec::new();

    for (&r, &q) in reference.iter().zip(query) {
        match (r == b'-', q == b'-') {
            (true, true) => {}
            (true, false) => push_op(&mut cigar, CigarOp::I),
            (false, true) => {
                let extends = cigar.last().map(|c| c.0) == Some(CigarOp::D);
                push_op(&mut cigar, CigarOp::D);
                let base = r.to_ascii_uppercase();
                match md.last_mut() {
                    Some(MdToken::Deletion(bases)) if extends => bases.push(base),
                    _ => md.push(MdToken::Deletion(vec![base])),
                }
            }
            (false, false) => {
                push_op(&mut cigar, CigarOp::M);
                if r.eq_ignore_ascii_case(&q) {
                    push_match(&mut md, 1);
                } else {
                    md.push(MdToken::Mismatch(r.to_ascii_uppercase()));
                }
            }
        }
    }
    Ok((cigar, md))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_parse_cigar() {
        let cigar = parse_cigar("3S10M2I5M1D4M5H").unwrap();
        assert_eq!(cigar.len(), 7);
        assert_eq!(cigar[0], (CigarOp::S, 3));
        assert_eq!(cigar[6], (CigarOp::H, 5));
        assert_eq!(reference_span(&cigar), 20);
        assert_eq!(query_length(&cigar), 24);
        assert_eq!(cigar_to_string(&cigar), "3S10M2I5M1D4M5H");
    }

    #[rstest]
    #[case::unknown_op("10Q")]
    #[case::missing_length("M")]
    #[case::trailing_digits("10M5")]
    fn test_bad_cigar(#[case] text: &str) {
        assert!(parse_cigar(text).is_err());
    }

    #[test]
    fn test_parse_md() {
        let md = parse_md("MD:Z:10A5^AC0T3").unwrap();
        assert_eq!(
            md,
            vec![
                MdToken::Match(10),
                MdToken::Mismatch(b'A'),
                MdToken::Match(5),
                MdToken::Deletion(b"AC".to_vec()),
                MdToken::Mismatch(b'T'),
                MdToken::Match(3),
            ]
        );
        assert_eq!(md_span(&md), 21);
    }

    #[test]
    fn test_bad_md() {
        assert!(parse_md("5^3").is_err());
        assert!(parse_md("5*2").is_err());
    }

    #[test]
    fn test_from_gapped() {
        let (cigar, md) = from_gapped(b"ACG-TAC", b"ATGGT-C").unwrap();
        assert_eq!(cigar_to_string(&cigar), "3M1I1M1D1M");
        assert_eq!(
            md,
            vec![
                MdToken::Match(1),
                MdToken::Mismatch(b'C'),
                MdToken::Match(2),
                MdToken::Deletion(b"A".to_vec()),
                MdToken::Match(1),
            ]
        );
    }

    #[test]
    fn test_from_gapped_length_mismatch() {
        assert!(from_gapped(b"AC", b"A").is_err());
    }
}
