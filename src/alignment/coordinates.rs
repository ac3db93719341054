//! Projection of an aligned read onto reference coordinates.
//!
//! The translator lays the read and the reference out on two aligned axes.
//! Reference positions start as `X` placeholders (gaps are `-`), are filled
//! from the read wherever both axes hold a base, and are then overwritten
//! from the mismatch description wherever the reference differs.

use crate::alignment::cigar::{md_span, reference_span, CigarOp, MdToken};
use crate::alignment::extremity::AlignStrand;
use crate::{PoreflowError, Result};

pub const GAP: u8 = b'-';
pub const PLACEHOLDER: u8 = b'X';
/// Base written to deletion columns when no mismatch description is present
pub const UNKNOWN_BASE: u8 = b'N';

/// Where a reference-axis base came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Insertion column, no reference base
    Gap,
    /// Copied from the read
    Query,
    /// Written from the mismatch description
    Mismatch,
    /// Deletion column with no mismatch description to fill it
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub query_axis: Vec<u8>,
    pub ref_axis: Vec<u8>,
    pub provenance: Vec<Provenance>,
    /// Bases clipped from the start of the read
    pub q_start: usize,
    /// 1-based position of the last aligned read base
    pub q_stop: usize,
    /// Length of the whole read, clips of both kinds included
    pub read_len: usize,
    /// 1-based first reference position
    pub r_start: u64,
    /// 1-based last reference position
    pub r_stop: u64,
    pub first_ref_base: u8,
    pub last_ref_base: u8,
}

impl Translation {
    /// Number of reference positions covered
    pub fn reference_len(&self) -> usize {
        self.ref_axis.iter().filter(|&&b| b != GAP).count()
    }

    pub fn ref_string(&self) -> String {
        String::from_utf8_lossy(&self.ref_axis).into_owned()
    }

    pub fn query_string(&self) -> String {
        String::from_utf8_lossy(&self.query_axis).into_owned()
    }

    /// 1-based read positions of the 5' and 3' aligned bases.
    ///
    /// A reverse-strand record lays out the reverse complement of the read,
    /// so its span is mirrored back onto the read as sequenced.
    pub fn read_positions(&self, strand: AlignStrand) -> (u64, u64) {
        match strand {
            AlignStrand::Forward => (self.q_start as u64 + 1, self.q_stop as u64),
            AlignStrand::Reverse => (
                (self.read_len - self.q_stop) as u64 + 1,
                (self.read_len - self.q_start) as u64,
            ),
        }
    }
}

/// Translate an alignment starting at 1-based reference position `pos`.
///
/// `read` holds the bases present in the record (soft clips included, hard
/// clips excluded). An empty `md` leaves deletion columns unresolved; a
/// non-empty one must cover the reference span exactly.
pub fn translate(
    cigar: &[(CigarOp, u32)],
    md: &[MdToken],
    pos: u64,
    read: &[u8],
) -> Result<Translation> {
    if pos == 0 {
        return Err(PoreflowError::Alignment(
            "alignment position must be 1-based".to_string(),
        ));
    }

    let mut query_axis = Vec::new();
    let mut ref_axis = Vec::new();
    let mut q = 0usize;
    let mut clip_offset = 0usize;
    let mut hard_clipped = 0usize;
    let mut aligned_end = 0usize;
    let mut seen_aligned = false;

    for &(op, len) in cigar {
        let n = len as usize;
        match op {
            CigarOp::S => q += n,
            CigarOp::H => {
                if !seen_aligned {
                    clip_offset += n;
                }
                hard_clipped += n;
            }
            CigarOp::M | CigarOp::Eq | CigarOp::X => {
                query_axis.extend_from_slice(read_bases(read, q, n)?);
                ref_axis.extend(std::iter::repeat(PLACEHOLDER).take(n));
                q += n;
                aligned_end = q;
                seen_aligned = true;
            }
            CigarOp::I => {
                query_axis.extend_from_slice(read_bases(read, q, n)?);
                ref_axis.extend(std::iter::repeat(GAP).take(n));
                q += n;
                aligned_end = q;
                seen_aligned = true;
            }
            CigarOp::D => {
                query_axis.extend(std::iter::repeat(GAP).take(n));
                ref_axis.extend(std::iter::repeat(PLACEHOLDER).take(n));
                seen_aligned = true;
            }
            CigarOp::N => {
                return Err(PoreflowError::Alignment(
                    "skipped-region (N) operations are not supported".to_string(),
                ))
            }
            CigarOp::P => {}
        }
    }

    let span = reference_span(cigar);
    if span == 0 {
        return Err(PoreflowError::Alignment(
            "alignment covers no reference bases".to_string(),
        ));
    }
    if !md.is_empty() && md_span(md) != span {
        return Err(PoreflowError::Alignment(format!(
            "mismatch description covers {} reference bases, the alignment {}",
            md_span(md),
            span
        )));
    }

    let mut provenance = vec![Provenance::Gap; ref_axis.len()];

    for i in 0..ref_axis.len() {
        if ref_axis[i] != GAP && query_axis[i] != GAP {
            ref_axis[i] = query_axis[i].to_ascii_uppercase();
            provenance[i] = Provenance::Query;
        }
    }

    if !md.is_empty() {
        apply_md(md, &mut ref_axis, &mut provenance)?;
    }
    for (base, origin) in ref_axis.iter_mut().zip(provenance.iter_mut()) {
        if *base == PLACEHOLDER && *origin == Provenance::Gap {
            *base = UNKNOWN_BASE;
            *origin = Provenance::Unknown;
        }
    }

    // Leading clip count is the 0-based index of the first aligned base
    let q_start = leading_clip(cigar);
    let first_ref_base = ref_axis.iter().copied().find(|&b| b != GAP).unwrap_or(UNKNOWN_BASE);
    let last_ref_base = ref_axis
        .iter()
        .rev()
        .copied()
        .find(|&b| b != GAP)
        .unwrap_or(UNKNOWN_BASE);

    Ok(Translation {
        query_axis,
        ref_axis,
        provenance,
        q_start,
        q_stop: aligned_end + clip_offset,
        read_len: q + hard_clipped,
        r_start: pos,
        r_stop: pos + span as u64 - 1,
        first_ref_base,
        last_ref_base,
    })
}

fn read_bases(read: &[u8], q: usize, n: usize) -> Result<&[u8]> {
    read.get(q..q + n).ok_or_else(|| {
        PoreflowError::Alignment(format!(
            "CIGAR needs {} read bases but the record has {}",
            q + n,
            read.len()
        ))
    })
}

fn leading_clip(cigar: &[(CigarOp, u32)]) -> usize {
    cigar
        .iter()
        .take_while(|(op, _)| op.is_clip())
        .map(|(_, len)| *len as usize)
        .sum()
}

/// Next non-gap reference column at or after the cursor
fn next_slot(ref_axis: &[u8], cursor: &mut usize) -> Result<usize> {
    while *cursor < ref_axis.len() && ref_axis[*cursor] == GAP {
        *cursor += 1;
    }
    if *cursor >= ref_axis.len() {
        return Err(PoreflowError::Alignment(
            "mismatch description runs past the alignment".to_string(),
        ));
    }
    let at = *cursor;
    *cursor += 1;
    Ok(at)
}

/// Walk the mismatch description over the reference axis, skipping
/// insertion columns, and write every substituted or deleted base.
fn apply_md(md: &[MdToken], ref_axis: &mut [u8], provenance: &mut [Provenance]) -> Result<()> {
    let mut cursor = 0usize;

    for token in md {
        match token {
            MdToken::Match(n) => {
                for _ in 0..*n {
                    next_slot(ref_axis, &mut cursor)?;
                }
            }
            MdToken::Mismatch(base) => {
                let at = next_slot(ref_axis, &mut cursor)?;
                ref_axis[at] = *base;
                provenance[at] = Provenance::Mismatch;
            }
            MdToken::Deletion(bases) => {
                for base in bases {
                    let at = next_slot(ref_axis, &mut cursor)?;
                    ref_axis[at] = *base;
                    provenance[at] = Provenance::Mismatch;
                }
            }
        }
    }

    if ref_axis[cursor..].iter().any(|&b| b != GAP) {
        return Err(PoreflowError::Alignment(
            "mismatch description is shorter than the alignment".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::cigar::{from_gapped, parse_cigar, parse_md};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn run(cigar: &str, md: &str, pos: u64, read: &str) -> Translation {
        translate(
            &parse_cigar(cigar).unwrap(),
            &parse_md(md).unwrap(),
            pos,
            read.as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_simple_match() {
        let t = run("8M", "MD:Z:8", 100, "ACGTACGT");
        assert_eq!(t.ref_string(), "ACGTACGT");
        assert_eq!((t.q_start, t.q_stop), (0, 8));
        assert_eq!((t.r_start, t.r_stop), (100, 107));
        assert_eq!((t.first_ref_base, t.last_ref_base), (b'A', b'T'));
    }

    #[test]
    fn test_clips_insertion_deletion_mismatch() {
        // read:  ss ACG T  TA - C
        // ref:      AGG -  TA C C
        let t = run("2S3M1I2M1D1M", "1G3^C1", 10, "TTACGTTAC");
        assert_eq!(t.query_string(), "ACGTTA-C");
        assert_eq!(t.ref_string(), "AGG-TACC");
        assert_eq!(
            t.provenance,
            vec![
                Provenance::Query,
                Provenance::Mismatch,
                Provenance::Query,
                Provenance::Gap,
                Provenance::Query,
                Provenance::Query,
                Provenance::Mismatch,
                Provenance::Query,
            ]
        );
        assert_eq!(t.q_start, 2);
        assert_eq!(t.q_stop, 9);
        assert_eq!(t.r_start, 10);
        assert_eq!(t.r_stop, 16);
        assert_eq!(t.reference_len(), 7);
    }

    #[test]
    fn test_leading_hard_clip_offsets_read_positions() {
        let t = run("5H4M", "4", 1, "ACGT");
        assert_eq!(t.q_start, 5);
        assert_eq!(t.q_stop, 9);
    }

    #[test]
    fn test_trailing_clips_are_not_aligned() {
        let t = run("7M3S2H", "7", 1, "ACGTACGTTT");
        assert_eq!((t.q_start, t.q_stop), (0, 7));
        assert_eq!(t.read_len, 12);
    }

    #[test]
    fn test_reverse_positions_mirror_onto_the_read() {
        // read AAAACCCGGT reported as its reverse complement
        let t = run("3S7M", "7", 20, "ACCGGGTTTT");
        assert_eq!(t.read_positions(AlignStrand::Forward), (4, 10));
        assert_eq!(t.read_positions(AlignStrand::Reverse), (1, 7));

        let t = run("2H6M", "6", 1, "ACGTAC");
        assert_eq!(t.read_positions(AlignStrand::Reverse), (1, 6));
    }

    #[test]
    fn test_missing_md_marks_deletions_unknown() {
        let t = translate(&parse_cigar("2M2D2M").unwrap(), &[], 1, b"ACGT").unwrap();
        assert_eq!(t.ref_string(), "ACNNGT");
        assert_eq!(t.provenance[2], Provenance::Unknown);
    }

    #[test]
    fn test_first_base_skips_leading_insertion() {
        let t = run("2I3M", "3", 5, "GGACT");
        assert_eq!(t.first_ref_base, b'A');
        assert_eq!(t.last_ref_base, b'T');
    }

    #[test]
    fn test_errors() {
        let cigar = parse_cigar("4M").unwrap();
        assert!(translate(&cigar, &parse_md("5").unwrap(), 1, b"ACGT").is_err());
        assert!(translate(&cigar, &parse_md("3").unwrap(), 1, b"ACGT").is_err());
        assert!(translate(&cigar, &[], 1, b"ACG").is_err());
        assert!(translate(&cigar, &[], 0, b"ACGT").is_err());
        assert!(translate(&parse_cigar("2M3N2M").unwrap(), &[], 1, b"ACGT").is_err());
    }

    fn column() -> impl Strategy<Value = (u8, u8)> {
        let base = prop::sample::select(vec![b'A', b'C', b'G', b'T']);
        prop_oneof![
            6 => (base.clone(), base.clone()),
            1 => base.clone().prop_map(|q| (GAP, q)),
            1 => base.prop_map(|r| (r, GAP)),
        ]
    }

    proptest! {
        #[test]
        fn prop_reference_is_reconstructed(
            cols in prop::collection::vec(column(), 1..120),
            pos in 1u64..1_000_000,
        ) {
            let reference: Vec<u8> = cols.iter().map(|c| c.0).collect();
            let query: Vec<u8> = cols.iter().map(|c| c.1).collect();
            let span = reference.iter().filter(|&&b| b != GAP).count();
            prop_assume!(span > 0);

            let (cigar, md) = from_gapped(&reference, &query).unwrap();
            let read: Vec<u8> = query.iter().copied().filter(|&b| b != GAP).collect();
            let t = translate(&cigar, &md, pos, &read).unwrap();

            prop_assert_eq!(t.ref_axis.len(), cols.len());
            prop_assert_eq!(t.reference_len(), span);
            prop_assert_eq!(&t.ref_axis, &reference);
            prop_assert_eq!(t.r_stop - t.r_start + 1, span as u64);

            for (i, p) in t.provenance.iter().enumerate() {
                let is_gap = t.ref_axis[i] == GAP;
                prop_assert_eq!(is_gap, *p == Provenance::Gap);
                if !is_gap {
                    prop_assert!(matches!(p, Provenance::Query | Provenance::Mismatch));
                }
            }
        }
    }
}
