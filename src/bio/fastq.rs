use crate::PoreflowError;
use nom::{
    bytes::complete::{tag, take_till},
    character::complete::{line_ending, multispace0, not_line_ending},
    combinator::opt,
    IResult,
};

/// Offset between a Phred score and its printable quality character
pub const PHRED_OFFSET: u8 = 33;

/// One basecalled read as stored in a container's `Fastq` dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub id: String,
    pub sequence: String,
    /// Phred scores, one per base
    pub quality: Vec<u8>,
}

impl FastqRecord {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Printable quality string (Phred + 33)
    pub fn quality_string(&self) -> String {
        encode_quality(&self.quality)
    }
}

pub fn encode_quality(scores: &[u8]) -> String {
    scores
        .iter()
        .map(|&q| (q.saturating_add(PHRED_OFFSET)) as char)
        .collect()
}

fn line(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, content) = not_line_ending(input)?;
    let (input, _) = opt(line_ending)(input)?;
    Ok((input, content))
}

fn parse_record(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(b"@")(input)?;
    let (input, id) = take_till(|c: u8| c == b' ' || c == b'\t' || c == b'\n' || c == b'\r')(input)?;
    let (input, _) = line(input)?;
    let (input, seq) = line(input)?;
    let (input, _) = tag(b"+")(input)?;
    let (input, _) = line(input)?;
    let (input, qual) = line(input)?;
    Ok((input, (id, seq, qual)))
}

/// Parse exactly one FASTQ record
pub fn parse_single(data: &str) -> Result<FastqRecord, PoreflowError> {
    let (rest, (id, seq, qual)) = parse_record(data.as_bytes())
        .map_err(|e| PoreflowError::Parse(format!("Malformed FASTQ record: {:?}", e.map(|e| e.code))))?;

    if !rest.iter().all(|c| c.is_ascii_whitespace() || *c == 0) {
        return Err(PoreflowError::Parse(
            "Expected a single FASTQ record, found trailing data".to_string(),
        ));
    }

    if seq.len() != qual.len() {
        return Err(PoreflowError::Parse(format!(
            "Sequence and quality lengths differ ({} vs {})",
            seq.len(),
            qual.len()
        )));
    }

    let quality = qual
        .iter()
        .map(|&c| {
            c.checked_sub(PHRED_OFFSET).ok_or_else(|| {
                PoreflowError::Parse(format!("Invalid quality character {:?}", c as char))
            })
        })
        .collect::<Result<Vec<u8>, _>>()?;

    Ok(FastqRecord {
        id: String::from_utf8_lossy(id).to_string(),
        sequence: String::from_utf8_lossy(seq).to_string(),
        quality,
    })
}
