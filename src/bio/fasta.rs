use crate::bio::sequence::Sequence;
use crate::PoreflowError;
use flate2::read::GzDecoder;
use memmap2::Mmap;
use nom::{
    bytes::complete::{tag, take_till},
    character::complete::{line_ending, not_line_ending, space1},
    combinator::{map, opt},
    sequence::preceded,
    IResult,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Parse a FASTA header line
fn parse_header(input: &[u8]) -> IResult<&[u8], (&str, Option<&str>)> {
    let (input, _) = tag(b">")(input)?;
    let (input, id) = map(
        take_till(|c: u8| c == b' ' || c == b'\t' || c == b'\n' || c == b'\r'),
        |s| std::str::from_utf8(s).unwrap_or(""),
    )(input)?;
    let (input, description) = opt(preceded(
        space1,
        map(not_line_ending, |s| std::str::from_utf8(s).unwrap_or("")),
    ))(input)?;
    let (input, _) = opt(line_ending)(input)?;
    Ok((input, (id, description.map(str::trim_end))))
}

/// Parse sequence lines until next header or EOF
fn parse_sequence(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let mut sequence = Vec::new();
    let mut remaining = input;

    while !remaining.is_empty() && remaining[0] != b'>' {
        let (rest, line) =
            take_till::<_, _, nom::error::Error<_>>(|c: u8| c == b'\n' || c == b'\r')(remaining)?;
        let (rest, _) = opt(line_ending)(rest)?;
        // A lone '\r' is not a line ending to nom
        let rest = rest.strip_prefix(b"\r").unwrap_or(rest);

        for &c in line {
            if !c.is_ascii_whitespace() {
                sequence.push(c);
            }
        }

        remaining = rest;
    }

    Ok((remaining, sequence))
}

/// Parse FASTA from bytes.
///
/// Zero-length records are kept so that callers validating references can
/// name them.
pub fn parse_fasta_from_bytes(data: &[u8]) -> Result<Vec<Sequence>, PoreflowError> {
    let mut sequences = Vec::new();
    let mut remaining = data;

    loop {
        while !remaining.is_empty() && remaining[0].is_ascii_whitespace() {
            remaining = &remaining[1..];
        }

        if remaining.is_empty() {
            break;
        }

        if remaining[0] != b'>' {
            return Err(PoreflowError::Parse(
                "FASTA data does not start with a '>' header".to_string(),
            ));
        }

        let (rest, (id, description)) = parse_header(remaining)
            .map_err(|_| PoreflowError::Parse("Failed to parse FASTA header".to_string()))?;

        let (rest, seq_data) = parse_sequence(rest)
            .map_err(|_| PoreflowError::Parse("Failed to parse FASTA sequence".to_string()))?;

        let mut seq = Sequence::new(id.to_string(), seq_data);
        if let Some(desc) = description.filter(|d| !d.is_empty()) {
            seq = seq.with_description(desc.to_string());
        }
        sequences.push(seq);

        remaining = rest;
    }

    Ok(sequences)
}

/// Parse a FASTA file into sequences (supports .gz compression)
pub fn parse_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<Sequence>, PoreflowError> {
    let path = path.as_ref();

    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        parse_fasta_gzip(path)
    } else {
        parse_fasta_uncompressed(path)
    }
}

fn parse_fasta_uncompressed(path: &Path) -> Result<Vec<Sequence>, PoreflowError> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }
    // Safety: reference files are not modified while they are being validated
    let mmap = unsafe { Mmap::map(&file)? };

    parse_fasta_from_bytes(&mmap[..])
}

fn parse_fasta_gzip(path: &Path) -> Result<Vec<Sequence>, PoreflowError> {
    let file = File::open(path)?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer)?;

    parse_fasta_from_bytes(&buffer)
}

/// Write sequences to a FASTA file
pub fn write_fasta<P: AsRef<Path>>(path: P, sequences: &[Sequence]) -> Result<(), PoreflowError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_fasta_to_writer(&mut writer, sequences)?;
    writer.flush()?;
    Ok(())
}

/// Write sequences to any writer
pub fn write_fasta_to_writer<W: Write>(
    writer: &mut W,
    sequences: &[Sequence],
) -> Result<(), PoreflowError> {
    for seq in sequences {
        writeln!(writer, "{}", seq.header())?;

        // Write sequence in 80-character lines
        for chunk in seq.sequence.chunks(80) {
            writeln!(writer, "{}", String::from_utf8_lossy(chunk))?;
        }
    }
    Ok(())
}

/// A single unwrapped record, as fed to an aligner on stdin
pub fn single_record(id: &str, sequence: &str) -> String {
    format!(">{}\n{}\n", id, sequence)
}
