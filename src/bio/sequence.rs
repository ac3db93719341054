use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub description: Option<String>,
    pub sequence: Vec<u8>,
}

impl Sequence {
    pub fn new(id: String, sequence: Vec<u8>) -> Self {
        Self {
            id,
            description: None,
            sequence,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn to_upper(mut self) -> Self {
        self.sequence.make_ascii_uppercase();
        self
    }

    pub fn reverse_complement(&self) -> Vec<u8> {
        reverse_complement(&self.sequence)
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.sequence).to_string()
    }

    pub fn header(&self) -> String {
        let mut header = format!(">{}", self.id);

        if let Some(desc) = &self.description {
            header.push(' ');
            header.push_str(desc);
        }

        header
    }
}

/// Complement a single nucleotide, preserving case; unknown symbols become N
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' | b'U' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'a' => b't',
        b't' | b'u' => b'a',
        b'c' => b'g',
        b'g' => b'c',
        b'N' | b'n' => base,
        _ => b'N',
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"ACGTN"), b"NACGT".to_vec());
        assert_eq!(reverse_complement(b"aacg"), b"cgtt".to_vec());
        assert_eq!(reverse_complement(b""), Vec::<u8>::new());
    }

    #[test]
    fn test_header_with_description() {
        let seq = Sequence::new("chr1".to_string(), b"ACGT".to_vec())
            .with_description("lambda.fasta".to_string());
        assert_eq!(seq.header(), ">chr1 lambda.fasta");
        assert_eq!(seq.reverse_complement(), b"ACGT".to_vec());
    }
}
