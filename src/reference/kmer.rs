//! K-mer composition of reference sequences.

use indexmap::IndexMap;

use crate::bio::sequence::reverse_complement;
use crate::storage::value::{row, Row};

pub const DEFAULT_K: usize = 5;

/// Counts of every k-mer on both strands of one sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KmerTable {
    pub k: usize,
    counts: IndexMap<String, u64>,
}

impl KmerTable {
    /// Count the k-mers of `seq` and of its reverse complement.
    ///
    /// Both strands contribute one k-mer per window start in `0..=L-k`, so
    /// the total is `2 * (L + 1 - k)` for `L >= k`.
    pub fn count(seq: &[u8], k: usize) -> Self {
        let mut counts = IndexMap::new();
        if k > 0 && seq.len() >= k {
            let revcomp = reverse_complement(seq);
            for start in 0..=seq.len() - k {
                for strand in [seq, revcomp.as_slice()] {
                    let kmer = String::from_utf8_lossy(&strand[start..start + k]).to_ascii_uppercase();
                    *counts.entry(kmer).or_insert(0) += 1;
                }
            }
        }
        Self { k, counts }
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn get(&self, kmer: &str) -> u64 {
        self.counts.get(kmer).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Rows for `ref_sequence_kmer`, with `freq = 1 / (total * count)`
    pub fn rows(&self, refid: i64) -> Vec<Row> {
        let total = self.total();
        self.counts
            .iter()
            .map(|(kmer, &count)| {
                let freq = 1.0 / (total as f64 * count as f64);
                row([
                    ("kmer", kmer.as_str().into()),
                    ("refid", refid.into()),
                    ("count", (count as i64).into()),
                    ("total", (total as i64).into()),
                    ("freq", freq.into()),
                ])
            })
            .collect()
    }
}
