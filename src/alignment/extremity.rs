//! Five-prime and three-prime extremities of aligned reads.
//!
//! For every (read, read table) pair the store keeps exactly one 5' row and
//! one 3' row: the alignment reaching furthest towards each end of the read.
//! An alignment only replaces a tracked end when it reaches strictly
//! further; ties keep what is already there.

use indexmap::IndexMap;

use crate::storage::schema::extremity_base;
use crate::storage::traits::StoreConnection;
use crate::storage::value::{row, Row, Value};
use crate::Result;

/// Cigar class recorded for every extremity row
const CIGAR_CLASS: &str = "7";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignStrand {
    Forward,
    Reverse,
}

impl AlignStrand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignStrand::Forward => "F",
            AlignStrand::Reverse => "R",
        }
    }

    pub fn is_reverse(&self) -> bool {
        matches!(self, AlignStrand::Reverse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Five,
    Three,
}

impl End {
    pub fn table(&self, strand_table: &str) -> String {
        match self {
            End::Five => format!("{}_5prime", extremity_base(strand_table)),
            End::Three => format!("{}_3prime", extremity_base(strand_table)),
        }
    }

    /// Whether `candidate` (a 1-based read position) reaches strictly
    /// further towards this end than `current`
    pub fn is_further(&self, candidate: u64, current: u64) -> bool {
        match self {
            End::Five => candidate < current,
            End::Three => candidate > current,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extremity {
    pub refid: i64,
    pub alignnum: i64,
    pub strand: AlignStrand,
    pub score: i64,
    /// 1-based read position
    pub seqpos: u64,
    /// 1-based reference position
    pub refpos: u64,
    pub seqbase: u8,
    pub refbase: u8,
    pub seqbasequal: u8,
}

impl Extremity {
    pub fn to_row(&self, basename_id: i64) -> Row {
        row([
            ("basename_id", basename_id.into()),
            ("refid", self.refid.into()),
            ("alignnum", self.alignnum.into()),
            ("covcount", 0.into()),
            ("alignstrand", self.strand.as_str().into()),
            ("score", self.score.into()),
            ("seqpos", (self.seqpos as i64).into()),
            ("refpos", (self.refpos as i64).into()),
            ("seqbase", (self.seqbase as char).into()),
            ("refbase", (self.refbase as char).into()),
            ("seqbasequal", (self.seqbasequal as i64).into()),
            ("cigarclass", CIGAR_CLASS.into()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtremityPair {
    pub five: Extremity,
    pub three: Extremity,
}

/// Furthest 5' and 3' extremities seen so far, per read table
#[derive(Debug, Default)]
pub struct ExtremityTracker {
    ends: IndexMap<String, ExtremityPair>,
}

impl ExtremityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer the two ends of one alignment
    pub fn offer(&mut self, strand_table: &str, five: Extremity, three: Extremity) {
        match self.ends.get_mut(strand_table) {
            Some(pair) => {
                if End::Five.is_further(five.seqpos, pair.five.seqpos) {
                    pair.five = five;
                }
                if End::Three.is_further(three.seqpos, pair.three.seqpos) {
                    pair.three = three;
                }
            }
            None => {
                self.ends
                    .insert(strand_table.to_string(), ExtremityPair { five, three });
            }
        }
    }

    pub fn get(&self, strand_table: &str) -> Option<&ExtremityPair> {
        self.ends.get(strand_table)
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtremityPair)> {
        self.ends.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Write every tracked end, keeping any stored row that already reaches
    /// at least as far. Returns the number of rows written.
    pub fn persist(&self, conn: &mut dyn StoreConnection, basename_id: i64) -> Result<usize> {
        let mut written = 0;
        for (strand_table, pair) in &self.ends {
            for (end, extremity) in [(End::Five, &pair.five), (End::Three, &pair.three)] {
                let table = end.table(strand_table);
                let stored = conn
                    .select(&table, &row([("basename_id", basename_id.into())]))?
                    .into_iter()
                    .next()
                    .and_then(|r| r.get("seqpos").and_then(Value::as_i64));

                if let Some(current) = stored {
                    if !end.is_further(extremity.seqpos, current.max(0) as u64) {
                        continue;
                    }
                }
                conn.upsert(&table, &extremity.to_row(basename_id))?;
                written += 1;
            }
        }
        Ok(written)
    }
}
