pub mod kmer;
pub mod manager;

pub use kmer::KmerTable;
pub use manager::{ReferenceManager, ReferenceSet, ReferenceSource};
