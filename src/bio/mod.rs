pub mod fasta;
pub mod fastq;
pub mod sequence;

pub use fastq::FastqRecord;
pub use sequence::Sequence;
