pub mod cigar;
pub mod coordinates;
pub mod extremity;
pub mod orchestrator;
pub mod pool;

pub use cigar::{parse_cigar, parse_md, Cigar, CigarOp, MdToken};
pub use coordinates::{translate, Translation};
pub use extremity::{AlignStrand, Extremity, ExtremityTracker};
pub use orchestrator::{align_reads, align_sequence, RunContext};
pub use pool::{fan_out, Task, TaskFailure};
