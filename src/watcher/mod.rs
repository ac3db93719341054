pub mod discovery;
pub mod scheduler;

pub use discovery::{scan, Eligibility};
pub use scheduler::Scheduler;
