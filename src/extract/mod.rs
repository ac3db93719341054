//! Record extraction from container files.

pub mod extractor;
pub mod record;
pub mod workflow;

pub use extractor::{file_checksum, is_pass, Extractor};
pub use record::{ExtractedRecord, SequenceRecord, Strand, TelemetryPayload};
pub use workflow::{locate_workflow, WorkflowNode};
