pub mod alignment;
pub mod bio;
pub mod cli;
pub mod container;
pub mod core;
pub mod extract;
pub mod pipeline;
pub mod reference;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod tools;
pub mod watcher;

pub use crate::core::config::Config;
pub use crate::pipeline::Pipeline;

use thiserror::Error;

/// Version string recorded in the run catalogue and run logs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum PoreflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Reference error in {file}: {reason}")]
    Reference { file: String, reason: String },

    #[error("Alignment error: {0}")]
    Alignment(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("run store {0} already exists; re-run with --drop-existing to replace it or --resume to add to it")]
    RunExists(String),
}

impl From<rusqlite::Error> for PoreflowError {
    fn from(err: rusqlite::Error) -> Self {
        PoreflowError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PoreflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoreflowError::Reference {
            file: "lambda.fasta".to_string(),
            reason: "empty file".to_string(),
        };
        assert_eq!(err.to_string(), "Reference error in lambda.fasta: empty file");

        let err = PoreflowError::RunExists("alice_SAMPLE".to_string());
        assert!(err.to_string().starts_with("run store alice_SAMPLE already exists"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PoreflowError = io_err.into();
        assert!(matches!(err, PoreflowError::Io(_)));
    }
}
