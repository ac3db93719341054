pub mod bwa;
pub mod last;
pub mod maf;
pub mod mock;
pub mod process;
pub mod sam;
pub mod traits;

pub use bwa::BwaAligner;
pub use last::LastAligner;
pub use mock::MockAligner;
pub use traits::{ensure_index, Aligner, OutputProtocol};

use crate::core::config::{AlignMode, AlignmentConfig};

/// The external aligner for a configured mode, if alignment is enabled
pub fn aligner_for(config: &AlignmentConfig) -> Option<Box<dyn Aligner>> {
    match config.mode {
        AlignMode::None => None,
        AlignMode::Bwa => Some(Box::new(BwaAligner::new(config.options()))),
        AlignMode::Last => Some(Box::new(LastAligner::new(config.options()))),
    }
}
