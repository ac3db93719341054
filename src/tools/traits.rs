/// Trait definitions for external aligners
///
/// An aligner is run once per read: one FASTA record goes in on stdin and
/// the full text it prints comes back for the protocol parsers.
use anyhow::Result;
use std::path::{Path, PathBuf};

/// How an aligner reports its hits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputProtocol {
    /// One SAM line per hit
    Tabular,
    /// MAF blocks of `a`/`s`/`s` lines
    Block,
}

/// Common interface for sequence alignment tools
pub trait Aligner: Send + Sync {
    /// Get the name of this aligner
    fn name(&self) -> &str;

    fn protocol(&self) -> OutputProtocol;

    /// Verify that the tool is properly installed
    fn is_available(&self) -> bool;

    /// Index prefix for a merged reference
    fn index_prefix(&self, index_dir: &Path, reference_basename: &str) -> PathBuf;

    /// Whether a usable index already exists under `prefix`
    fn index_ready(&self, prefix: &Path) -> bool;

    /// Build an index from a reference FASTA
    fn build_index(&self, fasta: &Path, prefix: &Path) -> Result<()>;

    /// Align one FASTA record against an index and return the raw output
    fn align(&self, prefix: &Path, record: &str) -> Result<String>;
}

/// Build the index unless one is already in place
pub fn ensure_index(aligner: &dyn Aligner, fasta: &Path, prefix: &Path) -> Result<bool> {
    if aligner.index_ready(prefix) {
        tracing::debug!("{} index {} already present", aligner.name(), prefix.display());
        return Ok(false);
    }
    if let Some(parent) = prefix.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!("Building {} index at {}", aligner.name(), prefix.display());
    aligner.build_index(fasta, prefix)?;
    Ok(true)
}
