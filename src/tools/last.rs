use anyhow::Result;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::tools::process::{non_empty, on_path, run, run_with_input, split_options};
use crate::tools::traits::{Aligner, OutputProtocol};

/// LAST, reporting MAF blocks
pub struct LastAligner {
    lastal: String,
    lastdb: String,
    options: Vec<String>,
}

impl LastAligner {
    pub fn new(options: &str) -> Self {
        Self {
            lastal: "lastal".to_string(),
            lastdb: "lastdb".to_string(),
            options: split_options(options),
        }
    }

    fn align_args(&self, prefix: &Path) -> Vec<String> {
        let mut args = self.options.clone();
        args.push(prefix.display().to_string());
        args.push("-".to_string());
        args
    }
}

impl Aligner for LastAligner {
    fn name(&self) -> &str {
        "LAST"
    }

    fn protocol(&self) -> OutputProtocol {
        OutputProtocol::Block
    }

    fn is_available(&self) -> bool {
        on_path(&self.lastal) && on_path(&self.lastdb)
    }

    fn index_prefix(&self, index_dir: &Path, reference_basename: &str) -> PathBuf {
        index_dir.join(format!("{}.last.index", reference_basename))
    }

    fn index_ready(&self, prefix: &Path) -> bool {
        non_empty(&PathBuf::from(format!("{}.bck", prefix.display())))
    }

    fn build_index(&self, fasta: &Path, prefix: &Path) -> Result<()> {
        run(
            &self.lastdb,
            [
                OsStr::new("-Q"),
                OsStr::new("0"),
                prefix.as_os_str(),
                fasta.as_os_str(),
            ],
        )
    }

    fn align(&self, prefix: &Path, record: &str) -> Result<String> {
        run_with_input(&self.lastal, self.align_args(prefix), record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_line() {
        let last = LastAligner::new("s2,T0,Q0,a1");
        assert_eq!(
            last.align_args(Path::new("idx/ref.last.index")),
            vec!["-s2", "-T0", "-Q0", "-a1", "idx/ref.last.index", "-"]
        );
        assert_eq!(last.protocol(), OutputProtocol::Block);
    }

    #[test]
    fn test_index_ready_needs_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let last = LastAligner::new("");
        let prefix = last.index_prefix(dir.path(), "ref");
        std::fs::write(dir.path().join("ref.last.index.bck"), b"").unwrap();
        assert!(!last.index_ready(&prefix));
        std::fs::write(dir.path().join("ref.last.index.bck"), b"data").unwrap();
        assert!(last.index_ready(&prefix));
    }
}
