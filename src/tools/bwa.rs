use anyhow::Result;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::tools::process::{non_empty, on_path, run, run_with_input, split_options};
use crate::tools::traits::{Aligner, OutputProtocol};

/// BWA-MEM in nanopore mode, reporting SAM
pub struct BwaAligner {
    binary: String,
    options: Vec<String>,
}

impl BwaAligner {
    pub fn new(options: &str) -> Self {
        Self {
            binary: "bwa".to_string(),
            options: split_options(options),
        }
    }

    fn align_args(&self, prefix: &Path) -> Vec<String> {
        let mut args = vec!["mem".to_string(), "-x".to_string(), "ont2d".to_string()];
        args.extend(self.options.iter().cloned());
        args.push(prefix.display().to_string());
        args.push("-".to_string());
        args
    }
}

impl Aligner for BwaAligner {
    fn name(&self) -> &str {
        "BWA"
    }

    fn protocol(&self) -> OutputProtocol {
        OutputProtocol::Tabular
    }

    fn is_available(&self) -> bool {
        on_path(&self.binary)
    }

    fn index_prefix(&self, index_dir: &Path, reference_basename: &str) -> PathBuf {
        index_dir.join(format!("{}.bwa.index", reference_basename))
    }

    fn index_ready(&self, prefix: &Path) -> bool {
        non_empty(&PathBuf::from(format!("{}.bwt", prefix.display())))
    }

    fn build_index(&self, fasta: &Path, prefix: &Path) -> Result<()> {
        run(
            &self.binary,
            [
                OsStr::new("index"),
                OsStr::new("-p"),
                prefix.as_os_str(),
                fasta.as_os_str(),
            ],
        )
    }

    fn align(&self, prefix: &Path, record: &str) -> Result<String> {
        run_with_input(&self.binary, self.align_args(prefix), record)
    }
}
