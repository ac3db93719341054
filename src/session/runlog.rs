//! Append-only log file kept for each run.
//!
//! The header records how the run was started; every later line is an
//! error or notice stamped with the local time.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::reference::ReferenceSet;
use crate::storage::catalogue::timestamp;
use crate::Result;

/// Everything written at the top of a new run log
#[derive(Debug, Clone, Default)]
pub struct RunHeader {
    pub start_time: String,
    pub version: String,
    /// Option name and value, in display order
    pub options: Vec<(String, String)>,
    pub reference_lines: Vec<String>,
    pub comment: String,
}

impl RunHeader {
    /// One `Fasta:` line per reference sequence
    pub fn reference_lines(reference: Option<&ReferenceSet>) -> Vec<String> {
        match reference {
            Some(set) => set
                .seq_len
                .iter()
                .map(|(name, len)| {
                    let file = set.seq_file.get(name).map(String::as_str).unwrap_or("");
                    format!("Fasta:\t{}\tsequence:\t{}\tlength:\t{}", file, name, len)
                })
                .collect(),
            None => vec!["No reference sequence set".to_string()],
        }
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("poreflow started:\t{}", self.start_time),
            format!("version:\t{}", self.version),
            "options:".to_string(),
        ];
        lines.extend(self.options.iter().map(|(k, v)| format!("\t{}:\t{}", k, v)));
        lines.push("Reference Sequences:".to_string());
        lines.extend(self.reference_lines.iter().cloned());
        lines.push(format!("comment:\t{}", self.comment));
        lines.push("Errors:".to_string());
        lines
    }
}

pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    /// Open (or create) `<dir>/<run_name>.poreflow.log` for appending
    pub fn open(dir: &Path, run_name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.poreflow.log", run_name));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_header(&self, header: &RunHeader) -> Result<()> {
        let mut file = self.file.lock();
        for line in header.lines() {
            writeln!(file, "{}", line)?;
        }
        file.flush()?;
        Ok(())
    }

    /// Append a time-stamped line (an error or a notice); never fails the caller
    pub fn record(&self, message: &str) {
        let mut file = self.file.lock();
        let line = format!("{}:\t{}", timestamp(), message);
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            tracing::warn!("Cannot write to run log {}: {}", self.path.display(), e);
        }
    }
}
