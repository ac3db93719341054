//! Mock aligner for tests and dry runs

use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::tools::traits::{Aligner, OutputProtocol};

/// Returns canned output keyed by the read id of the record it is given
pub struct MockAligner {
    protocol: OutputProtocol,
    outputs: HashMap<String, String>,
    failing: Vec<String>,
    seen: Mutex<Vec<String>>,
    builds: AtomicUsize,
}

impl MockAligner {
    pub fn new(protocol: OutputProtocol) -> Self {
        MockAligner {
            protocol,
            outputs: HashMap::new(),
            failing: Vec::new(),
            seen: Mutex::new(Vec::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Output to return for a read id
    pub fn with_output(mut self, read_id: &str, output: &str) -> Self {
        self.outputs.insert(read_id.to_string(), output.to_string());
        self
    }

    /// Make alignment of a read id fail as a crashed process would
    pub fn with_failure(mut self, read_id: &str) -> Self {
        self.failing.push(read_id.to_string());
        self
    }

    /// Read ids aligned so far, in call order
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    pub fn index_builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

fn record_id(record: &str) -> &str {
    record
        .lines()
        .next()
        .and_then(|h| h.strip_prefix('>'))
        .and_then(|h| h.split_whitespace().next())
        .unwrap_or("")
}

impl Aligner for MockAligner {
    fn name(&self) -> &str {
        "mock"
    }

    fn protocol(&self) -> OutputProtocol {
        self.protocol
    }

    fn is_available(&self) -> bool {
        true
    }

    fn index_prefix(&self, index_dir: &Path, reference_basename: &str) -> PathBuf {
        index_dir.join(format!("{}.mock.index", reference_basename))
    }

    fn index_ready(&self, prefix: &Path) -> bool {
        crate::tools::process::non_empty(prefix)
    }

    fn build_index(&self, _fasta: &Path, prefix: &Path) -> Result<()> {
        std::fs::write(prefix, b"mock")?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn align(&self, _prefix: &Path, record: &str) -> Result<String> {
        let id = record_id(record).to_string();
        self.seen.lock().push(id.clone());
        if self.failing.contains(&id) {
            anyhow::bail!("mock aligner failed on {}", id);
        }
        Ok(self.outputs.get(&id).cloned().unwrap_or_default())
    }
}
