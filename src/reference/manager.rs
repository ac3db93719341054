//! Validated, merged reference sets and their aligner indexes.
//!
//! One or more reference FASTA files are merged into
//! `<reference_dir>/<basename>_valid.fasta`, upper-cased, with each record's
//! description set to the file it came from. A merged set is built once and
//! indexed once; later runs pick up the files already on disk.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::bio::fasta::{parse_fasta, write_fasta};
use crate::bio::sequence::Sequence;
use crate::core::config::Config;
use crate::reference::kmer::KmerTable;
use crate::storage::value::{row, Row};
use crate::tools::traits::{ensure_index, Aligner};
use crate::{PoreflowError, Result};

/// Extensions recognised as reference FASTA files in batch mode
pub const REFERENCE_EXTENSIONS: [&str; 3] = ["fa", "fasta", "fna"];

#[derive(Debug, Clone)]
pub struct ReferenceSet {
    /// Merged basename, e.g. `lambda` or `lambda_plus_2_more_seqs`
    pub basename: String,
    pub fasta: PathBuf,
    pub sources: Vec<PathBuf>,
    /// Sequence name → length
    pub seq_len: IndexMap<String, u64>,
    /// Sequence name → source file name
    pub seq_file: IndexMap<String, String>,
    /// Source file name → summed length of its sequences
    pub file_len: IndexMap<String, u64>,
    pub total_len: u64,
    /// Per-sequence k-mer counts, present when telemetry is enabled
    pub kmers: IndexMap<String, KmerTable>,
    pub index_prefix: Option<PathBuf>,
}

impl ReferenceSet {
    /// One `reference_seq_info` row per sequence, in file order
    pub fn info_rows(&self) -> Vec<(String, Row)> {
        self.seq_len
            .iter()
            .map(|(name, &len)| {
                let file = self.seq_file.get(name).cloned().unwrap_or_default();
                let file_total = self.file_len.get(&file).copied().unwrap_or(len);
                (
                    name.clone(),
                    row([
                        ("refname", name.as_str().into()),
                        ("reflen", (len as i64).into()),
                        ("reffile", file.as_str().into()),
                        ("ref_total_len", (file_total as i64).into()),
                    ]),
                )
            })
            .collect()
    }

    /// Lines written to a run log describing the reference
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Reference {} ({} sequences, {} bases) from {}",
            self.basename,
            self.seq_len.len(),
            self.total_len,
            self.fasta.display()
        )];
        for (name, len) in &self.seq_len {
            let file = self.seq_file.get(name).map(String::as_str).unwrap_or("");
            lines.push(format!("  {}\t{}\t{}", name, len, file));
        }
        lines
    }
}

/// Basename shared by a set of reference files
pub fn merged_basename(files: &[PathBuf]) -> Result<String> {
    let first = files
        .first()
        .ok_or_else(|| PoreflowError::Config("no reference files given".to_string()))?;
    let stem = first
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PoreflowError::Reference {
            file: first.display().to_string(),
            reason: "file name has no usable stem".to_string(),
        })?;

    Ok(match files.len() {
        1 => stem.to_string(),
        n => format!("{}_plus_{}_more_seqs", stem, n - 1),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Validate every source file and write the merged FASTA to `dest`.
///
/// Nothing is left behind at `dest` when validation fails.
pub fn build_validated(files: &[PathBuf], dest: &Path) -> Result<()> {
    let result = collect_validated(files).and_then(|records| write_fasta(dest, &records));
    if result.is_err() && dest.exists() {
        std::fs::remove_file(dest)?;
    }
    result
}

fn collect_validated(files: &[PathBuf]) -> Result<Vec<Sequence>> {
    let mut merged = Vec::new();

    for path in files {
        let shown = path.display().to_string();
        let records = parse_fasta(path).map_err(|e| PoreflowError::Reference {
            file: shown.clone(),
            reason: e.to_string(),
        })?;

        if records.is_empty() {
            return Err(PoreflowError::Reference {
                file: shown,
                reason: "it's an empty file".to_string(),
            });
        }

        for record in records {
            if record.is_empty() {
                return Err(PoreflowError::Reference {
                    file: shown,
                    reason: format!("sequence {} has no bases", record.id),
                });
            }
            merged.push(record.to_upper().with_description(file_name(path)));
        }
    }
    Ok(merged)
}

/// Read a merged FASTA back into a reference set
pub fn load(
    basename: &str,
    fasta: &Path,
    sources: &[PathBuf],
    kmer_len: Option<usize>,
) -> Result<ReferenceSet> {
    let records = parse_fasta(fasta)?;
    let mut set = ReferenceSet {
        basename: basename.to_string(),
        fasta: fasta.to_path_buf(),
        sources: sources.to_vec(),
        seq_len: IndexMap::new(),
        seq_file: IndexMap::new(),
        file_len: IndexMap::new(),
        total_len: 0,
        kmers: IndexMap::new(),
        index_prefix: None,
    };

    for record in &records {
        let len = record.len() as u64;
        let file = record
            .description
            .as_deref()
            .and_then(|d| d.split_whitespace().next())
            .unwrap_or(basename)
            .to_string();

        tracing::debug!("Reference sequence {} ({} bp) from {}", record.id, len, file);
        set.seq_len.insert(record.id.clone(), len);
        *set.file_len.entry(file.clone()).or_insert(0) += len;
        set.seq_file.insert(record.id.clone(), file);
        set.total_len += len;

        if let Some(k) = kmer_len {
            set.kmers
                .insert(record.id.clone(), KmerTable::count(&record.sequence, k));
        }
    }
    Ok(set)
}

/// Reference files found below one `downloads` directory
#[derive(Debug, Clone, PartialEq)]
pub struct BatchGroup {
    pub downloads_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Find `downloads/**/reference/*.{fa,fasta,fna}` files below `root`,
/// grouped by their nearest `downloads` ancestor
pub fn discover_batch(root: &Path, marker: &str) -> Vec<BatchGroup> {
    let mut groups: IndexMap<PathBuf, Vec<PathBuf>> = IndexMap::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let is_fasta = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| REFERENCE_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        let in_reference_dir = path
            .parent()
            .map(|p| p.components().any(|c| c.as_os_str() == "reference"))
            .unwrap_or(false);
        if !is_fasta || !in_reference_dir {
            continue;
        }

        let downloads = path.ancestors().skip(1).find(|a| {
            a.file_name()
                .map(|n| n.to_string_lossy().contains(marker))
                .unwrap_or(false)
        });
        if let Some(dir) = downloads {
            groups
                .entry(dir.to_path_buf())
                .or_default()
                .push(path.to_path_buf());
        }
    }

    groups
        .into_iter()
        .map(|(downloads_dir, files)| BatchGroup { downloads_dir, files })
        .collect()
}

/// How runs get their reference
#[derive(Debug, Clone)]
pub enum ReferenceSource {
    None,
    /// One set of files shared by every run
    Fixed(Vec<PathBuf>),
    /// One set per `downloads` directory
    Batch(Vec<BatchGroup>),
}

/// Builds, indexes and caches reference sets by merged basename
pub struct ReferenceManager {
    reference_dir: PathBuf,
    index_dir: PathBuf,
    kmer_len: Option<usize>,
    source: ReferenceSource,
    cache: IndexMap<String, Arc<ReferenceSet>>,
}

impl ReferenceManager {
    pub fn new(
        reference_dir: PathBuf,
        index_dir: PathBuf,
        kmer_len: Option<usize>,
        source: ReferenceSource,
    ) -> Self {
        Self {
            reference_dir,
            index_dir,
            kmer_len,
            source,
            cache: IndexMap::new(),
        }
    }

    /// Manager for a validated configuration; batch groups are discovered
    /// under the watch directory
    pub fn from_config(config: &Config) -> Self {
        let align = &config.alignment;
        let source = if !align.reference.is_empty() {
            ReferenceSource::Fixed(align.reference.clone())
        } else if align.batch {
            let groups = config
                .watch
                .watch_dir
                .as_deref()
                .map(|root| discover_batch(root, &config.watch.marker_dir))
                .unwrap_or_default();
            ReferenceSource::Batch(groups)
        } else {
            ReferenceSource::None
        };
        let kmer_len = config.features.telemetry.then_some(align.kmer_len);

        Self::new(align.reference_dir(), align.index_dir(), kmer_len, source)
    }

    pub fn source(&self) -> &ReferenceSource {
        &self.source
    }

    /// Validate (if needed), load and index one set of reference files
    pub fn prepare(
        &mut self,
        files: &[PathBuf],
        aligner: Option<&dyn Aligner>,
    ) -> Result<Arc<ReferenceSet>> {
        let basename = merged_basename(files)?;
        if let Some(set) = self.cache.get(&basename) {
            return Ok(Arc::clone(set));
        }

        std::fs::create_dir_all(&self.reference_dir)?;
        let fasta = self.reference_dir.join(format!("{}_valid.fasta", basename));
        let ready = std::fs::metadata(&fasta).map(|m| m.len() > 0).unwrap_or(false);
        if !ready {
            tracing::info!("Validating reference {} from {} file(s)", basename, files.len());
            build_validated(files, &fasta)?;
        }

        let mut set = load(&basename, &fasta, files, self.kmer_len)?;

        if let Some(aligner) = aligner {
            let prefix = aligner.index_prefix(&self.index_dir, &basename);
            ensure_index(aligner, &fasta, &prefix).map_err(|e| PoreflowError::Reference {
                file: fasta.display().to_string(),
                reason: format!("{} indexing failed: {:#}", aligner.name(), e),
            })?;
            set.index_prefix = Some(prefix);
        }

        tracing::info!(
            "Reference {} ready: {} sequences, {} bases",
            basename,
            set.seq_len.len(),
            set.total_len
        );
        let set = Arc::new(set);
        self.cache.insert(basename, Arc::clone(&set));
        Ok(set)
    }

    /// Prepare every configured reference set up front
    pub fn prepare_all(&mut self, aligner: Option<&dyn Aligner>) -> Result<Vec<Arc<ReferenceSet>>> {
        let file_sets: Vec<Vec<PathBuf>> = match &self.source {
            ReferenceSource::None => Vec::new(),
            ReferenceSource::Fixed(files) => vec![files.clone()],
            ReferenceSource::Batch(groups) => groups.iter().map(|g| g.files.clone()).collect(),
        };
        file_sets
            .iter()
            .map(|files| self.prepare(files, aligner))
            .collect()
    }

    /// The reference set a container file's run should align against
    pub fn for_file(
        &mut self,
        path: &Path,
        aligner: Option<&dyn Aligner>,
    ) -> Result<Option<Arc<ReferenceSet>>> {
        let files = match &self.source {
            ReferenceSource::None => return Ok(None),
            ReferenceSource::Fixed(files) => files.clone(),
            ReferenceSource::Batch(groups) => {
                match groups.iter().find(|g| path.starts_with(&g.downloads_dir)) {
                    Some(group) => group.files.clone(),
                    None => return Ok(None),
                }
            }
        };
        self.prepare(&files, aligner).map(Some)
    }
}
