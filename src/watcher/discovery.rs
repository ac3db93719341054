//! Which files under the watch directory are container files worth reading.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::core::config::WatchConfig;

#[derive(Debug, Clone)]
pub struct Eligibility {
    /// Directory name every eligible path passes through
    pub marker_dir: String,
    /// Substring that rules a path out
    pub exclude: String,
    pub extension: String,
}

impl Eligibility {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            marker_dir: config.marker_dir.clone(),
            exclude: config.exclude.clone(),
            extension: config.extension.clone(),
        }
    }

    pub fn is_eligible(&self, path: &Path) -> bool {
        let in_marker = path
            .components()
            .any(|c| c.as_os_str() == OsStr::new(&self.marker_dir));
        let excluded = !self.exclude.is_empty() && path.to_string_lossy().contains(&self.exclude);
        let extension = path.extension().and_then(OsStr::to_str) == Some(self.extension.as_str());
        in_marker && !excluded && extension
    }
}

/// Size and modification time, compared between polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Every eligible file under `root`, in a stable order
pub fn scan(root: &Path, eligibility: &Eligibility) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| eligibility.is_eligible(path))
        .collect()
}
