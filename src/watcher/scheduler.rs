//! Polling scheduler: finds new files, waits for them to settle and hands
//! them to the pipeline one at a time.
//!
//! A file is dispatched once it has been known for the quiescence interval
//! and its size and mtime did not change between two consecutive polls.
//! Dispatched paths are never queued again.

use colored::*;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::core::config::WatchConfig;
use crate::watcher::discovery::{scan, Eligibility, FileStamp};
use crate::{PoreflowError, Result};

/// Granularity of the sleep between polls, so shutdown is noticed quickly
const SLEEP_STEP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct PendingFile {
    discovered: Instant,
    stamp: FileStamp,
    unchanged_polls: u32,
}

pub struct Scheduler {
    root: PathBuf,
    eligibility: Eligibility,
    poll_interval: Duration,
    quiescence: Duration,
    status_every: usize,
    pending: IndexMap<PathBuf, PendingFile>,
    processed: HashSet<PathBuf>,
    dispatched: usize,
}

impl Scheduler {
    pub fn new(config: &WatchConfig) -> Result<Self> {
        let root = config
            .watch_dir
            .clone()
            .ok_or_else(|| PoreflowError::Config("a watch directory is required".to_string()))?;
        if !root.is_dir() {
            return Err(PoreflowError::Config(format!(
                "watch directory {} does not exist",
                root.display()
            )));
        }
        Ok(Self {
            root,
            eligibility: Eligibility::from_config(config),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            quiescence: Duration::from_secs(config.quiescence_secs),
            status_every: config.status_every.max(1),
            pending: IndexMap::new(),
            processed: HashSet::new(),
            dispatched: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
    }

    /// Rescan the tree: queue new paths and update the stability of queued
    /// ones. Returns the number of newly queued paths.
    pub fn poll(&mut self, now: Instant) -> usize {
        let found = scan(&self.root, &self.eligibility);
        self.observe(found, now)
    }

    /// Merge one scan's results into the pending map
    pub fn observe(&mut self, found: Vec<PathBuf>, now: Instant) -> usize {
        let mut added = 0;
        for path in found {
            if self.processed.contains(&path) {
                continue;
            }
            let Some(stamp) = FileStamp::of(&path) else {
                continue;
            };
            match self.pending.get_mut(&path) {
                Some(file) if file.stamp == stamp => file.unchanged_polls += 1,
                Some(file) => {
                    file.stamp = stamp;
                    file.unchanged_polls = 0;
                }
                None => {
                    self.pending.insert(
                        path,
                        PendingFile {
                            discovered: now,
                            stamp,
                            unchanged_polls: 0,
                        },
                    );
                    added += 1;
                }
            }
        }

        let vanished: Vec<PathBuf> = self
            .pending
            .keys()
            .filter(|p| !p.exists())
            .cloned()
            .collect();
        for path in vanished {
            tracing::warn!("{} disappeared before it was read", path.display());
            self.pending.shift_remove(&path);
        }
        added
    }

    /// Queued files that are old enough and stable, in discovery order
    pub fn ready(&self, now: Instant) -> Vec<PathBuf> {
        self.pending
            .iter()
            .filter(|(_, f)| {
                now.saturating_duration_since(f.discovered) >= self.quiescence && f.unchanged_polls >= 1
            })
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Move a path from pending to processed
    pub fn take(&mut self, path: &Path) {
        self.pending.shift_remove(path);
        self.processed.insert(path.to_path_buf());
    }

    fn status_line(&self) -> String {
        format!(
            "{} {} pending, {} processed",
            "●".cyan(),
            self.pending.len().to_string().yellow(),
            self.processed.len().to_string().green()
        )
    }

    /// Poll and dispatch until `shutdown` is set. The handler reports
    /// per-file problems itself; an error from it stops the loop.
    pub fn run<F>(&mut self, shutdown: &AtomicBool, mut handler: F) -> Result<()>
    where
        F: FnMut(&Path) -> Result<()>,
    {
        tracing::info!("Watching {}", self.root.display());
        while !shutdown.load(Ordering::SeqCst) {
            let added = self.poll(Instant::now());
            if added > 0 {
                tracing::debug!("{} new file(s) queued", added);
            }

            for path in self.ready(Instant::now()) {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                self.take(&path);
                handler(&path)?;
                self.dispatched += 1;
                if self.dispatched % self.status_every == 0 {
                    println!("{} dispatched. {}", self.dispatched, self.status_line());
                }
            }

            println!("{}", self.status_line());
            let mut slept = Duration::ZERO;
            while slept < self.poll_interval && !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(SLEEP_STEP);
                slept += SLEEP_STEP;
            }
        }
        tracing::info!(
            "Stopped watching after {} file(s); {} still pending",
            self.processed.len(),
            self.pending.len()
        );
        Ok(())
    }
}
