use anyhow::Context;
use clap::Args;
use colored::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::formatter::{section_header, step, tree_item, StepStatus};
use crate::core::config::{AlignMode, Config};
use crate::pipeline::{FileOutcome, Pipeline};
use crate::storage::sqlite::SqliteGateway;
use crate::watcher::Scheduler;

#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Directory the sequencer writes into
    #[arg(short, long, value_name = "DIR")]
    pub watch_dir: Option<PathBuf>,

    /// Operator name; prefixes every run name
    #[arg(short = 'u', long, env = "POREFLOW_OPERATOR")]
    pub operator: Option<String>,

    /// Extra label inserted after the operator in run names
    #[arg(short, long)]
    pub custom_name: Option<String>,

    /// Owner of the flowcell, recorded in the catalogue
    #[arg(long)]
    pub flowcell_owner: Option<String>,

    /// Run number, recorded in the catalogue
    #[arg(long)]
    pub run_number: Option<String>,

    /// Free-text comment written to the run log
    #[arg(long)]
    pub comment: Option<String>,

    /// Additional users allowed to view the runs
    #[arg(long, value_delimiter = ',')]
    pub view_users: Vec<String>,

    /// Replace run stores that already exist
    #[arg(short, long)]
    pub drop_existing: bool,

    /// Keep adding to run stores that already exist
    #[arg(long)]
    pub resume: bool,

    /// Aligner used for every read
    #[arg(short, long, value_enum)]
    pub align: Option<AlignMode>,

    /// Reference FASTA file(s), comma separated
    #[arg(short, long, value_delimiter = ',', value_name = "FASTA")]
    pub reference: Vec<PathBuf>,

    /// Discover references under each downloads/**/reference directory
    #[arg(short, long)]
    pub batch: bool,

    /// Aligner options as a comma-joined flag list (e.g. "k12,T0")
    #[arg(long)]
    pub aligner_options: Option<String>,

    /// Upload raw basecaller events, 2D alignments and models
    #[arg(short, long)]
    pub telemetry: bool,

    /// Directory holding the run stores
    #[arg(long, env = "POREFLOW_STORE_DIR", value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Directory for per-run log files
    #[arg(long, env = "POREFLOW_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Worker connections per run
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Seconds between directory scans
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Seconds a file must have been known before it is read
    #[arg(long)]
    pub quiescence: Option<u64>,
}

impl WatchArgs {
    /// Overlay the command line on a loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.watch_dir {
            config.watch.watch_dir = Some(dir.clone());
        }
        if let Some(operator) = &self.operator {
            config.run.operator = operator.clone();
        }
        if self.custom_name.is_some() {
            config.run.custom_name = self.custom_name.clone();
        }
        if let Some(owner) = &self.flowcell_owner {
            config.run.flowcell_owner = owner.clone();
        }
        if let Some(number) = &self.run_number {
            config.run.run_number = number.clone();
        }
        if let Some(comment) = &self.comment {
            config.run.comment = comment.clone();
        }
        if !self.view_users.is_empty() {
            config.run.view_users = self.view_users.clone();
        }
        config.run.drop_existing |= self.drop_existing;
        config.run.resume |= self.resume;

        if let Some(mode) = self.align {
            config.alignment.mode = mode;
        }
        if !self.reference.is_empty() {
            config.alignment.reference = self.reference.clone();
        }
        config.alignment.batch |= self.batch;
        if let Some(options) = &self.aligner_options {
            match config.alignment.mode {
                AlignMode::Last => config.alignment.last_options = options.clone(),
                _ => config.alignment.bwa_options = options.clone(),
            }
        }
        config.features.telemetry |= self.telemetry;

        if self.store_dir.is_some() {
            config.store.store_dir = self.store_dir.clone();
        }
        if self.log_dir.is_some() {
            config.store.log_dir = self.log_dir.clone();
        }
        if let Some(size) = self.pool_size {
            config.store.pool_size = size;
        }
        if let Some(secs) = self.poll_interval {
            config.watch.poll_interval_secs = secs;
        }
        if let Some(secs) = self.quiescence {
            config.watch.quiescence_secs = secs;
        }
    }
}

pub fn run(args: WatchArgs, mut config: Config, verbose: bool) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.features.verbose |= verbose;
    config.validate()?;

    let mut scheduler = Scheduler::new(&config.watch)?;

    section_header("poreflow watch");
    tree_item(false, "Watching", &scheduler.root().display().to_string());
    tree_item(false, "Operator", &config.run.operator);
    tree_item(false, "Alignment", config.alignment.mode.process_label());
    tree_item(true, "Telemetry", &config.features.telemetry.to_string());

    let store_dir = config.store.store_dir();
    let gateway = SqliteGateway::open(
        &store_dir,
        Duration::from_millis(config.store.busy_timeout_ms),
    )
    .with_context(|| format!("Cannot open the run store at {}", store_dir.display()))?;
    let mut pipeline = Pipeline::new(config, Arc::new(gateway))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            eprintln!("\n{} finishing the current file, then stopping", "Interrupted:".yellow());
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("Failed to install the Ctrl-C handler")?;
    }

    let (mut stored, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    let result = scheduler.run(&shutdown, |path| {
        match pipeline.process_file(path)? {
            FileOutcome::Stored { .. } => stored += 1,
            FileOutcome::Skipped { .. } => skipped += 1,
            FileOutcome::Failed { .. } => failed += 1,
        }
        Ok(())
    });

    let closed = pipeline.finish();
    section_header("Summary");
    step(StepStatus::Complete, &format!("{} file(s) stored", stored));
    if skipped > 0 {
        step(StepStatus::Skipped, &format!("{} file(s) already stored", skipped));
    }
    if failed > 0 {
        step(StepStatus::Failed, &format!("{} file(s) failed, see the run logs", failed));
    }
    step(StepStatus::Complete, &format!("{} run(s) set to inactive", closed));

    result?;
    Ok(())
}
