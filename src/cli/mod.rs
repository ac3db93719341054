pub mod commands;
pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "poreflow",
    version,
    about = "Stream basecalled nanopore reads into a relational store as they are written",
    long_about = "poreflow watches a sequencer output directory, extracts run metadata, reads and \
                  basecaller summaries from each completed container file, stores them per run \
                  and optionally aligns every read against a reference as it arrives."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to ~/.poreflow/poreflow.toml when present)
    #[arg(long, value_name = "FILE", env = "POREFLOW_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch a directory and upload every completed read file
    Watch(commands::watch::WatchArgs),

    /// Validate a reference set and build its aligner index
    Reference(commands::reference::ReferenceArgs),
}
