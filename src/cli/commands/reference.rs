use clap::Args;
use std::path::PathBuf;

use crate::cli::formatter::{section_header, step, tree_item, StepStatus};
use crate::core::config::{AlignMode, Config};
use crate::reference::{ReferenceManager, ReferenceSource};
use crate::tools::aligner_for;
use crate::PoreflowError;

#[derive(Args, Debug)]
pub struct ReferenceArgs {
    /// Reference FASTA file(s) merged into one set
    #[arg(required = true, value_name = "FASTA")]
    pub files: Vec<PathBuf>,

    /// Aligner to build an index for; omit to validate only
    #[arg(short, long, value_enum)]
    pub align: Option<AlignMode>,

    /// Where the validated FASTA is written
    #[arg(long, value_name = "DIR")]
    pub reference_dir: Option<PathBuf>,

    /// Where aligner indexes are written
    #[arg(long, value_name = "DIR")]
    pub index_dir: Option<PathBuf>,
}

pub fn run(args: ReferenceArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(mode) = args.align {
        config.alignment.mode = mode;
    }
    if args.reference_dir.is_some() {
        config.alignment.reference_dir = args.reference_dir.clone();
    }
    if args.index_dir.is_some() {
        config.alignment.index_dir = args.index_dir.clone();
    }

    let aligner = aligner_for(&config.alignment);
    if let Some(aligner) = aligner.as_deref() {
        if !aligner.is_available() {
            return Err(PoreflowError::Tool(format!("{} was not found on PATH", aligner.name())).into());
        }
    }

    section_header("poreflow reference");
    let mut manager = ReferenceManager::new(
        config.alignment.reference_dir(),
        config.alignment.index_dir(),
        None,
        ReferenceSource::Fixed(args.files.clone()),
    );
    let sets = manager.prepare_all(aligner.as_deref())?;

    for set in &sets {
        step(StepStatus::Complete, &format!("Validated {}", set.basename));
        tree_item(false, "Sequences", &set.seq_len.len().to_string());
        tree_item(false, "Bases", &set.total_len.to_string());
        tree_item(aligner.is_none(), "FASTA", &set.fasta.display().to_string());
        if let Some(prefix) = &set.index_prefix {
            tree_item(true, "Index", &prefix.display().to_string());
        }
    }
    Ok(())
}
