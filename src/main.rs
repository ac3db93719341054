use clap::Parser;
use colored::*;
use poreflow::cli::{commands, Cli, Commands};
use poreflow::core::logging::init_logging;
use poreflow::PoreflowError;
use std::process;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);

        // Use appropriate exit codes based on error type
        let exit_code = match e.downcast_ref::<PoreflowError>() {
            Some(PoreflowError::Config(_)) => 2,
            Some(PoreflowError::Io(_)) => 3,
            Some(PoreflowError::Parse(_))
            | Some(PoreflowError::Alignment(_))
            | Some(PoreflowError::Extraction(_))
            | Some(PoreflowError::Container(_)) => 4,
            Some(PoreflowError::Storage(_)) => 5,
            Some(PoreflowError::RunExists(_)) => 6,
            Some(PoreflowError::Reference { .. }) => 7,
            Some(PoreflowError::Tool(_)) => 8,
            None => 1,
        };
        process::exit(exit_code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = commands::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Watch(args) => commands::watch::run(args, config, cli.verbose > 0),
        Commands::Reference(args) => commands::reference::run(args, config),
    }
}
