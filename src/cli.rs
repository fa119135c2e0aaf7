/// CLI glue for dv-ingest: command parsing and dispatch.
///
/// All pipeline logic lives in the `dv-ingest-core` crate. The commands here work on the
/// local filesystem only; neither of them contacts the remote repository.
use crate::load_config::load_config;
use crate::plan::plan_deposit;
use anyhow::Result;
use clap::{Parser, Subcommand};
use dv_ingest_core::output::OutputArea;
use dv_ingest_core::registry::{canonical, output_root};
use std::path::PathBuf;

/// CLI for dv-ingest: inspect deposits and output areas before ingestion.
#[derive(Parser)]
#[clap(
    name = "dv-ingest",
    version,
    about = "Ingest bag deposits into a remote dataset repository"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show what ingesting a deposit would do, without contacting the repository
    Plan {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Deposit directory
        #[clap(long)]
        deposit: PathBuf,
    },
    /// Prepare and validate the output area a submission would use
    CheckOutput {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Submitted directory, absolute and under the inbox
        #[clap(long)]
        path: PathBuf,
        /// Treat the path as one deposit instead of a batch of deposits
        #[clap(long)]
        single_object: bool,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Plan { config, deposit } => {
            let config = load_config(config)?;
            tracing::info!(command = "plan", deposit = %deposit.display(), "Planning deposit");
            let plan = plan_deposit(&config, &deposit)?;
            print!("{plan}");
            Ok(())
        }
        Commands::CheckOutput {
            config,
            path,
            single_object,
        } => {
            let config = load_config(config)?;
            let inbox = canonical(&config.inbox, "inbox")?;
            let outbox = canonical(&config.outbox, "outbox")?;
            let root = output_root(&inbox, &outbox, &path, single_object)?;
            match OutputArea::prepare(&root, single_object) {
                Ok(area) => {
                    println!("Output area ready: {}", area.root().display());
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "check-output", error = %e, "Output area check failed");
                    Err(e.into())
                }
            }
        }
    }
}
