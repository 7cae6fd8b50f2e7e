//! tempora command-line driver.
//!
//! Usage:
//!   # mod-3 convergence from -1
//!   cargo run -p tempora-cli -- converge --modulus 3 --seed -1
//!
//!   # Concurrent transfers with a custom retry policy
//!   cargo run -p tempora-cli -- --config tempora.ron transfer --workers 8
//!
//!   # Dump the effective configuration
//!   cargo run -p tempora-cli -- print-config

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tempora_timeline::LoopOptions;

use crate::commands::TransferPlan;
use crate::config::TemporaConfig;

/// Reversible temporal variables and transactional memory.
#[derive(Parser, Debug)]
#[command(name = "tempora")]
#[command(about = "Run tempora convergence and transaction scenarios")]
struct Cli {
    /// RON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Converge x = (x + 1) mod N
    Converge {
        #[arg(long, default_value_t = 3)]
        modulus: i64,

        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        seed: i64,

        /// Keep the full history instead of unifying it
        #[arg(long)]
        no_unify: bool,

        /// Fold only the detected cycle (implies --no-unify)
        #[arg(long)]
        fold: bool,

        /// Skip the final forward pass
        #[arg(long)]
        no_final: bool,
    },

    /// Converge v = -v over floats
    Negate {
        #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
        seed: f64,
    },

    /// Concurrent transfers between two accounts
    Transfer {
        #[arg(long, default_value_t = 4)]
        workers: usize,

        #[arg(long, default_value_t = 100)]
        transfers: usize,

        #[arg(long, default_value_t = 1_000)]
        initial: i64,
    },

    /// Print the effective configuration as RON
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tempora_telemetry::init_tracing(tempora_telemetry::DEFAULT_DIRECTIVE)?;

    let cli = Cli::parse();
    let config = TemporaConfig::load_or_default(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    let output = match cli.command {
        Command::Converge {
            modulus,
            seed,
            no_unify,
            fold,
            no_final,
        } => {
            let mut options = LoopOptions::from_config(&config.convergence);
            if no_unify || fold {
                options = options.unify_on_convergence(false);
            }
            if fold {
                options = options.fold_cycles(true);
            }
            if no_final {
                options = options.run_final_iteration(false);
            }
            commands::converge(&config, modulus, seed, options)?
        }
        Command::Negate { seed } => commands::negate(&config, seed)?,
        Command::Transfer {
            workers,
            transfers,
            initial,
        } => {
            let plan = TransferPlan {
                workers,
                transfers,
                initial,
            };
            commands::transfer(&config, plan).await?
        }
        Command::PrintConfig => config.to_ron()?,
    };

    println!("{}", output.trim_end());
    Ok(())
}
