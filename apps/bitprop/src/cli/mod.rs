//! # Bitprop CLI Module
//!
//! ## Available Commands
//!
//! - `run` - Propagate over a graph description or snapshot
//! - `validate` - Build and check a graph description
//! - `inspect` - Show the contents of a snapshot

mod commands;

use crate::config::{Schedule, UpdateMode};
use bitprop_core::PropagationError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Bitprop - belief propagation over bitwise circuits
///
/// Estimates value distributions through AND, XOR, NOT, rotation and
/// table-lookup gates by loopy sum-product message passing.
#[derive(Parser, Debug)]
#[command(name = "bitprop")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress human-readable output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Run configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run propagation and report marginals
    Run {
        /// Graph description (JSON), or a snapshot with --snapshot
        #[arg(short, long)]
        graph: PathBuf,

        /// Read the graph as a binary snapshot
        #[arg(long)]
        snapshot: bool,

        /// Write the final state as a snapshot
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum number of sweeps
        #[arg(short = 'n', long)]
        iterations: Option<usize>,

        /// Early-stop threshold on the largest message change
        #[arg(short, long)]
        tolerance: Option<f64>,

        /// Update family
        #[arg(short, long, value_enum)]
        mode: Option<UpdateMode>,

        /// Update order inside a sweep
        #[arg(short, long, value_enum)]
        schedule: Option<Schedule>,
    },

    /// Build a graph description and check its topology
    Validate {
        /// Graph description (JSON)
        #[arg(short, long)]
        graph: PathBuf,
    },

    /// Show a snapshot's structure and beliefs
    Inspect {
        /// Snapshot file
        #[arg(short, long)]
        snapshot: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), PropagationError> {
    let output = Output {
        json: cli.json_output,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Run {
            graph,
            snapshot,
            output: snapshot_out,
            iterations,
            tolerance,
            mode,
            schedule,
        } => {
            let overrides = RunOverrides {
                iterations,
                tolerance,
                mode,
                schedule,
            };
            let config = resolve_config(cli.config.as_deref(), &overrides)?;
            cmd_run(&graph, snapshot, snapshot_out.as_deref(), config, output)
        }
        Commands::Validate { graph } => cmd_validate(&graph, output),
        Commands::Inspect { snapshot } => cmd_inspect(&snapshot, output),
    }
}
