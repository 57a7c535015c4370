//! # Bitprop
//!
//! Command-line driver for belief propagation over bitwise circuits.
//!
//! ## Usage
//!
//! ```bash
//! # Check a circuit description
//! bitprop validate -g circuit.json
//!
//! # Propagate for up to 50 sweeps and keep the final state
//! bitprop run -g circuit.json -n 50 -t 1e-9 -o state.bin
//!
//! # Look at a saved state
//! bitprop --json-output inspect -s state.bin
//! ```
//!
//! Logging goes to stderr. `BITPROP_LOG` (or `RUST_LOG`) sets the filter and
//! `BITPROP_LOG_FORMAT=json` switches to JSON lines.

use bitprop::cli;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let log_format = std::env::var("BITPROP_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = EnvFilter::try_from_env("BITPROP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| "bitprop=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
