//! Sampleset - Main Entry Point
//!
//! Command-line tool for labeled multimodal sample files.

use clap::Parser;
use sampleset::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sampleset=info".into()),
        )
        .init();

    run(Cli::parse())
}
