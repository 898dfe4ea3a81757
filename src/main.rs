//! Pushgate - push-time incremental violation gate
//!
//! Thin binary wrapper: initializes logging, parses CLI args, and exits
//! with the gate's decision code.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = pushgate::cli::Cli::parse();
    std::process::exit(pushgate::cli::run(cli));
}
