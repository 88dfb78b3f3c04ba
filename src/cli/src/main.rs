//! Console Guard CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use console_guard_cli::commands::{dispatch, load_config, Cli};

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli, config) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
