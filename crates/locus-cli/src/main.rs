mod cli;
mod commands;
mod config;
mod mapsco;
mod report;

use clap::Parser;
use macro_rules_attribute::apply;
use smol_macros::main;

use crate::cli::Cli;

/// Exit code when at least one lookup failed.
const EXIT_LOOKUP_FAILED: i32 = 1;
/// Exit code when the command could not run at all.
const EXIT_ERROR: i32 = 2;

#[apply(main!)]
async fn main() {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,isahc=error")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match commands::run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_LOOKUP_FAILED),
        Err(e) => {
            tracing::error!(?e, "locus failed");
            std::process::exit(EXIT_ERROR);
        }
    }
}
