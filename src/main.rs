//! Main entry point for the epubsqueeze CLI application.
//!
//! Arguments are validated before any archive is opened; the pipeline then
//! runs archive by archive and the report is rendered at the end.

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use epubsqueeze::{Cli, EpubCompressor, RunOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    // Pre-flight: nothing is read or written when these fail
    let config = cli.to_config()?;
    let selection = cli.selection()?;

    let compressor = EpubCompressor::new(config);
    let summary = match compressor.run(&selection).await? {
        RunOutcome::NothingFound => {
            if !cli.is_very_quiet() {
                println!("No EPUB files found in the current directory.");
            }
            return Ok(());
        }
        RunOutcome::Completed(summary) => summary,
    };

    let mut sink = cli.report.sink();
    summary.report.render(sink.as_mut())?;

    if summary.has_failures() {
        bail!(
            "{} of {} archives failed",
            summary.failures.len(),
            summary.failures.len() + summary.report.len()
        );
    }

    Ok(())
}

/// Compact stderr logging. `RUST_LOG` overrides the level implied by `-q`.
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
