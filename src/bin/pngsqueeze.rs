//! Standalone lossless PNG re-encoder.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use epubsqueeze::PngCli;
use epubsqueeze::cli::log_level;
use epubsqueeze::report::compression_ratio;
use epubsqueeze::transcode::{ImageCodec, PngCodec, write_atomically};

fn main() -> Result<()> {
    let cli = PngCli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(cli.quiet)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let settings = cli.settings()?;

    let original = std::fs::read(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let image = image::load_from_memory_with_format(&original, image::ImageFormat::Png)
        .with_context(|| format!("{} is not a readable PNG", cli.input.display()))?;

    let encoded = PngCodec::new(settings).encode(&image)?;
    write_atomically(&cli.output, &encoded)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;

    info!(
        input = %cli.input.display(),
        output = %cli.output.display(),
        before = original.len(),
        after = encoded.len(),
        ratio = %format!("{:.2}%", compression_ratio(original.len() as u64, encoded.len() as u64)),
        "PNG re-encoded"
    );
    Ok(())
}
