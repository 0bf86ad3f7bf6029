//! Before/after size reporting.
//!
//! The pipeline yields one [`CompressionResult`] per archive; a
//! [`BatchReport`] keeps them in processing order and hands them to a
//! [`ReportSink`] for rendering.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};
use tracing::info;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Size statistics for one processed archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionResult {
    pub file_name: String,
    pub size_before: u64,
    pub size_after: u64,
    /// Percentage saved; negative when the archive grew
    pub ratio: f64,
}

impl CompressionResult {
    pub fn new(file_name: impl Into<String>, size_before: u64, size_after: u64) -> Self {
        Self {
            file_name: file_name.into(),
            size_before,
            size_after,
            ratio: compression_ratio(size_before, size_after),
        }
    }

    pub fn size_before_mb(&self) -> f64 {
        self.size_before as f64 / BYTES_PER_MB
    }

    pub fn size_after_mb(&self) -> f64 {
        self.size_after as f64 / BYTES_PER_MB
    }
}

/// `(before - after) / before * 100`, or 0 for an empty input.
pub fn compression_ratio(before: u64, after: u64) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (before as f64 - after as f64) / before as f64 * 100.0
}

/// Results in the order their archives were processed.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    results: Vec<CompressionResult>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: CompressionResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[CompressionResult] {
        &self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn render(&self, sink: &mut dyn ReportSink) -> io::Result<()> {
        sink.render(&self.results)
    }
}

/// Destination for a finished report.
pub trait ReportSink {
    fn render(&mut self, results: &[CompressionResult]) -> io::Result<()>;
}

/// Human-readable text, one block per archive.
pub struct ConsoleReport<W: Write> {
    out: W,
}

impl<W: Write> ConsoleReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for ConsoleReport<W> {
    fn render(&mut self, results: &[CompressionResult]) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "Compression report:")?;
        for result in results {
            writeln!(self.out, "{}", result.file_name)?;
            writeln!(
                self.out,
                "Initial size: {:.2} MB, Final size: {:.2} MB, Compression ratio: {:.2}%",
                result.size_before_mb(),
                result.size_after_mb(),
                result.ratio
            )?;
            writeln!(self.out, "{}", "-".repeat(70))?;
        }
        self.out.flush()
    }
}

/// One structured `tracing` event per archive.
pub struct LogReport;

impl ReportSink for LogReport {
    fn render(&mut self, results: &[CompressionResult]) -> io::Result<()> {
        for result in results {
            info!(
                file = %result.file_name,
                before_bytes = result.size_before,
                after_bytes = result.size_after,
                ratio = %format!("{:.2}", result.ratio),
                "compressed"
            );
        }
        Ok(())
    }
}

/// The results as a pretty-printed JSON array.
pub struct JsonReport<W: Write> {
    out: W,
}

impl<W: Write> JsonReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for JsonReport<W> {
    fn render(&mut self, results: &[CompressionResult]) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, results)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Discards the report.
pub struct SilentReport;

impl ReportSink for SilentReport {
    fn render(&mut self, _results: &[CompressionResult]) -> io::Result<()> {
        Ok(())
    }
}

/// Report sink selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    /// Text summary on stdout
    #[default]
    Console,
    /// Structured log events
    Log,
    /// JSON array on stdout
    Json,
    /// No report
    None,
}

impl ReportFormat {
    /// Build the sink for this format, writing to stdout where it writes at all.
    pub fn sink(self) -> Box<dyn ReportSink> {
        match self {
            ReportFormat::Console => Box::new(ConsoleReport::new(io::stdout())),
            ReportFormat::Log => Box::new(LogReport),
            ReportFormat::Json => Box::new(JsonReport::new(io::stdout())),
            ReportFormat::None => Box::new(SilentReport),
        }
    }
}
