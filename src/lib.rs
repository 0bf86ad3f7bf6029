//! # epubsqueeze
//!
//! Shrinks EPUB files by re-encoding the JPEG and PNG images inside them.
//!
//! Each archive is unpacked into a private working directory, its images are
//! re-encoded in place, and the tree is packed into a fresh ZIP container
//! with the same entry paths. Everything that is not an image is carried over
//! byte for byte. The result lands in an output directory under the input's
//! file name, and the working directory is removed on every exit path.
//!
//! ## Features
//!
//! - ZIP reading (STORED, DEFLATE, ZIP64) and writing (DEFLATE) with CRC checks
//! - JPEG re-encoding at a chosen quality, optionally with optimized Huffman tables
//! - PNG handling as JPEG re-encode or as a lossy palette reduction
//! - Batch mode over a directory with a console, log or JSON report
//!
//! ## Example
//!
//! ```no_run
//! use epubsqueeze::{CompressConfig, EpubCompressor, InputSelection, Quality, RunOutcome};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CompressConfig::new(Quality::new(60)?).with_output_dir("smaller");
//!     let compressor = EpubCompressor::new(config);
//!
//!     if let RunOutcome::Completed(summary) =
//!         compressor.run(&InputSelection::Directory(".".into())).await?
//!     {
//!         for result in summary.report.results() {
//!             println!("{}: {:.2}%", result.file_name, result.ratio);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod report;
pub mod transcode;
pub mod workspace;
pub mod zip;

pub use cli::{Cli, PngCli};
pub use config::{CompressConfig, PngMode, Quality};
pub use error::{Error, Result};
pub use io::{LocalFileReader, ReadAt};
pub use pipeline::{BatchSummary, EpubCompressor, InputSelection, RunOutcome};
pub use report::{BatchReport, CompressionResult, ReportFormat, ReportSink};
pub use zip::{ZipExtractor, ZipFileEntry, ZipWriter};
