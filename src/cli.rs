use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::config::{CompressConfig, DEFAULT_OUTPUT_DIR, PngMode, Quality};
use crate::error::{Error, Result};
use crate::pipeline::InputSelection;
use crate::report::ReportFormat;
use crate::transcode::PngSettings;

#[derive(Parser, Debug)]
#[command(name = "epubsqueeze")]
#[command(version)]
#[command(about = "Shrink EPUB files by re-encoding the images inside them", long_about = None)]
#[command(after_help = "Examples:\n  \
  epubsqueeze 70 book.epub              compress book.epub into compressed/book.epub\n  \
  epubsqueeze 50 -f                     compress every EPUB in the current directory\n  \
  epubsqueeze 60 -f --png-mode palette  keep PNGs as PNG with a reduced palette")]
pub struct Cli {
    /// JPEG quality (1-100)
    #[arg(value_name = "QUALITY", allow_negative_numbers = true)]
    pub quality: i64,

    /// EPUB file to compress
    #[arg(value_name = "EPUB_FILE")]
    pub epub_file: Option<PathBuf>,

    /// Compress every EPUB file in the current directory
    #[arg(short = 'f', long = "all-files")]
    pub all_files: bool,

    /// Directory for the compressed archives
    #[arg(short = 'o', long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Parent directory for temporary working files (default: system temp dir)
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// How PNG images are compressed
    #[arg(long, value_enum, default_value_t = PngMode::Jpeg)]
    pub png_mode: PngMode,

    /// Write optimized Huffman tables into JPEG output
    #[arg(long)]
    pub optimize: bool,

    /// Where the compression report goes
    #[arg(long, value_enum, value_name = "SINK", default_value_t = ReportFormat::Console)]
    pub report: ReportFormat,

    /// Quiet mode (-qq => only errors)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn log_level(&self) -> &'static str {
        log_level(self.quiet)
    }

    pub fn to_config(&self) -> Result<CompressConfig> {
        let mut config = CompressConfig::new(Quality::new(self.quality)?)
            .with_output_dir(&self.output_dir)
            .with_optimize(self.optimize)
            .with_png_mode(self.png_mode);
        if let Some(dir) = &self.work_dir {
            config = config.with_work_dir(dir);
        }
        Ok(config)
    }

    /// Which archives to process. `-f` wins over a file argument.
    pub fn selection(&self) -> Result<InputSelection> {
        if self.all_files {
            return Ok(InputSelection::Directory(PathBuf::from(".")));
        }
        self.epub_file
            .clone()
            .map(InputSelection::Single)
            .ok_or_else(|| Error::validation("specify an EPUB file or use -f/--all-files"))
    }
}

/// Default log filter for a `-q` count when `RUST_LOG` is unset.
pub fn log_level(quiet: u8) -> &'static str {
    match quiet {
        0 => "info",
        1 => "warn",
        _ => "error",
    }
}

/// Arguments of the standalone PNG re-encoder.
#[derive(Parser, Debug)]
#[command(name = "pngsqueeze")]
#[command(version)]
#[command(about = "Losslessly re-encode a PNG with a chosen compression effort", long_about = None)]
#[command(group(ArgGroup::new("effort").required(true).args(["level", "quality"])))]
pub struct PngCli {
    /// PNG file to read
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Where to write the result
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// zlib-style compression level (0-9)
    #[arg(long, allow_negative_numbers = true)]
    pub level: Option<i64>,

    /// ImageMagick-style PNG quality (0-100)
    #[arg(long, allow_negative_numbers = true)]
    pub quality: Option<i64>,

    /// Quiet mode (-qq => only errors)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl PngCli {
    pub fn settings(&self) -> Result<PngSettings> {
        match (self.level, self.quality) {
            (Some(level), _) => PngSettings::from_level(level),
            (None, Some(quality)) => PngSettings::from_quality(quality),
            (None, None) => Err(Error::validation("either --level or --quality is required")),
        }
    }
}
