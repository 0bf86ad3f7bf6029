//! Settings threaded through the pipeline.
//!
//! Nothing here is process-global: every run gets its own
//! [`CompressConfig`], which makes the pipeline safe to call repeatedly from
//! the same process.

use clap::ValueEnum;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Output directory used when none is given, relative to the current
/// directory.
pub const DEFAULT_OUTPUT_DIR: &str = "compressed";

/// JPEG quality, validated to 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;

    pub fn new(value: i64) -> Result<Self> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(Error::validation(format!(
                "quality must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// What happens to `.png` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PngMode {
    /// Re-encode as JPEG at the configured quality; the file keeps its name
    #[default]
    Jpeg,
    /// Reduce to an adaptive palette of at most 256 colors, stay PNG
    Palette,
}

/// Settings for one compression run.
#[derive(Debug, Clone)]
pub struct CompressConfig {
    pub quality: Quality,
    /// Emit optimized Huffman tables in JPEG output
    pub optimize: bool,
    pub png_mode: PngMode,
    /// Where finished archives land; created when missing
    pub output_dir: PathBuf,
    /// Parent of the per-archive working directories
    pub work_dir: PathBuf,
}

impl CompressConfig {
    pub fn new(quality: Quality) -> Self {
        Self {
            quality,
            optimize: false,
            png_mode: PngMode::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            work_dir: std::env::temp_dir(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_png_mode(mut self, mode: PngMode) -> Self {
        self.png_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_bounds_are_inclusive() {
        assert_eq!(Quality::new(1).unwrap().get(), 1);
        assert_eq!(Quality::new(100).unwrap().get(), 100);
        assert!(Quality::new(0).unwrap_err().is_validation());
        assert!(Quality::new(150).unwrap_err().is_validation());
        assert!(Quality::new(-5).is_err());
    }

    #[test]
    fn defaults_match_the_classic_layout() {
        let config = CompressConfig::new(Quality::new(70).unwrap());
        assert_eq!(config.output_dir, PathBuf::from("compressed"));
        assert_eq!(config.png_mode, PngMode::Jpeg);
        assert!(!config.optimize);
    }
}
