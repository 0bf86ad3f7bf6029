//! Error types for the EPUB compressor.
//!
//! ZIP and codec internals report failures through `anyhow`; the pipeline
//! wraps them here together with the file that failed, so callers can tell
//! a broken archive from a failed move or a bad argument.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the compressor.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed user input, reported before any archive is touched
    #[error("{0}")]
    Validation(String),

    /// Input is missing or not a readable ZIP container
    #[error("cannot read archive {}: {cause:#}", .path.display())]
    ArchiveRead { path: PathBuf, cause: anyhow::Error },

    /// One image could not be decoded or re-encoded
    #[error("cannot transcode image {}: {cause:#}", .path.display())]
    ImageTranscode { path: PathBuf, cause: anyhow::Error },

    /// The rebuilt archive could not be written
    #[error("cannot write archive {}: {cause:#}", .path.display())]
    ArchiveWrite { path: PathBuf, cause: anyhow::Error },

    /// The rebuilt archive could not be moved to its destination
    #[error("cannot move {} to {}: {source}", .from.display(), .to.display())]
    Relocation {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The per-run working directory could not be created or removed
    #[error("working directory {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Convenience result type for compressor operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn archive_read(path: impl Into<PathBuf>, cause: impl Into<anyhow::Error>) -> Self {
        Self::ArchiveRead {
            path: path.into(),
            cause: cause.into(),
        }
    }

    pub fn image_transcode(path: impl Into<PathBuf>, cause: impl Into<anyhow::Error>) -> Self {
        Self::ImageTranscode {
            path: path.into(),
            cause: cause.into(),
        }
    }

    pub fn archive_write(path: impl Into<PathBuf>, cause: impl Into<anyhow::Error>) -> Self {
        Self::ArchiveWrite {
            path: path.into(),
            cause: cause.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
