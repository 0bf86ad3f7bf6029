//! Image re-encoding.
//!
//! A [`Transcoder`] maps each image file to an [`ImageCodec`] by extension,
//! decodes the file, encodes it with that codec and swaps the result over
//! the original atomically. When anything fails the original bytes stay
//! exactly as they were.

mod jpeg;
mod png;

pub use jpeg::JpegCodec;
pub use png::{PaletteCodec, PngCodec, PngSettings};

use image::DynamicImage;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::{CompressConfig, PngMode};
use crate::error::{Error, Result};
use crate::workspace::{TreeEntryKind, walk_tree};

/// Image format family, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// Classify a path by the suffix of its file name, ignoring case. A
    /// name that is only the suffix, such as `.png`, still counts.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".jpg") || name.ends_with(".jpeg") {
            Some(Self::Jpeg)
        } else if name.ends_with(".png") {
            Some(Self::Png)
        } else {
            None
        }
    }
}

/// True for `.png`, `.jpg` and `.jpeg` files in any letter case.
pub fn is_image_path(path: &Path) -> bool {
    ImageKind::from_path(path).is_some()
}

/// An encoder the transcoder can apply to a decoded image.
pub trait ImageCodec: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Encode `image` into a complete file.
    fn encode(&self, image: &DynamicImage) -> anyhow::Result<Vec<u8>>;
}

/// Result of rewriting one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutcome {
    pub path: PathBuf,
    pub codec: &'static str,
    pub size_before: u64,
    pub size_after: u64,
}

/// Chooses a codec per file and rewrites files in place.
#[derive(Clone)]
pub struct Transcoder {
    jpeg: Arc<dyn ImageCodec>,
    png: Arc<dyn ImageCodec>,
}

impl Transcoder {
    pub fn new(jpeg: Arc<dyn ImageCodec>, png: Arc<dyn ImageCodec>) -> Self {
        Self { jpeg, png }
    }

    pub fn from_config(config: &CompressConfig) -> Self {
        let jpeg: Arc<dyn ImageCodec> = Arc::new(JpegCodec::new(config.quality, config.optimize));
        let png: Arc<dyn ImageCodec> = match config.png_mode {
            PngMode::Jpeg => jpeg.clone(),
            PngMode::Palette => Arc::new(PaletteCodec::default()),
        };
        Self::new(jpeg, png)
    }

    pub fn codec_for(&self, path: &Path) -> Option<&dyn ImageCodec> {
        match ImageKind::from_path(path)? {
            ImageKind::Jpeg => Some(self.jpeg.as_ref()),
            ImageKind::Png => Some(self.png.as_ref()),
        }
    }

    /// Re-encode the image at `path` in place.
    ///
    /// Blocking: reads, decodes, encodes and writes synchronously. Content is
    /// sniffed, so a PNG saved under a `.jpg` name still decodes.
    pub fn transcode_file(&self, path: &Path) -> Result<TranscodeOutcome> {
        let codec = self.codec_for(path).ok_or_else(|| {
            Error::image_transcode(path, anyhow::anyhow!("not a PNG or JPEG file name"))
        })?;

        let original = std::fs::read(path).map_err(|e| Error::image_transcode(path, e))?;
        let image =
            image::load_from_memory(&original).map_err(|e| Error::image_transcode(path, e))?;
        let encoded = codec
            .encode(&image)
            .map_err(|e| Error::image_transcode(path, e))?;

        write_atomically(path, &encoded).map_err(|e| Error::image_transcode(path, e))?;

        debug!(
            image = %path.display(),
            codec = codec.name(),
            before = original.len(),
            after = encoded.len(),
            "image re-encoded"
        );

        Ok(TranscodeOutcome {
            path: path.to_path_buf(),
            codec: codec.name(),
            size_before: original.len() as u64,
            size_after: encoded.len() as u64,
        })
    }
}

/// Every image file below `root`, in walk order.
pub async fn find_images(root: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(walk_tree(root)
        .await?
        .into_iter()
        .filter(|entry| entry.kind == TreeEntryKind::File && is_image_path(&entry.relative))
        .map(|entry| root.join(entry.relative))
        .collect())
}

/// Replace `path` with `bytes` so readers see either the old or the new
/// content, never a partial file.
///
/// The data goes to a temporary file in the same directory and is renamed
/// over the target. An existing target's permissions are carried over.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".epubsqueeze-")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    match std::fs::metadata(path) {
        Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => set_default_permissions(tmp.as_file())?,
        Err(e) => return Err(e),
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_default_permissions(file: &std::fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_file: &std::fs::File) -> io::Result<()> {
    Ok(())
}
