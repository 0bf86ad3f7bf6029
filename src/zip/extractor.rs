use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Upper bound on the buffer reserved ahead of decompression. The declared
/// size comes from the archive and may be anything up to `u64::MAX`.
const MAX_PREALLOC: u64 = 16 << 20;

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all files in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Decompress one entry into memory and verify its CRC-32.
    pub async fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        if entry.is_encrypted() {
            bail!("Entry {} is encrypted", entry.file_name);
        }

        let data_offset = self.parser.get_data_offset(entry).await?;
        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.parser.reader().read_exact_at(data_offset, &mut raw).await?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => {
                let capacity = entry.uncompressed_size.min(MAX_PREALLOC) as usize;
                let mut out = Vec::with_capacity(capacity);
                // One byte past the declared size is enough to detect a lie
                DeflateDecoder::new(raw.as_slice())
                    .take(entry.uncompressed_size.saturating_add(1))
                    .read_to_end(&mut out)
                    .with_context(|| format!("Corrupt DEFLATE stream in {}", entry.file_name))?;
                out
            }
            CompressionMethod::Unknown(method) => {
                bail!(
                    "Unsupported compression method {} for {} (only STORED and DEFLATE)",
                    method,
                    entry.file_name
                );
            }
        };

        if data.len() as u64 != entry.uncompressed_size {
            bail!(
                "Size mismatch for {}: expected {} bytes, got {}",
                entry.file_name,
                entry.uncompressed_size,
                data.len()
            );
        }

        let mut crc = Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            bail!(
                "CRC mismatch for {}: expected {:08x}, got {:08x}",
                entry.file_name,
                entry.crc32,
                crc.sum()
            );
        }

        Ok(data)
    }

    /// Extract file to disk
    pub async fn extract_to_file(&self, entry: &ZipFileEntry, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = self.extract_to_memory(entry).await?;

        let mut file = fs::File::create(output_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        Ok(())
    }

    /// Extract every entry under `dest`, recreating the archive's layout.
    ///
    /// Returns the number of regular files written.
    pub async fn extract_all(&self, dest: &Path) -> Result<usize> {
        fs::create_dir_all(dest).await?;

        let entries = self.list_files().await?;
        let mut written = 0;

        for entry in &entries {
            let relative = sanitize_entry_name(&entry.file_name)?;
            let output_path = dest.join(&relative);

            if entry.is_directory {
                fs::create_dir_all(&output_path).await?;
                continue;
            }

            debug!(entry = %entry.file_name, size = entry.uncompressed_size, "extracting");
            self.extract_to_file(entry, &output_path).await?;
            written += 1;
        }

        Ok(written)
    }
}

/// Map an archive entry name onto a relative path that stays inside the
/// extraction root.
///
/// Both `/` and `\` separate components. Empty and `.` components are
/// dropped; `..`, absolute names and drive prefixes are refused.
pub fn sanitize_entry_name(name: &str) -> Result<PathBuf> {
    if name.starts_with('/') || name.starts_with('\\') {
        bail!("Refusing absolute entry name: {}", name);
    }

    let mut path = PathBuf::new();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => bail!("Refusing entry name that leaves the archive root: {}", name),
            _ if part.contains(':') => bail!("Refusing entry name with a drive prefix: {}", name),
            _ => {}
        }
        // Anything the platform still reads as non-normal is refused
        if !matches!(Path::new(part).components().next(), Some(Component::Normal(_))) {
            bail!("Refusing entry name component {:?} in {}", part, name);
        }
        path.push(part);
    }

    if path.as_os_str().is_empty() {
        bail!("Entry name {:?} has no path components", name);
    }
    Ok(path)
}
