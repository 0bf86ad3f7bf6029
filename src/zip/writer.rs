//! ZIP archive writer.
//!
//! Produces single-disk archives without ZIP64 records: every entry is a
//! Local File Header followed by its data, then the Central Directory and
//! the End of Central Directory record.

use flate2::Compression;
use flate2::Crc;
use flate2::write::DeflateEncoder;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use anyhow::{Context, Result, bail};

use super::structures::*;
use crate::workspace::{TreeEntryKind, walk_tree};

/// Most entries a classic End of Central Directory record can count.
const MAX_ENTRIES: usize = 0xFFFE;

/// Streaming ZIP writer over a local file.
pub struct ZipWriter {
    out: BufWriter<fs::File>,
    offset: u64,
    entries: Vec<ZipFileEntry>,
    names: HashSet<String>,
}

impl ZipWriter {
    /// Create (or truncate) the archive at `path`.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = fs::File::create(path)
            .await
            .with_context(|| format!("Cannot create {}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
            offset: 0,
            entries: Vec::new(),
            names: HashSet::new(),
        })
    }

    /// Add a directory entry. A trailing `/` is appended when missing.
    pub async fn add_directory(&mut self, name: &str, modified: DosDateTime) -> Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        self.push_entry(name, CompressionMethod::Stored, Vec::new(), 0, 0, modified)
            .await
    }

    /// Add a file entry, compressing `data` with DEFLATE.
    pub async fn add_file(&mut self, name: &str, data: &[u8], modified: DosDateTime) -> Result<()> {
        let mut crc = Crc::new();
        crc.update(data);

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;

        self.push_entry(
            name.to_string(),
            CompressionMethod::Deflate,
            compressed,
            data.len() as u64,
            crc.sum(),
            modified,
        )
        .await
    }

    async fn push_entry(
        &mut self,
        file_name: String,
        compression_method: CompressionMethod,
        payload: Vec<u8>,
        uncompressed_size: u64,
        crc32: u32,
        modified: DosDateTime,
    ) -> Result<()> {
        if self.entries.len() >= MAX_ENTRIES {
            bail!("Archive would need more than {} entries", MAX_ENTRIES);
        }
        if !self.names.insert(file_name.clone()) {
            bail!("Duplicate entry name: {}", file_name);
        }

        let flags = if file_name.is_ascii() { 0 } else { FLAG_UTF8 };
        let entry = ZipFileEntry {
            is_directory: file_name.ends_with('/'),
            file_name,
            flags,
            compression_method,
            compressed_size: payload.len() as u64,
            uncompressed_size,
            crc32,
            lfh_offset: self.offset,
            last_mod_time: modified.time,
            last_mod_date: modified.date,
        };

        let mut header = Vec::with_capacity(LFH_SIZE + entry.file_name.len());
        entry.write_local_header(&mut header)?;
        self.out.write_all(&header).await?;
        self.out.write_all(&payload).await?;
        self.offset += (header.len() + payload.len()) as u64;

        self.entries.push(entry);
        Ok(())
    }

    /// Write the Central Directory and EOCD, flush, and return the archive
    /// size in bytes.
    pub async fn finish(mut self) -> Result<u64> {
        let cd_offset = self.offset;
        let mut cd = Vec::new();
        for entry in &self.entries {
            entry.write_central_header(&mut cd)?;
        }

        let cd_size = cd.len() as u64;
        if cd_offset + cd_size >= u64::from(u32::MAX) {
            bail!("Archive exceeds 4 GiB, which needs ZIP64");
        }

        EndOfCentralDirectory::new(self.entries.len() as u16, cd_size as u32, cd_offset as u32)
            .write_to(&mut cd)?;

        self.out.write_all(&cd).await?;
        self.out.flush().await?;
        self.out.get_mut().sync_all().await?;

        Ok(cd_offset + cd.len() as u64)
    }
}

/// Pack the tree under `root` into a new archive at `dest`.
///
/// Entry names are the paths relative to `root` joined with `/`. Every
/// directory gets its own entry so empty directories survive. Returns the
/// number of entries written.
pub async fn write_directory(root: &Path, dest: &Path) -> Result<usize> {
    let tree = walk_tree(root)
        .await
        .with_context(|| format!("Cannot walk {}", root.display()))?;

    let mut writer = ZipWriter::create(dest).await?;
    for node in &tree {
        let modified = DosDateTime::from_system_time(node.modified);
        match node.kind {
            TreeEntryKind::Directory => writer.add_directory(&node.name, modified).await?,
            TreeEntryKind::File => {
                let data = fs::read(root.join(&node.relative))
                    .await
                    .with_context(|| format!("Cannot read {}", node.name))?;
                writer.add_file(&node.name, &data, modified).await?;
            }
        }
    }

    let size = writer.finish().await?;
    debug!(entries = tree.len(), bytes = size, archive = %dest.display(), "archive written");
    Ok(tree.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::LocalFileReader;
    use crate::zip::ZipExtractor;
    use std::sync::Arc;

    #[tokio::test]
    async fn written_archive_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.zip");

        let mut writer = ZipWriter::create(&path).await.unwrap();
        writer.add_directory("OEBPS", DosDateTime::MIN).await.unwrap();
        writer
            .add_file("OEBPS/chapter1.xhtml", b"<html>hello hello hello</html>", DosDateTime::MIN)
            .await
            .unwrap();
        writer.add_file("empty.txt", b"", DosDateTime::MIN).await.unwrap();
        let size = writer.finish().await.unwrap();
        assert_eq!(size, std::fs::metadata(&path).unwrap().len());

        let extractor = ZipExtractor::new(Arc::new(LocalFileReader::new(&path).unwrap()));
        let entries = extractor.list_files().await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["OEBPS/", "OEBPS/chapter1.xhtml", "empty.txt"]);
        assert!(entries[0].is_directory);

        let chapter = extractor.extract_to_memory(&entries[1]).await.unwrap();
        assert_eq!(chapter, b"<html>hello hello hello</html>");
        assert!(extractor.extract_to_memory(&entries[2]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ZipWriter::create(&dir.path().join("dup.zip")).await.unwrap();
        writer.add_file("a.txt", b"1", DosDateTime::MIN).await.unwrap();
        assert!(writer.add_file("a.txt", b"2", DosDateTime::MIN).await.is_err());
    }

    #[tokio::test]
    async fn non_ascii_names_set_the_utf8_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.zip");
        let mut writer = ZipWriter::create(&path).await.unwrap();
        writer.add_file("immagini/copertina-è.png", b"x", DosDateTime::MIN).await.unwrap();
        writer.finish().await.unwrap();

        let extractor = ZipExtractor::new(Arc::new(LocalFileReader::new(&path).unwrap()));
        let entries = extractor.list_files().await.unwrap();
        assert_eq!(entries[0].file_name, "immagini/copertina-è.png");
        assert_ne!(entries[0].flags & FLAG_UTF8, 0);
    }
}
