//! Archive pipeline: unpack, transcode, rebuild, relocate, clean up.
//!
//! ```no_run
//! use epubsqueeze::{CompressConfig, EpubCompressor, Quality};
//!
//! # async fn demo() -> epubsqueeze::Result<()> {
//! let config = CompressConfig::new(Quality::new(70)?).with_output_dir("compressed");
//! let result = EpubCompressor::new(config).compress("book.epub".as_ref()).await?;
//! println!("{}: {:.2}% smaller", result.file_name, result.ratio);
//! # Ok(())
//! # }
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{error, info, warn};

use crate::config::CompressConfig;
use crate::error::{Error, Result};
use crate::io::LocalFileReader;
use crate::report::{BatchReport, CompressionResult};
use crate::transcode::{Transcoder, find_images, write_atomically};
use crate::workspace::Workspace;
use crate::zip::{ZipExtractor, write_directory};

/// Image counters for one archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeStats {
    pub transcoded: usize,
    pub skipped: usize,
}

/// Runs the whole pipeline for one archive at a time.
pub struct EpubCompressor {
    config: CompressConfig,
    transcoder: Transcoder,
}

impl EpubCompressor {
    pub fn new(config: CompressConfig) -> Self {
        let transcoder = Transcoder::from_config(&config);
        Self { config, transcoder }
    }

    /// Compress one archive into `output_dir/<same file name>`.
    ///
    /// The working directory is removed before this returns, whatever the
    /// outcome.
    pub async fn compress(&self, epub: &Path) -> Result<CompressionResult> {
        let file_name = epub
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::validation(format!("{} has no file name", epub.display())))?;

        let size_before = fs::metadata(epub)
            .await
            .map_err(|e| Error::archive_read(epub, e))?
            .len();

        info!(archive = %epub.display(), "compressing");
        let workspace = Workspace::create(&self.config.work_dir)?;
        let outcome = self.process(&workspace, epub, &file_name).await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(
                workspace = %workspace_path.display(),
                error = %e,
                "working directory left behind"
            );
        }

        let size_after = outcome?;
        let result = CompressionResult::new(file_name, size_before, size_after);
        info!(
            archive = %epub.display(),
            before = result.size_before,
            after = result.size_after,
            ratio = %format!("{:.2}%", result.ratio),
            "done"
        );
        Ok(result)
    }

    /// Steps that need the workspace; returns the size of the output file.
    async fn process(&self, workspace: &Workspace, epub: &Path, file_name: &str) -> Result<u64> {
        let contents = workspace.contents_dir();

        let reader = LocalFileReader::new(epub).map_err(|e| Error::archive_read(epub, e))?;
        let extractor = ZipExtractor::new(Arc::new(reader));
        let extracted = extractor
            .extract_all(&contents)
            .await
            .map_err(|e| Error::archive_read(epub, e))?;

        let images = find_images(&contents)
            .await
            .map_err(|source| Error::Workspace {
                path: contents.clone(),
                source,
            })?;
        info!(files = extracted, images = images.len(), "archive unpacked");

        let stats = self.transcode_all(&images).await;
        if stats.skipped > 0 {
            warn!(
                skipped = stats.skipped,
                transcoded = stats.transcoded,
                "some images were left as they were"
            );
        }

        let staged = workspace.staging_path(file_name);
        write_directory(&contents, &staged)
            .await
            .map_err(|e| Error::archive_write(&staged, e))?;

        let dest = relocate(&staged, &self.config.output_dir, file_name).await?;
        let size_after = fs::metadata(&dest)
            .await
            .map_err(|source| Error::Relocation {
                from: staged.clone(),
                to: dest.clone(),
                source,
            })?
            .len();
        Ok(size_after)
    }

    /// Re-encode each image in turn on the blocking pool. Failures are
    /// logged and counted, never propagated.
    pub async fn transcode_all(&self, images: &[PathBuf]) -> TranscodeStats {
        let mut stats = TranscodeStats::default();

        for image in images {
            let transcoder = self.transcoder.clone();
            let path = image.clone();
            let joined =
                tokio::task::spawn_blocking(move || transcoder.transcode_file(&path)).await;

            match joined {
                Ok(Ok(_)) => stats.transcoded += 1,
                Ok(Err(e)) => {
                    warn!(error = %e, "image skipped");
                    stats.skipped += 1;
                }
                Err(e) => {
                    warn!(image = %image.display(), error = %e, "image task failed");
                    stats.skipped += 1;
                }
            }
        }

        stats
    }

    /// Compress every input in order. A failed archive is logged and kept
    /// out of the report; the remaining inputs still run.
    pub async fn compress_all(&self, inputs: &[PathBuf]) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for input in inputs {
            match self.compress(input).await {
                Ok(result) => summary.report.push(result),
                Err(e) => {
                    error!(archive = %input.display(), error = %e, "archive failed");
                    summary.failures.push((input.clone(), e));
                }
            }
        }

        summary
    }

    /// Resolve `selection` and run the batch.
    pub async fn run(&self, selection: &InputSelection) -> Result<RunOutcome> {
        let inputs = selection.resolve().await?;
        if inputs.is_empty() {
            info!("no EPUB files found");
            return Ok(RunOutcome::NothingFound);
        }

        info!(count = inputs.len(), "EPUB files selected");
        Ok(RunOutcome::Completed(self.compress_all(&inputs).await))
    }
}

/// What one batch produced.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Successful archives, in processing order
    pub report: BatchReport,
    /// Archives that failed, with the reason
    pub failures: Vec<(PathBuf, Error)>,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Directory mode found no archives; nothing was processed
    NothingFound,
    Completed(BatchSummary),
}

/// Which archives a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSelection {
    /// Exactly this archive
    Single(PathBuf),
    /// Every `*.epub` directly inside this directory
    Directory(PathBuf),
}

impl InputSelection {
    /// The archives to process, validated and fixed up front.
    pub async fn resolve(&self) -> Result<Vec<PathBuf>> {
        match self {
            InputSelection::Single(path) => {
                validate_input(path).await?;
                Ok(vec![path.clone()])
            }
            InputSelection::Directory(dir) => discover_epubs(dir).await.map_err(|source| {
                Error::validation(format!("cannot list {}: {}", dir.display(), source))
            }),
        }
    }
}

/// True when the file name ends in `.epub`, ignoring case.
pub fn is_epub_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"))
}

/// Check that a single input exists and is named like an EPUB.
pub async fn validate_input(path: &Path) -> Result<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => {
            return Err(Error::validation(format!(
                "file {} does not exist",
                path.display()
            )));
        }
    }

    if !is_epub_path(path) {
        return Err(Error::validation(format!(
            "{} is not an EPUB file",
            path.display()
        )));
    }
    Ok(())
}

/// Regular files directly inside `dir` whose names end in `.epub`,
/// sorted by name.
pub async fn discover_epubs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if is_epub_path(&path) && fs::metadata(&path).await?.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Move a built archive to `output_dir/file_name`, creating the directory
/// and replacing any file already there.
///
/// A plain rename is used when possible. Across filesystems the archive is
/// copied into the output directory and renamed into place from there.
pub async fn relocate(staged: &Path, output_dir: &Path, file_name: &str) -> Result<PathBuf> {
    let dest = output_dir.join(file_name);
    let relocation_error = |source: io::Error| Error::Relocation {
        from: staged.to_path_buf(),
        to: dest.clone(),
        source,
    };

    fs::create_dir_all(output_dir).await.map_err(relocation_error)?;

    match fs::rename(staged, &dest).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_into_place(staged, &dest).await.map_err(relocation_error)?;
        }
        Err(e) => return Err(relocation_error(e)),
    }

    Ok(dest)
}

/// Move `staged` to `dest` without `rename`: the bytes are written to a
/// temporary file beside `dest` and persisted over it, then `staged` is
/// removed.
async fn copy_into_place(staged: &Path, dest: &Path) -> io::Result<()> {
    let bytes = fs::read(staged).await?;
    let target = dest.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomically(&target, &bytes))
        .await
        .map_err(io::Error::other)??;
    fs::remove_file(staged).await
}
