use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use epubsqueeze::{
    CompressConfig, EpubCompressor, Error, InputSelection, PngMode, Quality, RunOutcome,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const STYLESHEET: &[u8] = b"body { margin: 0 auto; font-family: serif; }\n";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self, quality: i64) -> CompressConfig {
        CompressConfig::new(Quality::new(quality).unwrap())
            .with_output_dir(self.path("compressed"))
            .with_work_dir(self.path("work"))
    }

    /// Working directories left under the configured parent.
    fn leftover_workspaces(&self) -> usize {
        match std::fs::read_dir(self.path("work")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

fn textured(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, ((x * y) % 256) as u8])
    })
}

fn encode(image: RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut out), format)
        .unwrap();
    out
}

/// Build an EPUB-shaped archive with an independent ZIP implementation.
fn write_epub(path: &Path, files: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    for (name, data) in files {
        zip.start_file(*name, deflated).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Every regular file in the archive with its contents.
fn read_files(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut files = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        if entry.is_dir() {
            continue;
        }
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        files.insert(entry.name().to_string(), data);
    }
    files
}

/// Directory entries of the archive, in archive order.
fn read_dirs(path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut dirs = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).unwrap();
        if entry.is_dir() {
            dirs.push(entry.name().to_string());
        }
    }
    dirs
}

#[tokio::test]
async fn book_with_cover_and_stylesheet() {
    let fx = Fixture::new();
    let cover = encode(textured(120, 160), ImageFormat::Jpeg);
    let input = fx.path("book.epub");
    write_epub(
        &input,
        &[
            ("META-INF/container.xml", b"<container/>".as_slice()),
            ("OEBPS/cover.jpg", cover.as_slice()),
            ("OEBPS/stylesheet.css", STYLESHEET),
        ],
    );

    let result = EpubCompressor::new(fx.config(50))
        .compress(&input)
        .await
        .unwrap();

    let output = fx.path("compressed/book.epub");
    assert_eq!(result.file_name, "book.epub");
    assert_eq!(result.size_before, std::fs::metadata(&input).unwrap().len());
    assert_eq!(result.size_after, std::fs::metadata(&output).unwrap().len());

    let files = read_files(&output);
    assert_eq!(
        files.keys().map(String::as_str).collect::<Vec<_>>(),
        ["META-INF/container.xml", "OEBPS/cover.jpg", "OEBPS/stylesheet.css", "mimetype"]
    );
    assert_eq!(
        files.keys().collect::<Vec<_>>(),
        read_files(&input).keys().collect::<Vec<_>>()
    );
    // Directories implicit in the input get explicit entries
    assert!(read_dirs(&input).is_empty());
    assert_eq!(read_dirs(&output), ["META-INF/", "OEBPS/"]);
    assert_eq!(files["OEBPS/stylesheet.css"], STYLESHEET);
    assert_eq!(files["mimetype"], b"application/epub+zip");
    assert_eq!(image::guess_format(&files["OEBPS/cover.jpg"]).unwrap(), ImageFormat::Jpeg);
    assert!(image::load_from_memory(&files["OEBPS/cover.jpg"]).is_ok());

    assert_eq!(fx.leftover_workspaces(), 0);
    // The input is never modified
    assert_eq!(read_files(&input)["OEBPS/cover.jpg"], cover);
}

#[tokio::test]
async fn png_keeps_its_name_in_jpeg_mode() {
    let fx = Fixture::new();
    let input = fx.path("figures.epub");
    let figure = encode(textured(64, 64), ImageFormat::Png);
    write_epub(&input, &[("OEBPS/images/figure.png", figure.as_slice())]);

    EpubCompressor::new(fx.config(60)).compress(&input).await.unwrap();

    let files = read_files(&fx.path("compressed/figures.epub"));
    let data = &files["OEBPS/images/figure.png"];
    assert_eq!(image::guess_format(data).unwrap(), ImageFormat::Jpeg);
}

#[tokio::test]
async fn palette_mode_keeps_png_with_few_colors() {
    let fx = Fixture::new();
    let input = fx.path("plates.epub");
    let plate = encode(textured(96, 96), ImageFormat::Png);
    write_epub(&input, &[("OEBPS/plate.PNG", plate.as_slice())]);

    let config = fx.config(60).with_png_mode(PngMode::Palette);
    EpubCompressor::new(config).compress(&input).await.unwrap();

    let files = read_files(&fx.path("compressed/plates.epub"));
    let data = &files["OEBPS/plate.PNG"];
    assert_eq!(image::guess_format(data).unwrap(), ImageFormat::Png);

    let decoded = image::load_from_memory(data).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (96, 96));
    let mut colors: Vec<_> = decoded.pixels().map(|p| p.0).collect();
    colors.sort_unstable();
    colors.dedup();
    assert!(colors.len() <= 256);
}

#[tokio::test]
async fn corrupt_image_is_carried_over_unchanged() {
    let fx = Fixture::new();
    let input = fx.path("damaged.epub");
    let good = encode(textured(48, 48), ImageFormat::Jpeg);
    write_epub(
        &input,
        &[
            ("OEBPS/bad.jpg", b"not really a jpeg".as_slice()),
            ("OEBPS/good.jpg", good.as_slice()),
            ("OEBPS/text.xhtml", b"<html/>".as_slice()),
        ],
    );

    EpubCompressor::new(fx.config(40)).compress(&input).await.unwrap();

    let files = read_files(&fx.path("compressed/damaged.epub"));
    assert_eq!(files["OEBPS/bad.jpg"], b"not really a jpeg");
    assert_eq!(files["OEBPS/text.xhtml"], b"<html/>");
    assert!(image::load_from_memory(&files["OEBPS/good.jpg"]).is_ok());
}

#[tokio::test]
async fn broken_archive_is_a_read_error() {
    let fx = Fixture::new();
    let input = fx.path("broken.epub");
    std::fs::write(&input, b"these bytes are not a zip container").unwrap();

    let err = EpubCompressor::new(fx.config(70))
        .compress(&input)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ArchiveRead { .. }), "{err}");
    assert!(!fx.path("compressed/broken.epub").exists());
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[test]
fn out_of_range_quality_is_rejected() {
    let err = Quality::new(150).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("150"));
}

#[tokio::test]
async fn batch_without_archives_finds_nothing() {
    let fx = Fixture::new();
    std::fs::write(fx.path("notes.txt"), b"hello").unwrap();

    let outcome = EpubCompressor::new(fx.config(70))
        .run(&InputSelection::Directory(fx.dir.path().to_path_buf()))
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::NothingFound));
    assert!(!fx.path("compressed").exists());
    assert!(!fx.path("work").exists());
}

#[tokio::test]
async fn failed_archive_is_left_out_of_the_report() {
    let fx = Fixture::new();
    std::fs::write(fx.path("a-broken.epub"), b"garbage").unwrap();
    write_epub(&fx.path("b-good.epub"), &[("OEBPS/style.css", STYLESHEET)]);

    let outcome = EpubCompressor::new(fx.config(70))
        .run(&InputSelection::Directory(fx.dir.path().to_path_buf()))
        .await
        .unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed batch");
    };

    let names: Vec<_> = summary.report.results().iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, ["b-good.epub"]);
    assert!(summary.has_failures());
    assert_eq!(summary.failures[0].0, fx.path("a-broken.epub"));
    assert!(fx.path("compressed/b-good.epub").exists());
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[tokio::test]
async fn single_input_must_exist_and_be_an_epub() {
    let fx = Fixture::new();
    let compressor = EpubCompressor::new(fx.config(70));

    let missing = InputSelection::Single(fx.path("missing.epub"));
    assert!(compressor.run(&missing).await.unwrap_err().is_validation());

    std::fs::write(fx.path("book.pdf"), b"%PDF-1.4").unwrap();
    let wrong = InputSelection::Single(fx.path("book.pdf"));
    assert!(compressor.run(&wrong).await.unwrap_err().is_validation());

    assert!(!fx.path("compressed").exists());
}

#[tokio::test]
async fn rerun_overwrites_the_previous_output() {
    let fx = Fixture::new();
    let input = fx.path("Book.EPUB");
    write_epub(&input, &[("chapter.xhtml", b"<p>one</p>".as_slice())]);

    let compressor = EpubCompressor::new(fx.config(70));
    compressor.compress(&input).await.unwrap();

    write_epub(&input, &[("chapter.xhtml", b"<p>two</p>".as_slice())]);
    compressor.compress(&input).await.unwrap();

    let files = read_files(&fx.path("compressed/Book.EPUB"));
    assert_eq!(files["chapter.xhtml"], b"<p>two</p>");
}

#[tokio::test]
async fn failed_relocation_still_cleans_up() {
    let fx = Fixture::new();
    let input = fx.path("book.epub");
    write_epub(&input, &[("OEBPS/style.css", STYLESHEET)]);
    // A non-empty directory in the way cannot be replaced by a file
    std::fs::create_dir_all(fx.path("compressed/book.epub/occupied")).unwrap();

    let err = EpubCompressor::new(fx.config(70))
        .compress(&input)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Relocation { .. }), "{err}");
    assert!(fx.path("compressed/book.epub").is_dir());
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[tokio::test]
async fn escaping_entry_after_valid_ones_still_cleans_up() {
    let fx = Fixture::new();
    let input = fx.path("sneaky.epub");
    write_epub(
        &input,
        &[
            ("OEBPS/chapter.xhtml", b"<html/>".as_slice()),
            ("OEBPS/../../escaped.css", STYLESHEET),
        ],
    );

    let err = EpubCompressor::new(fx.config(70))
        .compress(&input)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ArchiveRead { .. }), "{err}");
    assert!(!fx.path("compressed/sneaky.epub").exists());
    assert!(!fx.path("escaped.css").exists());
    assert_eq!(fx.leftover_workspaces(), 0);
}
