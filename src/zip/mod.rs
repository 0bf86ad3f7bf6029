//! ZIP archive reading and writing.
//!
//! EPUB books are plain ZIP containers, so this module is the whole
//! container layer of the tool.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`extractor`]: Decompression and extraction to disk
//! - [`writer`]: Building a new archive from a directory tree
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! ## Supported Features
//!
//! - Reading standard and ZIP64 archives
//! - STORED and DEFLATE entries, CRC-32 verified on extraction
//! - Writing standard archives with DEFLATE entries
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods
//! - The writer does not emit ZIP64 records

mod extractor;
mod parser;
mod structures;
mod writer;

pub use extractor::{ZipExtractor, sanitize_entry_name};
pub use parser::ZipParser;
pub use structures::*;
pub use writer::{ZipWriter, write_directory};
