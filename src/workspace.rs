//! Per-archive working directory.
//!
//! Each pipeline run owns one uniquely named directory under a configurable
//! parent. It is backed by [`tempfile::TempDir`], so it disappears when the
//! [`Workspace`] is dropped on any exit path, including early returns and
//! errors. [`Workspace::close`] does the same eagerly and reports failures.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Prefix of every working directory name.
pub const WORKSPACE_PREFIX: &str = "epubsqueeze-";

const CONTENTS_DIR: &str = "contents";

/// Scoped working directory for one archive.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
}

impl Workspace {
    /// Create a fresh, uniquely named working directory inside `parent`,
    /// creating `parent` first when needed.
    pub fn create(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent).map_err(|source| Error::Workspace {
            path: parent.to_path_buf(),
            source,
        })?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(parent)
            .map_err(|source| Error::Workspace {
                path: parent.to_path_buf(),
                source,
            })?;
        let root = dir.path().to_path_buf();
        debug!(workspace = %root.display(), "working directory created");

        Ok(Self {
            dir: Some(dir),
            root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory the archive is unpacked into.
    pub fn contents_dir(&self) -> PathBuf {
        self.root.join(CONTENTS_DIR)
    }

    /// Where the rebuilt archive is staged before relocation. Lives beside
    /// the contents so it is never packed into itself.
    pub fn staging_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Remove the working directory now. Removing a directory that is
    /// already gone is not an error.
    pub fn close(mut self) -> Result<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };

        match dir.close() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(Error::Workspace {
                    path: self.root.clone(),
                    source,
                });
            }
        }
        debug!(workspace = %self.root.display(), "working directory removed");
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(
                        workspace = %self.root.display(),
                        error = %e,
                        "failed to remove working directory"
                    );
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEntryKind {
    File,
    Directory,
}

/// One node found by [`walk_tree`].
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Path relative to the walked root
    pub relative: PathBuf,
    /// `relative` with `/` separators, as stored in an archive
    pub name: String,
    pub kind: TreeEntryKind,
    pub modified: SystemTime,
}

/// Walk `root` recursively and return every file and directory below it.
///
/// Siblings are visited in name order and a directory always precedes its
/// contents. Symlinks and other special files are skipped.
pub async fn walk_tree(root: &Path) -> io::Result<Vec<TreeEntry>> {
    let mut found = Vec::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(dir) = pending.pop() {
        let mut children = Vec::new();
        let mut read_dir = fs::read_dir(root.join(&dir)).await?;
        while let Some(child) = read_dir.next_entry().await? {
            children.push(child);
        }
        children.sort_by_key(|child| child.file_name());

        let mut subdirs = Vec::new();
        for child in children {
            // DirEntry metadata does not follow symlinks
            let meta = child.metadata().await?;
            let kind = if meta.is_dir() {
                TreeEntryKind::Directory
            } else if meta.is_file() {
                TreeEntryKind::File
            } else {
                continue;
            };

            let relative = dir.join(child.file_name());
            if kind == TreeEntryKind::Directory {
                subdirs.push(relative.clone());
            }
            found.push(TreeEntry {
                name: archive_name(&relative),
                relative,
                kind,
                modified: meta.modified().unwrap_or(UNIX_EPOCH),
            });
        }

        pending.extend(subdirs.into_iter().rev());
    }

    Ok(found)
}

fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let ws = Workspace::create(parent.path()).unwrap();
            std::fs::create_dir_all(ws.contents_dir()).unwrap();
            std::fs::write(ws.contents_dir().join("x"), b"x").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn close_is_idempotent_when_directory_vanished() {
        let parent = tempfile::tempdir().unwrap();
        let ws = Workspace::create(parent.path()).unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();
        ws.close().unwrap();
    }

    #[test]
    fn every_workspace_gets_a_distinct_name() {
        let parent = tempfile::tempdir().unwrap();
        let a = Workspace::create(parent.path()).unwrap();
        let b = Workspace::create(parent.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(
            a.path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(WORKSPACE_PREFIX)
        );
    }

    #[tokio::test]
    async fn walk_lists_directories_before_their_contents() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("OEBPS/images")).unwrap();
        std::fs::create_dir_all(root.path().join("META-INF")).unwrap();
        std::fs::write(root.path().join("mimetype"), b"application/epub+zip").unwrap();
        std::fs::write(root.path().join("META-INF/container.xml"), b"<c/>").unwrap();
        std::fs::write(root.path().join("OEBPS/images/cover.jpg"), b"jpg").unwrap();

        let tree = walk_tree(root.path()).await.unwrap();
        let names: Vec<_> = tree.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "META-INF",
                "OEBPS",
                "mimetype",
                "META-INF/container.xml",
                "OEBPS/images",
                "OEBPS/images/cover.jpg",
            ]
        );
        assert_eq!(tree[0].kind, TreeEntryKind::Directory);
        assert_eq!(tree[2].kind, TreeEntryKind::File);
    }
}
