//! Canonical on-disk layout of the library.

mod conflict;
mod fsops;
mod path;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

pub use self::conflict::resolve_conflict;
pub use self::fsops::{cleanup_empty_dirs, move_file};
pub use self::path::{
    MAX_COMPONENT_LEN, UNKNOWN_AUTHOR_DIR, UNKNOWN_TITLE, canonical_path, sanitize_component,
};

use crate::config::OrganizeConfig;
use crate::formats::{CoverImage, Metadata};

/// Where a book (and its cover) ended up after reorganizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReorganizedPaths {
    pub book_path: PathBuf,
    /// Unchanged when the cover could not be moved.
    pub cover_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum OrganizeError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid library root {0}")]
    InvalidRoot(PathBuf),
}

impl OrganizeError {
    fn io(path: &Path, source: io::Error) -> Self {
        OrganizeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Places files under `<root>/<Author>/[<Series>/]<Title>.<ext>`.
///
/// All operations are blocking; async callers run them on
/// `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct Organizer {
    root: PathBuf,
    max_attempts: u32,
    max_name_len: usize,
}

impl Organizer {
    /// Create the root if needed; it must end up a directory.
    pub fn new(root: &Path, config: &OrganizeConfig) -> Result<Self, OrganizeError> {
        fs::create_dir_all(root).map_err(|e| OrganizeError::io(root, e))?;
        let root = root
            .canonicalize()
            .map_err(|_| OrganizeError::InvalidRoot(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(OrganizeError::InvalidRoot(root));
        }
        Ok(Self {
            root,
            max_attempts: config.max_conflict_attempts,
            max_name_len: config.max_name_len.max(1),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn canonical_path(&self, meta: &Metadata, ext: &str) -> PathBuf {
        canonical_path(&self.root, meta, ext, self.max_name_len)
    }

    /// Move a newly ingested file to its canonical location.
    pub fn place_new(
        &self,
        source: &Path,
        meta: &Metadata,
        ext: &str,
    ) -> Result<PathBuf, OrganizeError> {
        let target = self.canonical_path(meta, ext);
        let target = resolve_conflict(&target, Some(source), self.max_attempts);
        move_file(source, &target).map_err(|e| OrganizeError::io(&target, e))?;
        info!(from = %source.display(), to = %target.display(), "placed book");
        Ok(target)
    }

    /// Write cover bytes next to `book_path`, named after the book.
    pub fn place_cover(
        &self,
        book_path: &Path,
        cover: &CoverImage,
    ) -> Result<PathBuf, OrganizeError> {
        let target = cover_target(book_path, &cover.extension);
        let target = resolve_conflict(&target, None, self.max_attempts);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .map_err(|e| OrganizeError::io(&target, e))?;
        if let Err(e) = file.write_all(&cover.data) {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&target)
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                warn!(path = %target.display(), error = %cleanup, "failed to remove partial cover");
            }
            return Err(OrganizeError::io(&target, e));
        }
        Ok(target)
    }

    /// Bring an existing book (and its cover) in line with `meta`.
    ///
    /// A failed book move is an error. A failed cover move is only logged:
    /// the cover keeps its old path. Directories emptied by the moves are
    /// removed up to the root.
    pub fn reorganize(
        &self,
        book_path: &Path,
        cover_path: Option<&Path>,
        meta: &Metadata,
    ) -> Result<ReorganizedPaths, OrganizeError> {
        let book_path = &book_path
            .canonicalize()
            .map_err(|e| OrganizeError::io(book_path, e))?;
        let ext = book_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = self.canonical_path(meta, &ext);
        let new_book = resolve_conflict(&target, Some(book_path), self.max_attempts);

        if new_book != *book_path {
            move_file(book_path, &new_book).map_err(|e| OrganizeError::io(book_path, e))?;
            info!(from = %book_path.display(), to = %new_book.display(), "moved book");
            self.cleanup_after(book_path);
        }

        let new_cover = cover_path.map(|cover| {
            let cover = cover.canonicalize().unwrap_or_else(|_| cover.to_path_buf());
            self.move_cover(&cover, &new_book)
        });
        Ok(ReorganizedPaths {
            book_path: new_book,
            cover_path: new_cover,
        })
    }

    /// Move a file placed by this organizer back to `previous`, pruning the
    /// directories it leaves empty.
    pub fn undo_move(&self, current: &Path, previous: &Path) -> Result<(), OrganizeError> {
        if current == previous {
            return Ok(());
        }
        move_file(current, previous).map_err(|e| OrganizeError::io(current, e))?;
        info!(from = %current.display(), to = %previous.display(), "moved file back");
        self.cleanup_after(current);
        Ok(())
    }

    /// Delete a file written by this organizer (such as a cover), pruning
    /// the directories it leaves empty. A missing file is not an error.
    pub fn discard(&self, path: &Path) -> Result<(), OrganizeError> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(OrganizeError::io(path, e)),
        }
        self.cleanup_after(path);
        Ok(())
    }

    fn move_cover(&self, cover: &Path, book_path: &Path) -> PathBuf {
        let ext = cover
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let target = cover_target(book_path, &ext);
        let target = resolve_conflict(&target, Some(cover), self.max_attempts);
        if target == cover {
            return target;
        }
        match move_file(cover, &target) {
            Ok(()) => {
                self.cleanup_after(cover);
                target
            }
            Err(e) => {
                warn!(cover = %cover.display(), target = %target.display(), error = %e, "cover move failed, keeping old path");
                cover.to_path_buf()
            }
        }
    }

    fn cleanup_after(&self, moved_from: &Path) {
        if let Some(dir) = moved_from.parent() {
            cleanup_empty_dirs(dir, &self.root);
        }
    }
}

/// `<book dir>/<book stem><ext>`; `ext` carries its leading dot.
fn cover_target(book_path: &Path, ext: &str) -> PathBuf {
    let stem = book_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    book_path.with_file_name(format!("{stem}{ext}"))
}
