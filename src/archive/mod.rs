//! Uniform access to the two container kinds the library ingests.
//!
//! Zip-based containers (EPUB, CBZ) carry a central directory, so any entry
//! can be opened by name, in any order, as often as needed. RAR containers
//! (CBR) can only be streamed front to back: to read an entry discovered
//! during an earlier pass the archive is reopened and streamed again until
//! the name comes up. Fetching "the Nth entry in sorted order" therefore costs
//! one pass over a zip and two full passes over a RAR. [`ArchiveReader::access`]
//! and [`ArchiveReader::passes`] expose that difference to callers.

mod rar_reader;
mod zip_reader;

use std::io::Read;
use std::path::{Path, PathBuf};

pub use self::rar_reader::RarReader;
pub use self::zip_reader::ZipReader;

/// A single file stored inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name with `/` separators, as stored in the container.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

/// How entries of a container can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Random access by name through an index (zip).
    Seekable,
    /// Single forward pass per open handle (RAR).
    ForwardOnly,
}

/// Capability set shared by every container reader.
///
/// Handles are released when the reader is dropped, on success and error
/// paths alike.
pub trait ArchiveReader {
    fn access(&self) -> Access;

    /// Path (or label, for in-memory containers) used in error messages.
    fn label(&self) -> &Path;

    /// Number of full scans over the container performed so far.
    fn passes(&self) -> usize;

    /// Enumerate file entries (directories are skipped) in physical order.
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError>;

    /// Open a named entry for sequential reading.
    fn open_entry(&mut self, name: &str) -> Result<Box<dyn Read + '_>, ArchiveError>;

    /// Read a named entry fully into memory.
    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let label = self.label().to_path_buf();
        let mut entry = self.open_entry(name)?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| ArchiveError::read(&label, e))?;
        Ok(data)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("cannot open archive {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("read error in archive {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("entry not found in archive: {0}")]
    EntryNotFound(String),
}

impl ArchiveError {
    pub(crate) fn open(path: &Path, reason: impl ToString) -> Self {
        ArchiveError::Open {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn read(path: &Path, reason: impl ToString) -> Self {
        ArchiveError::Read {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Normalise a stored entry name to `/` separators.
pub(crate) fn normalise_entry_name(raw: &str) -> String {
    raw.replace('\\', "/")
}

/// Base name of an entry (last path component).
pub fn entry_base_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}
