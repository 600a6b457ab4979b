use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use zip::result::ZipError;

use super::{Access, ArchiveEntry, ArchiveError, ArchiveReader, normalise_entry_name};

/// Seekable reader over a zip container (EPUB, CBZ).
pub struct ZipReader<R: Read + Seek> {
    archive: zip::ZipArchive<R>,
    label: PathBuf,
}

impl ZipReader<BufReader<File>> {
    /// Open a zip container from disk.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path).map_err(|e| ArchiveError::open(path, e))?;
        Self::from_reader(BufReader::new(file), path)
    }
}

impl<R: Read + Seek> ZipReader<R> {
    /// Wrap any `Read + Seek` source; `label` is only used in error messages.
    pub fn from_reader(reader: R, label: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let label = label.into();
        let archive = zip::ZipArchive::new(reader).map_err(|e| ArchiveError::open(&label, e))?;
        Ok(Self { archive, label })
    }
}

impl<R: Read + Seek> ArchiveReader for ZipReader<R> {
    fn access(&self) -> Access {
        Access::Seekable
    }

    fn label(&self) -> &Path {
        &self.label
    }

    fn passes(&self) -> usize {
        // The central directory is read once, when the archive is opened.
        1
    }

    fn entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for i in 0..self.archive.len() {
            let entry = self
                .archive
                .by_index(i)
                .map_err(|e| ArchiveError::read(&self.label, e))?;
            if entry.is_dir() {
                continue;
            }
            entries.push(ArchiveEntry {
                name: normalise_entry_name(entry.name()),
                size: entry.size(),
            });
        }
        Ok(entries)
    }

    fn open_entry(&mut self, name: &str) -> Result<Box<dyn Read + '_>, ArchiveError> {
        match self.archive.by_name(name) {
            Ok(entry) => Ok(Box::new(entry)),
            Err(ZipError::FileNotFound) => Err(ArchiveError::EntryNotFound(name.to_string())),
            Err(e) => Err(ArchiveError::read(&self.label, e)),
        }
    }
}
