use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Access, ArchiveEntry, ArchiveError, ArchiveReader, normalise_entry_name};

/// Forward-only reader over a RAR container (CBR).
///
/// `unrar` works against a path and streams entries in physical order, so no
/// handle is kept between calls: every [`entries`](ArchiveReader::entries) and
/// every [`open_entry`](ArchiveReader::open_entry) reopens the file and walks it
/// from the start. Each of those is counted in [`passes`](ArchiveReader::passes).
pub struct RarReader {
    path: PathBuf,
    passes: usize,
}

impl RarReader {
    /// Open a RAR container, checking its headers are readable.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        // Probe only: the listing handle is dropped straight away.
        unrar::Archive::new(path)
            .open_for_listing()
            .map_err(|e| ArchiveError::open(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            passes: 0,
        })
    }
}

impl ArchiveReader for RarReader {
    fn access(&self) -> Access {
        Access::ForwardOnly
    }

    fn label(&self) -> &Path {
        &self.path
    }

    fn passes(&self) -> usize {
        self.passes
    }

    fn entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        self.passes += 1;
        let listing = unrar::Archive::new(&self.path)
            .open_for_listing()
            .map_err(|e| ArchiveError::open(&self.path, e))?;

        let mut entries = Vec::new();
        for header in listing {
            let header = header.map_err(|e| ArchiveError::read(&self.path, e))?;
            if header.is_directory() {
                continue;
            }
            entries.push(ArchiveEntry {
                name: normalise_entry_name(&header.filename.to_string_lossy()),
                size: header.unpacked_size,
            });
        }
        Ok(entries)
    }

    fn open_entry(&mut self, name: &str) -> Result<Box<dyn Read + '_>, ArchiveError> {
        self.passes += 1;
        debug!(archive = %self.path.display(), entry = name, "streaming RAR to entry");

        let mut at_header = unrar::Archive::new(&self.path)
            .open_for_processing()
            .map_err(|e| ArchiveError::open(&self.path, e))?;

        loop {
            let at_file = match at_header.read_header() {
                Ok(Some(at_file)) => at_file,
                Ok(None) => return Err(ArchiveError::EntryNotFound(name.to_string())),
                Err(e) => return Err(ArchiveError::read(&self.path, e)),
            };

            let header = at_file.entry();
            let matches = !header.is_directory()
                && normalise_entry_name(&header.filename.to_string_lossy()) == name;

            if matches {
                let (data, _rest) = at_file
                    .read()
                    .map_err(|e| ArchiveError::read(&self.path, e))?;
                return Ok(Box::new(Cursor::new(data)));
            }

            at_header = at_file
                .skip()
                .map_err(|e| ArchiveError::read(&self.path, e))?;
        }
    }
}
