use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

/// Move `src` to `dst`, creating parent directories.
///
/// Tries a rename first. When that fails (typically across filesystems) the
/// file is copied and the source removed; a partially written destination
/// is deleted if the copy fails.
pub fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if src == dst {
        return Ok(());
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(src = %src.display(), dst = %dst.display(), error = %e, "rename failed, copying");
            copy_then_remove(src, dst)
        }
    }
}

fn copy_then_remove(src: &Path, dst: &Path) -> io::Result<()> {
    if let Err(e) = fs::copy(src, dst) {
        if let Err(cleanup) = fs::remove_file(dst)
            && cleanup.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %dst.display(), error = %cleanup, "failed to remove partial copy");
        }
        return Err(e);
    }
    fs::remove_file(src)
}

/// Remove empty directories from `start` upwards. Stops at the first
/// non-empty directory, at `root` (never removed) or at anything outside it.
pub fn cleanup_empty_dirs(start: &Path, root: &Path) {
    let mut dir = start;
    while dir.starts_with(root) && dir != root {
        match fs::read_dir(dir) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    break;
                }
            }
            Err(_) => break,
        }
        if let Err(e) = fs::remove_dir(dir) {
            debug!(dir = %dir.display(), error = %e, "stopping empty-dir cleanup");
            break;
        }
        debug!(dir = %dir.display(), "removed empty directory");
        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }
}
