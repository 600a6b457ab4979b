use std::path::{Path, PathBuf};

use tracing::warn;

/// Pick a free destination for a file headed to `target`.
///
/// `target` is used as is when it does not exist or already is `current`
/// (the file being moved). Otherwise ` (2)`, ` (3)`, ... is inserted before
/// the extension, trying at most `max_attempts` names. When every name is
/// taken the colliding `target` is returned.
pub fn resolve_conflict(target: &Path, current: Option<&Path>, max_attempts: u32) -> PathBuf {
    if is_free(target, current) {
        return target.to_path_buf();
    }

    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = target.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 2..max_attempts.saturating_add(2) {
        let name = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = target.with_file_name(name);
        if is_free(&candidate, current) {
            return candidate;
        }
    }

    warn!(target = %target.display(), max_attempts, "no free name found, using colliding path");
    target.to_path_buf()
}

fn is_free(candidate: &Path, current: Option<&Path>) -> bool {
    if !candidate.exists() {
        return true;
    }
    current.is_some_and(|current| same_file(candidate, current))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
