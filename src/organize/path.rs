use std::path::{Path, PathBuf};

use crate::formats::{Metadata, UNKNOWN_AUTHOR};

pub const UNKNOWN_AUTHOR_DIR: &str = "Unknown Author";
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const MAX_COMPONENT_LEN: usize = 200;

/// Make `raw` safe to use as a single path component.
///
/// Separators, `: * ? " < > |` and control characters become `_`; runs of
/// underscores and whitespace collapse to one space; leading and trailing
/// spaces and dots are trimmed; the result is cut to `max_len` characters.
/// Returns `fallback` when nothing is left.
pub fn sanitize_component(raw: &str, fallback: &str, max_len: usize) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    let mut in_gap = false;
    for c in replaced.chars() {
        if c == '_' || c.is_whitespace() {
            if !in_gap {
                collapsed.push(' ');
                in_gap = true;
            }
        } else {
            collapsed.push(c);
            in_gap = false;
        }
    }

    let trimmed = trim_edges(&collapsed);
    let truncated: String = trimmed.chars().take(max_len).collect();
    let result = trim_edges(&truncated);
    if result.is_empty() {
        fallback.to_string()
    } else {
        result.to_string()
    }
}

fn trim_edges(s: &str) -> &str {
    s.trim_matches(|c: char| c == ' ' || c == '.')
}

/// `<root>/<Author>/[<Series>/]<Title>.<ext>` for the given metadata.
///
/// The parsers' `"Unknown"` author counts as missing. A series that
/// sanitizes to nothing is left out of the path.
pub fn canonical_path(root: &Path, meta: &Metadata, ext: &str, max_len: usize) -> PathBuf {
    let author = match meta.author.trim() {
        "" | UNKNOWN_AUTHOR => UNKNOWN_AUTHOR_DIR.to_string(),
        author => sanitize_component(author, UNKNOWN_AUTHOR_DIR, max_len),
    };
    let title = sanitize_component(&meta.title, UNKNOWN_TITLE, max_len);

    let mut path = root.join(author);
    if let Some(series) = meta.series.as_deref() {
        let series = sanitize_component(series, "", max_len);
        if !series.is_empty() {
            path.push(series);
        }
    }

    let ext = ext.trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        path.push(title);
    } else {
        path.push(format!("{title}.{ext}"));
    }
    path
}
