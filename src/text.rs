//! Markup to plain text conversion for chapter previews and exports.

/// Elements whose end tag (or, for `br`, any tag) starts a new line.
const BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "br", "div", "li", "tr", "blockquote",
];

/// Elements dropped together with their content.
const HIDDEN_TAGS: &[&str] = &["script", "style"];

/// Convert (X)HTML markup to plain text.
///
/// `<script>` and `<style>` elements are removed with their content, block
/// boundaries become line breaks, remaining tags are dropped and entities are
/// decoded. Every resulting line is whitespace-collapsed and trimmed, and
/// blank lines are discarded. Plain text passes through unchanged apart from
/// that whitespace normalisation, so the function is idempotent on its own
/// output.
pub fn extract_text(markup: &str) -> String {
    let visible = remove_hidden_elements(markup);

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut rest = visible.as_str();

    while let Some(lt) = rest.find('<') {
        current.push_str(&rest[..lt]);
        let after = &rest[lt + 1..];
        if !starts_tag(after) {
            current.push('<');
            rest = after;
            continue;
        }
        // Unterminated (or interrupted by another `<`), so not a tag.
        let Some(gt) = after
            .find('>')
            .filter(|&gt| !after[..gt].contains('<'))
        else {
            current.push('<');
            rest = after;
            continue;
        };
        let tag = &after[..gt];
        if is_block_boundary(tag) {
            segments.push(std::mem::take(&mut current));
        }
        rest = &after[gt + 1..];
    }
    current.push_str(rest);
    segments.push(current);

    let mut lines = Vec::new();
    for segment in segments {
        let decoded = decode_entities(&segment);
        for line in decoded.lines() {
            let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
            if !line.is_empty() {
                lines.push(line);
            }
        }
    }
    lines.join("\n")
}

/// Decode the predefined XML entities, `&nbsp;` and numeric references.
/// Unknown or malformed references are left as they are.
pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| resolve_entity(&after[..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// A `<` only opens a tag when followed by a name, `/`, `!` or `?`.
fn starts_tag(after_lt: &str) -> bool {
    after_lt
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn is_block_boundary(tag: &str) -> bool {
    let name = tag_name(tag);
    if name == "br" {
        return true;
    }
    tag.starts_with('/') && BLOCK_TAGS.contains(&name.as_str())
}

/// Cut out every `<script>`/`<style>` element, content included.
fn remove_hidden_elements(markup: &str) -> String {
    // ASCII lowercasing keeps byte offsets identical to `markup`.
    let lower = markup.to_ascii_lowercase();
    let mut out = String::with_capacity(markup.len());
    let mut pos = 0;

    while pos < markup.len() {
        let next = HIDDEN_TAGS
            .iter()
            .filter_map(|tag| find_open_tag(&lower, pos, tag).map(|at| (at, *tag)))
            .min_by_key(|(at, _)| *at);
        let Some((start, tag)) = next else {
            break;
        };
        out.push_str(&markup[pos..start]);
        let close = format!("</{tag}");
        pos = match lower[start..].find(&close) {
            Some(rel) => {
                let close_start = start + rel;
                match lower[close_start..].find('>') {
                    Some(gt) => close_start + gt + 1,
                    None => markup.len(),
                }
            }
            None => markup.len(),
        };
    }
    if pos < markup.len() {
        out.push_str(&markup[pos..]);
    }
    out
}

/// Find `<tag` followed by whitespace, `>` or `/` at or after `from`.
fn find_open_tag(lower: &str, from: usize, tag: &str) -> Option<usize> {
    let needle = format!("<{tag}");
    let mut search = from;
    while let Some(rel) = lower[search..].find(&needle) {
        let at = search + rel;
        let next = lower[at + needle.len()..].chars().next();
        if next.is_none_or(|c| c.is_whitespace() || c == '>' || c == '/') {
            return Some(at);
        }
        search = at + needle.len();
    }
    None
}
