/// An `<dc:identifier>` value together with its declared scheme, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifier {
    pub scheme: Option<String>,
    pub value: String,
}

const URN_PREFIX: &str = "urn:isbn:";

/// Normalise an ISBN-10 or ISBN-13 candidate.
///
/// Accepts an optional `urn:isbn:` prefix (any case) and hyphens, spaces or
/// dots between digits. Returns the bare digits with a trailing `X` kept in
/// upper case, or `None` when the value does not have ISBN shape. The check
/// digit is not verified.
pub fn normalize_isbn(raw: &str) -> Option<String> {
    let mut value = raw.trim();
    if value
        .get(..URN_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(URN_PREFIX))
    {
        value = value[URN_PREFIX.len()..].trim();
    }

    let mut out = String::with_capacity(13);
    for c in value.chars() {
        match c {
            '0'..='9' => out.push(c),
            'x' | 'X' => out.push('X'),
            '-' | ' ' | '.' => {}
            _ => return None,
        }
    }

    let shaped = match out.len() {
        10 => {
            out[..9].bytes().all(|b| b.is_ascii_digit())
                && out[9..].bytes().all(|b| b.is_ascii_digit() || b == b'X')
        }
        13 => out.bytes().all(|b| b.is_ascii_digit()),
        _ => false,
    };
    shaped.then_some(out)
}

/// Pick the ISBN out of a package's identifiers.
///
/// Identifiers declared with an ISBN scheme win; otherwise the first value
/// that has ISBN shape is used. Empty when nothing matches.
pub fn find_isbn(identifiers: &[Identifier]) -> String {
    let declared = identifiers.iter().filter(|id| {
        id.scheme
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("isbn"))
    });
    declared
        .chain(identifiers.iter())
        .find_map(|id| normalize_isbn(&id.value))
        .unwrap_or_default()
}
