use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::XmlVersion;
use quick_xml::reader::Reader;
use tracing::debug;

use super::isbn::{Identifier, find_isbn};
use super::{BookFormat, ContentType, CoverImage, FormatError, Metadata, TocEntry, clean_meta};
use crate::archive::{ArchiveError, ArchiveReader, ZipReader};
use crate::text::extract_text;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// An opened EPUB with its package document parsed.
///
/// The package (metadata, manifest, spine) is read once on open; chapter and
/// cover bytes are fetched from the container on demand.
pub struct Epub<A: ArchiveReader> {
    reader: A,
    opf_dir: String,
    package: Package,
}

impl Epub<ZipReader<BufReader<File>>> {
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        Self::from_reader(ZipReader::open(path)?)
    }
}

impl<A: ArchiveReader> Epub<A> {
    /// Locate and parse the package document of an already opened container.
    pub fn from_reader(mut reader: A) -> Result<Self, FormatError> {
        let opf_path = find_opf_path(&mut reader)?;
        let data = reader.read_entry(&opf_path).map_err(|e| match e {
            ArchiveError::EntryNotFound(name) => {
                invalid(format!("package document {name} is missing"))
            }
            other => other.into(),
        })?;
        let package = parse_opf(&data)?;
        let opf_dir = match opf_path.rfind('/') {
            Some(i) => opf_path[..=i].to_string(),
            None => String::new(),
        };
        debug!(
            archive = %reader.label().display(),
            opf = %opf_path,
            chapters = package.spine.len(),
            "parsed EPUB package"
        );
        Ok(Self {
            reader,
            opf_dir,
            package,
        })
    }

    /// Canonical metadata. Empty OPF fields fall back to the file name.
    pub fn metadata(&self) -> Metadata {
        let pkg = &self.package;
        let mut meta = Metadata::from_filename(self.reader.label(), ContentType::Book);

        if !pkg.title.is_empty() {
            meta.title = pkg.title.clone();
        }
        let authors = if pkg.creators_aut.is_empty() {
            &pkg.creators_all
        } else {
            &pkg.creators_aut
        };
        if !authors.is_empty() {
            meta.author = authors.join(", ");
        }
        if let Some(series) = pkg.series.as_ref().filter(|s| !s.is_empty()) {
            meta.series = Some(series.clone());
            meta.series_index = pkg.series_index;
        }
        meta.isbn = find_isbn(&pkg.identifiers);
        meta.publisher = pkg.publisher.clone();
        meta.publish_date = pkg.date.clone();
        meta.description = extract_text(&pkg.description);
        meta.language = pkg.language.clone();
        meta.subjects = pkg.subjects.clone();
        meta
    }

    /// Spine order, skipping itemrefs with no manifest entry.
    pub fn table_of_contents(&self) -> Vec<TocEntry> {
        self.package
            .spine
            .iter()
            .filter_map(|idref| self.package.manifest.iter().find(|m| &m.id == idref))
            .enumerate()
            .map(|(index, item)| TocEntry {
                index,
                id: item.id.clone(),
                href: resolve_href(&self.opf_dir, &item.href),
            })
            .collect()
    }

    /// Raw markup of the chapter at `index`; empty for any index outside
    /// the table of contents.
    pub fn chapter_content(&mut self, index: i64) -> Result<String, FormatError> {
        let toc = self.table_of_contents();
        let Some(entry) = usize::try_from(index).ok().and_then(|i| toc.get(i)) else {
            return Ok(String::new());
        };
        let data = self.reader.read_entry(&entry.href)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    pub fn chapter_text(&mut self, index: i64) -> Result<String, FormatError> {
        Ok(extract_text(&self.chapter_content(index)?))
    }

    /// Cover image from the manifest.
    ///
    /// Tried in order: an item with `properties="cover-image"`, the item
    /// named by `<meta name="cover">`, then an item whose id is `cover`.
    /// Only `image/*` items qualify; a referenced file missing from the
    /// container moves on to the next strategy.
    pub fn cover(&mut self) -> Option<CoverImage> {
        let manifest = &self.package.manifest;
        let by_property = manifest
            .iter()
            .filter(|m| m.properties.split_whitespace().any(|p| p == "cover-image"));
        let by_meta = self
            .package
            .cover_id
            .iter()
            .filter_map(|id| manifest.iter().find(|m| &m.id == id));
        let by_id = manifest
            .iter()
            .filter(|m| m.id.eq_ignore_ascii_case("cover"));

        let candidates: Vec<(String, String)> = by_property
            .chain(by_meta)
            .chain(by_id)
            .filter(|m| m.media_type.starts_with("image/"))
            .map(|m| (resolve_href(&self.opf_dir, &m.href), m.media_type.clone()))
            .collect();

        for (href, media_type) in candidates {
            match self.reader.read_entry(&href) {
                Ok(data) => {
                    return Some(CoverImage {
                        data,
                        extension: cover_extension(&href, &media_type),
                    });
                }
                Err(e) => debug!(entry = %href, error = %e, "cover candidate unreadable"),
            }
        }
        None
    }
}

/// Parse EPUB metadata from a file on disk.
pub fn parse_epub(path: &Path) -> Result<Metadata, FormatError> {
    Ok(Epub::open(path)?.metadata())
}

/// Ordered chapters; recomputed on every call.
pub fn table_of_contents(path: &Path) -> Result<Vec<TocEntry>, FormatError> {
    Ok(Epub::open(path)?.table_of_contents())
}

pub fn chapter_content(path: &Path, index: i64) -> Result<String, FormatError> {
    Epub::open(path)?.chapter_content(index)
}

pub fn chapter_text(path: &Path, index: i64) -> Result<String, FormatError> {
    Epub::open(path)?.chapter_text(index)
}

/// Succeeds iff the container opens and resolves a package document.
pub fn validate_epub(path: &Path) -> Result<(), FormatError> {
    match Epub::open(path) {
        Ok(_) => Ok(()),
        Err(e @ FormatError::InvalidFormat { .. }) => Err(e),
        Err(e) => Err(invalid(e.to_string())),
    }
}

pub fn extract_cover_epub(path: &Path) -> Result<Option<CoverImage>, FormatError> {
    Ok(Epub::open(path)?.cover())
}

fn invalid(reason: impl Into<String>) -> FormatError {
    FormatError::InvalidFormat {
        format: BookFormat::Epub,
        reason: reason.into(),
    }
}

/// Locate the package document: the container's rootfile, or a lone
/// `*.opf` entry when the container file is missing or unusable.
fn find_opf_path(reader: &mut impl ArchiveReader) -> Result<String, FormatError> {
    match reader.read_entry(CONTAINER_PATH) {
        Ok(data) => {
            if let Some(path) = parse_container_xml(&data) {
                return Ok(path);
            }
        }
        Err(ArchiveError::EntryNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let mut opf_files: Vec<String> = reader
        .entries()?
        .into_iter()
        .map(|e| e.name)
        .filter(|name| name.to_ascii_lowercase().ends_with(".opf"))
        .collect();
    match opf_files.len() {
        1 => Ok(opf_files.remove(0)),
        0 => Err(invalid("no package document found")),
        n => Err(invalid(format!(
            "{n} candidate package documents and no usable container.xml"
        ))),
    }
}

/// Rootfile `full-path` from container.xml, preferring the one declared with
/// the OPF media type.
fn parse_container_xml(data: &[u8]) -> Option<String> {
    let mut xml = Reader::from_reader(data);
    xml.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut fallback = None;

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Eof) | Err(_) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if local_name(e.name().as_ref()) == "rootfile" {
                    let full_path = attr_value(e, "full-path").filter(|p| !p.is_empty());
                    let media_type = attr_value(e, "media-type");
                    if let Some(path) = full_path {
                        if media_type.as_deref() == Some(OPF_MEDIA_TYPE) {
                            return Some(path);
                        }
                        fallback.get_or_insert(path);
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }
    fallback
}

#[derive(Debug, Default)]
struct Package {
    title: String,
    creators_aut: Vec<String>,
    creators_all: Vec<String>,
    identifiers: Vec<Identifier>,
    description: String,
    publisher: String,
    language: String,
    date: String,
    subjects: Vec<String>,
    series: Option<String>,
    series_index: f64,
    manifest: Vec<ManifestItem>,
    spine: Vec<String>,
    cover_id: Option<String>,
}

#[derive(Debug)]
struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
    properties: String,
}

/// Single pass over the OPF collecting metadata, manifest and spine.
fn parse_opf(data: &[u8]) -> Result<Package, FormatError> {
    let mut pkg = Package::default();
    // Text events are split around entity references; keep their whitespace.
    let mut xml = Reader::from_reader(data);
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut creator_role: Option<String> = None;
    let mut identifier_scheme: Option<String> = None;
    let mut seen_package = false;

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(invalid(format!(
                    "malformed package document at byte {}: {e}",
                    xml.error_position()
                )));
            }

            Ok(Event::Start(ref e)) => {
                let local = local_name(e.name().as_ref());
                seen_package |= local == "package";
                handle_open(&local, e, &mut pkg, &mut creator_role, &mut identifier_scheme);
                path.push(local);
                text.clear();
            }

            Ok(Event::Empty(ref e)) => {
                let local = local_name(e.name().as_ref());
                seen_package |= local == "package";
                handle_open(&local, e, &mut pkg, &mut creator_role, &mut identifier_scheme);
            }

            Ok(Event::End(_)) => {
                let tag = path.last().map(String::as_str).unwrap_or("");
                if in_metadata(&path) {
                    let value = text.trim();
                    match tag {
                        "title" if pkg.title.is_empty() => pkg.title = clean_meta(value),
                        "creator" => {
                            let name = clean_meta(value);
                            if !name.is_empty() {
                                if creator_role.as_deref() == Some("aut") {
                                    pkg.creators_aut.push(name.clone());
                                }
                                pkg.creators_all.push(name);
                            }
                            creator_role = None;
                        }
                        "identifier" => {
                            if !value.is_empty() {
                                pkg.identifiers.push(Identifier {
                                    scheme: identifier_scheme.take(),
                                    value: value.to_string(),
                                });
                            }
                            identifier_scheme = None;
                        }
                        "description" if pkg.description.is_empty() => {
                            pkg.description = value.to_string();
                        }
                        "publisher" if pkg.publisher.is_empty() => {
                            pkg.publisher = clean_meta(value)
                        }
                        "language" if pkg.language.is_empty() => pkg.language = clean_meta(value),
                        "date" if pkg.date.is_empty() => pkg.date = clean_meta(value),
                        "subject" => {
                            let subject = clean_meta(value);
                            if !subject.is_empty() && !pkg.subjects.contains(&subject) {
                                pkg.subjects.push(subject);
                            }
                        }
                        _ => {}
                    }
                }
                path.pop();
                text.clear();
            }

            Ok(Event::Text(ref e)) => {
                if let Ok(t) = e.decode() {
                    text.push_str(&t);
                }
            }

            Ok(Event::CData(ref e)) => text.push_str(&String::from_utf8_lossy(e)),

            Ok(Event::GeneralRef(ref e)) => push_reference(&mut text, e),

            _ => {}
        }
        buf.clear();
    }

    if !seen_package {
        return Err(invalid("package document has no <package> root"));
    }
    Ok(pkg)
}

/// Attributes of start or empty OPF elements.
fn handle_open(
    local: &str,
    e: &BytesStart<'_>,
    pkg: &mut Package,
    creator_role: &mut Option<String>,
    identifier_scheme: &mut Option<String>,
) {
    match local {
        "meta" => {
            let name = attr_value(e, "name").unwrap_or_default();
            let content = attr_value(e, "content").unwrap_or_default();
            match name.as_str() {
                "calibre:series" => pkg.series = Some(clean_meta(&content)),
                "calibre:series_index" => {
                    pkg.series_index = content
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|n| n.is_finite())
                        .unwrap_or(0.0);
                }
                "cover" if !content.is_empty() => pkg.cover_id = Some(content),
                _ => {}
            }
        }
        "creator" => *creator_role = attr_value(e, "role"),
        "identifier" => *identifier_scheme = attr_value(e, "scheme"),
        "item" => pkg.manifest.push(ManifestItem {
            id: attr_value(e, "id").unwrap_or_default(),
            href: attr_value(e, "href").unwrap_or_default(),
            media_type: attr_value(e, "media-type").unwrap_or_default(),
            properties: attr_value(e, "properties").unwrap_or_default(),
        }),
        "itemref" => {
            if let Some(idref) = attr_value(e, "idref") {
                pkg.spine.push(idref);
            }
        }
        _ => {}
    }
}

/// Append the character an entity or character reference stands for.
/// Unknown entities are kept literally.
pub(crate) fn push_reference(text: &mut String, e: &BytesRef<'_>) {
    if let Ok(Some(c)) = e.resolve_char_ref() {
        text.push(c);
        return;
    }
    let Ok(name) = e.decode() else {
        return;
    };
    match quick_xml::escape::resolve_predefined_entity(&name) {
        Some(value) => text.push_str(value),
        None => {
            text.push('&');
            text.push_str(&name);
            text.push(';');
        }
    }
}

/// Value of the attribute whose local name is `key` (prefixes ignored, so
/// `opf:role` matches `role`).
pub(crate) fn attr_value(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| local_name(attr.key.as_ref()) == key)
        .and_then(|attr| attr.normalized_value(XmlVersion::Implicit1_0).ok())
        .map(|v| v.trim().to_string())
}

pub(crate) fn local_name(raw: &[u8]) -> String {
    let s = std::str::from_utf8(raw).unwrap_or("");
    match s.rfind(':') {
        Some(i) => s[i + 1..].to_lowercase(),
        None => s.to_lowercase(),
    }
}

fn in_metadata(path: &[String]) -> bool {
    path.iter().any(|s| s == "metadata")
}

/// Resolve a manifest href against the package directory: fragment dropped,
/// percent-escapes decoded, `.` and `..` segments folded.
fn resolve_href(opf_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    let href = urlencoding::decode(href)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| href.to_string());
    let joined = match href.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{opf_dir}{href}"),
    };

    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn cover_extension(href: &str, media_type: &str) -> String {
    let from_href = Path::new(href)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty());
    let ext = match from_href {
        Some(ext) => ext.to_lowercase(),
        None => match media_type {
            "image/jpeg" => "jpg".to_string(),
            "image/svg+xml" => "svg".to_string(),
            other => other.trim_start_matches("image/").to_lowercase(),
        },
    };
    format!(".{ext}")
}
