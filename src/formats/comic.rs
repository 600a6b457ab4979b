//! Rules shared by the zip- and RAR-backed comic parsers.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::{debug, warn};

use super::epub::{local_name, push_reference};
use super::{BookFormat, ContentType, CoverImage, FormatError, Metadata, Page, clean_meta};
use crate::archive::{ArchiveEntry, ArchiveReader, entry_base_name};

/// Extensions (lowercase) of entries that count as pages.
pub const PAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

const COMIC_INFO: &str = "comicinfo.xml";

/// Whether an entry name is a page image: known image extension and a base
/// name that does not start with a dot.
pub fn is_page(name: &str) -> bool {
    let base = entry_base_name(name);
    if base.starts_with('.') {
        return false;
    }
    match base.rsplit_once('.') {
        Some((_, ext)) => PAGE_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Page entry names in reading order (plain lexicographic sort).
pub fn sorted_pages(entries: &[ArchiveEntry]) -> Vec<String> {
    let mut pages: Vec<String> = entries
        .iter()
        .filter(|e| is_page(&e.name))
        .map(|e| e.name.clone())
        .collect();
    pages.sort();
    pages
}

/// Guess series name and number from a title such as `Saga - #12` or
/// `Night Watch v3`.
///
/// The last whitespace-separated token, minus one leading `#`, `v` or `V`,
/// must be a number; the tokens before it (trailing hyphens trimmed) are the
/// series name.
pub fn series_from_title(title: &str) -> Option<(String, f64)> {
    let tokens: Vec<&str> = title.split_whitespace().collect();
    let (last, rest) = tokens.split_last()?;
    if rest.is_empty() {
        return None;
    }
    let number = last
        .strip_prefix(['#', 'v', 'V'])
        .unwrap_or(last);
    if !number.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let index = number.parse::<f64>().ok().filter(|n| n.is_finite())?;

    let series = rest.join(" ");
    let series = series.trim_end_matches(|c: char| c == '-' || c.is_whitespace());
    if series.is_empty() {
        return None;
    }
    Some((series.to_string(), index))
}

/// Fields read from a `ComicInfo.xml` document. Empty strings mean absent.
#[derive(Debug, Default, PartialEq)]
pub struct ComicInfo {
    pub title: String,
    pub series: String,
    pub number: String,
    pub writer: String,
    pub summary: String,
    pub publisher: String,
    pub language: String,
    pub year: String,
    pub month: String,
    pub day: String,
    pub genre: String,
}

impl ComicInfo {
    /// Parse the direct children of the `<ComicInfo>` root; element names
    /// are matched case-insensitively.
    pub fn parse(data: &[u8]) -> Result<Self, quick_xml::Error> {
        let mut info = ComicInfo::default();
        let mut xml = Reader::from_reader(data);
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut field: Option<String> = None;
        let mut text = String::new();

        loop {
            match xml.read_event_into(&mut buf)? {
                Event::Eof => break,
                Event::Start(ref e) => {
                    depth += 1;
                    if depth == 2 {
                        field = Some(local_name(e.name().as_ref()));
                        text.clear();
                    }
                }
                Event::End(_) => {
                    if depth == 2 {
                        if let Some(name) = field.take() {
                            info.set(&name, text.trim());
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Text(ref e) if depth == 2 => {
                    if let Ok(t) = e.decode() {
                        text.push_str(&t);
                    }
                }
                Event::CData(ref e) if depth == 2 => text.push_str(&String::from_utf8_lossy(e)),
                Event::GeneralRef(ref e) if depth == 2 => push_reference(&mut text, e),
                _ => {}
            }
            buf.clear();
        }
        Ok(info)
    }

    fn set(&mut self, name: &str, value: &str) {
        let slot = match name {
            "title" => &mut self.title,
            "series" => &mut self.series,
            "number" => &mut self.number,
            "writer" => &mut self.writer,
            "summary" => &mut self.summary,
            "publisher" => &mut self.publisher,
            "languageiso" => &mut self.language,
            "year" => &mut self.year,
            "month" => &mut self.month,
            "day" => &mut self.day,
            "genre" => &mut self.genre,
            _ => return,
        };
        *slot = value.to_string();
    }

    /// Overlay non-empty fields onto filename-derived metadata.
    pub fn apply(&self, meta: &mut Metadata) {
        let title = clean_meta(&self.title);
        if !title.is_empty() {
            meta.title = title;
        }
        let series = clean_meta(&self.series);
        if !series.is_empty() {
            meta.series = Some(series);
        }
        let writer = clean_meta(&self.writer);
        if !writer.is_empty() {
            meta.author = writer;
        }
        if let Some(number) = self
            .number
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite() && *n != 0.0)
        {
            meta.series_index = number;
        }
        if !self.summary.is_empty() {
            meta.description = crate::text::extract_text(&self.summary);
        }
        if !self.publisher.is_empty() {
            meta.publisher = clean_meta(&self.publisher);
        }
        if !self.language.is_empty() {
            meta.language = clean_meta(&self.language);
        }
        if let Some(date) = self.publish_date() {
            meta.publish_date = date;
        }
        let genres: Vec<String> = self
            .genre
            .split(',')
            .map(clean_meta)
            .filter(|g| !g.is_empty())
            .collect();
        if !genres.is_empty() {
            meta.subjects = genres;
        }
    }

    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD` from the Year/Month/Day fields.
    fn publish_date(&self) -> Option<String> {
        let year: u32 = self.year.trim().parse().ok().filter(|y| *y > 0)?;
        let month = self.month.trim().parse::<u32>().ok().filter(|m| (1..=12).contains(m));
        let day = self.day.trim().parse::<u32>().ok().filter(|d| (1..=31).contains(d));
        Some(match (month, day) {
            (Some(m), Some(d)) => format!("{year:04}-{m:02}-{d:02}"),
            (Some(m), None) => format!("{year:04}-{m:02}"),
            _ => format!("{year:04}"),
        })
    }
}

/// A comic container (CBZ or CBR) bound to its reader.
///
/// Page lists are recomputed on every call. Over a forward-only reader each
/// enumeration and each entry read is a separate pass over the file.
pub struct ComicArchive<A: ArchiveReader> {
    reader: A,
    format: BookFormat,
}

impl<A: ArchiveReader> ComicArchive<A> {
    pub fn new(reader: A, format: BookFormat) -> Self {
        Self { reader, format }
    }

    pub fn reader(&self) -> &A {
        &self.reader
    }

    pub fn format(&self) -> BookFormat {
        self.format
    }

    pub fn page_list(&mut self) -> Result<Vec<String>, FormatError> {
        Ok(sorted_pages(&self.reader.entries()?))
    }

    /// Filename-derived metadata, overridden by `ComicInfo.xml` when present.
    pub fn metadata(&mut self) -> Result<Metadata, FormatError> {
        let entries = self.reader.entries()?;
        let pages = sorted_pages(&entries);

        let mut meta = Metadata::from_filename(self.reader.label(), ContentType::Comic);
        if let Some((series, index)) = series_from_title(&meta.title) {
            meta.series = Some(series);
            meta.series_index = index;
        }
        meta.page_count = Some(pages.len());

        let info_entry = entries
            .iter()
            .find(|e| entry_base_name(&e.name).eq_ignore_ascii_case(COMIC_INFO));
        if let Some(entry) = info_entry {
            let data = self.reader.read_entry(&entry.name)?;
            match ComicInfo::parse(&data) {
                Ok(info) => info.apply(&mut meta),
                Err(e) => warn!(
                    archive = %self.reader.label().display(),
                    error = %e,
                    "ignoring unreadable ComicInfo.xml"
                ),
            }
        }
        Ok(meta)
    }

    /// First page in sort order.
    pub fn cover(&mut self) -> Result<CoverImage, FormatError> {
        let pages = self.page_list()?;
        let first = pages.first().ok_or(FormatError::NoImagesFound)?;
        let data = self.reader.read_entry(first)?;
        Ok(CoverImage {
            data,
            extension: page_extension(first),
        })
    }

    /// Bytes of the page at `index` in sort order.
    pub fn page(&mut self, index: i64) -> Result<Page, FormatError> {
        let pages = self.page_list()?;
        let name = usize::try_from(index)
            .ok()
            .and_then(|i| pages.get(i))
            .ok_or(FormatError::PageIndexOutOfRange {
                index,
                count: pages.len(),
            })?;
        debug!(archive = %self.reader.label().display(), page = %name, "reading comic page");
        let data = self.reader.read_entry(name)?;
        Ok(Page {
            data,
            content_type: mime_guess::from_path(name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        })
    }

    /// At least one qualifying page.
    pub fn validate(&mut self) -> Result<(), FormatError> {
        if self.page_list()?.is_empty() {
            return Err(FormatError::NoImagesFound);
        }
        Ok(())
    }
}

fn page_extension(name: &str) -> String {
    match entry_base_name(name).rsplit_once('.') {
        Some((_, ext)) => format!(".{}", ext.to_lowercase()),
        None => String::new(),
    }
}
