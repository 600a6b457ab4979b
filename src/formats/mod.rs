pub mod cbr;
pub mod cbz;
pub mod comic;
pub mod epub;
pub mod isbn;

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::archive::{ArchiveError, ArchiveReader, ZipReader};

/// What kind of document an archive holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Book,
    Comic,
}

/// Canonical metadata extracted from a single archive.
///
/// `series_index == 0.0` means "not part of a series". A book that really is
/// entry zero of a series cannot be told apart from that; callers must not
/// read more into a zero index than "unknown or zero".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub title: String,
    pub author: String,
    pub series: Option<String>,
    pub series_index: f64,
    /// Qualifying page images; comics only.
    pub page_count: Option<usize>,
    pub content_type: ContentType,
    /// Normalised ISBN-10/13, empty when none was found.
    pub isbn: String,
    pub publisher: String,
    pub publish_date: String,
    /// Plain text; markup is stripped on extraction.
    pub description: String,
    pub language: String,
    pub subjects: Vec<String>,
}

pub const UNKNOWN_AUTHOR: &str = "Unknown";

impl Metadata {
    /// Baseline record built from the file name alone.
    pub fn from_filename(path: &Path, content_type: ContentType) -> Self {
        Metadata {
            title: title_from_filename(path),
            author: UNKNOWN_AUTHOR.to_string(),
            content_type,
            ..Default::default()
        }
    }
}

/// Cover image bytes, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub data: Vec<u8>,
    /// Lowercase, with leading dot (e.g. `.jpg`).
    pub extension: String,
}

/// Raw bytes of one comic page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// One spine position of an EPUB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub index: usize,
    /// Manifest item id.
    pub id: String,
    /// Content path inside the container.
    pub href: String,
}

/// Ordered reading units of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "lowercase")]
pub enum Contents {
    Chapters(Vec<TocEntry>),
    Pages(Vec<String>),
}

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Epub,
    Cbz,
    Cbr,
}

impl BookFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "epub" => Some(BookFormat::Epub),
            "cbz" => Some(BookFormat::Cbz),
            "cbr" => Some(BookFormat::Cbr),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            BookFormat::Epub => "epub",
            BookFormat::Cbz => "cbz",
            BookFormat::Cbr => "cbr",
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            BookFormat::Epub => ContentType::Book,
            BookFormat::Cbz | BookFormat::Cbr => ContentType::Comic,
        }
    }

    /// Detect the format from the file extension, falling back to magic bytes.
    pub fn detect(path: &Path) -> Result<Self, FormatError> {
        if let Some(format) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(BookFormat::from_extension)
        {
            return Ok(format);
        }
        Self::sniff(path)
    }

    /// Detect the format from file content only.
    ///
    /// Zip containers are EPUB when they carry a `mimetype` entry declaring
    /// `application/epub+zip` (or an OCF `META-INF/container.xml`), CBZ
    /// otherwise.
    pub fn sniff(path: &Path) -> Result<Self, FormatError> {
        let mut magic = [0u8; 7];
        let mut file = File::open(path)?;
        let n = read_prefix(&mut file, &mut magic)?;
        let magic = &magic[..n];

        if magic.starts_with(b"Rar!\x1a\x07") {
            return Ok(BookFormat::Cbr);
        }
        if magic.starts_with(b"PK\x03\x04") {
            let mut reader = ZipReader::open(path)?;
            let is_epub = match reader.read_entry("mimetype") {
                Ok(data) => data.trim_ascii() == b"application/epub+zip",
                Err(_) => reader.read_entry("META-INF/container.xml").is_ok(),
            };
            return Ok(if is_epub {
                BookFormat::Epub
            } else {
                BookFormat::Cbz
            });
        }
        Err(FormatError::UnsupportedFormat(path.display().to_string()))
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BookFormat::Epub => "EPUB",
            BookFormat::Cbz => "CBZ",
            BookFormat::Cbr => "CBR",
        })
    }
}

/// A file on disk paired with the parser that handles it.
///
/// Every call opens the archive afresh and releases it before returning.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    format: BookFormat,
}

impl Document {
    /// Bind `path` to a parser. A declared format wins over detection.
    pub fn open(path: &Path, declared: Option<BookFormat>) -> Result<Self, FormatError> {
        let format = match declared {
            Some(format) => format,
            None => BookFormat::detect(path)?,
        };
        Ok(Self {
            path: path.to_path_buf(),
            format,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> BookFormat {
        self.format
    }

    pub fn metadata(&self) -> Result<Metadata, FormatError> {
        match self.format {
            BookFormat::Epub => epub::parse_epub(&self.path),
            BookFormat::Cbz => cbz::parse_cbz(&self.path),
            BookFormat::Cbr => cbr::parse_cbr(&self.path),
        }
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        match self.format {
            BookFormat::Epub => epub::validate_epub(&self.path),
            BookFormat::Cbz => cbz::validate_cbz(&self.path),
            BookFormat::Cbr => cbr::validate_cbr(&self.path),
        }
    }

    pub fn cover(&self) -> Result<Option<CoverImage>, FormatError> {
        match self.format {
            BookFormat::Epub => epub::extract_cover_epub(&self.path),
            BookFormat::Cbz => cbz::extract_cover_cbz(&self.path).map(Some),
            BookFormat::Cbr => cbr::extract_cover_cbr(&self.path).map(Some),
        }
    }

    pub fn contents(&self) -> Result<Contents, FormatError> {
        match self.format {
            BookFormat::Epub => epub::table_of_contents(&self.path).map(Contents::Chapters),
            BookFormat::Cbz => cbz::page_list_cbz(&self.path).map(Contents::Pages),
            BookFormat::Cbr => cbr::page_list_cbr(&self.path).map(Contents::Pages),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("invalid {format} structure: {reason}")]
    InvalidFormat { format: BookFormat, reason: String },
    #[error("no images found in archive")]
    NoImagesFound,
    #[error("page index {index} out of range (page count {count})")]
    PageIndexOutOfRange { index: i64, count: usize },
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// File name without its extension.
pub fn title_from_filename(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Collapse internal whitespace runs and trim.
pub fn clean_meta(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Read up to `buf.len()` bytes, stopping early at EOF.
fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
