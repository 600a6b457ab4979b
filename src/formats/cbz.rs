use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::comic::ComicArchive;
use super::{BookFormat, CoverImage, FormatError, Metadata, Page};
use crate::archive::ZipReader;

pub type CbzArchive = ComicArchive<ZipReader<BufReader<File>>>;

pub fn open_cbz(path: &Path) -> Result<CbzArchive, FormatError> {
    Ok(ComicArchive::new(ZipReader::open(path)?, BookFormat::Cbz))
}

pub fn parse_cbz(path: &Path) -> Result<Metadata, FormatError> {
    open_cbz(path)?.metadata()
}

pub fn page_list_cbz(path: &Path) -> Result<Vec<String>, FormatError> {
    open_cbz(path)?.page_list()
}

pub fn extract_cover_cbz(path: &Path) -> Result<CoverImage, FormatError> {
    open_cbz(path)?.cover()
}

/// Page bytes by sort position. Negative or past-the-end indices are errors.
pub fn get_page_cbz(path: &Path, index: i64) -> Result<Page, FormatError> {
    open_cbz(path)?.page(index)
}

pub fn validate_cbz(path: &Path) -> Result<(), FormatError> {
    open_cbz(path)?.validate()
}
