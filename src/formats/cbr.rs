//! CBR (RAR) comics.
//!
//! RAR can only be read front to back, so anything that needs "the Nth page
//! in sorted order" lists the archive once to sort the names and then
//! reopens it and streams forward to the chosen entry: two full passes per
//! call. Callers reading many pages should take [`page_list_cbr`] once and
//! work from an open [`CbrArchive`] instead of calling [`get_page_cbr`] in a
//! loop.

use std::path::Path;

use super::comic::ComicArchive;
use super::{BookFormat, CoverImage, FormatError, Metadata, Page};
use crate::archive::RarReader;

pub type CbrArchive = ComicArchive<RarReader>;

pub fn open_cbr(path: &Path) -> Result<CbrArchive, FormatError> {
    Ok(ComicArchive::new(RarReader::open(path)?, BookFormat::Cbr))
}

/// One pass, plus one more when a `ComicInfo.xml` entry is present.
pub fn parse_cbr(path: &Path) -> Result<Metadata, FormatError> {
    open_cbr(path)?.metadata()
}

pub fn page_list_cbr(path: &Path) -> Result<Vec<String>, FormatError> {
    open_cbr(path)?.page_list()
}

/// Two full passes over the archive.
pub fn extract_cover_cbr(path: &Path) -> Result<CoverImage, FormatError> {
    open_cbr(path)?.cover()
}

/// Two full passes over the archive. Negative or past-the-end indices are
/// errors.
pub fn get_page_cbr(path: &Path, index: i64) -> Result<Page, FormatError> {
    open_cbr(path)?.page(index)
}

pub fn validate_cbr(path: &Path) -> Result<(), FormatError> {
    open_cbr(path)?.validate()
}
