use shelfkeep::archive::{Access, ArchiveReader};
use shelfkeep::formats::cbr::{
    extract_cover_cbr, get_page_cbr, open_cbr, page_list_cbr, parse_cbr, validate_cbr,
};
use shelfkeep::formats::cbz::{
    extract_cover_cbz, get_page_cbz, open_cbz, page_list_cbz, parse_cbz, validate_cbz,
};
use shelfkeep::formats::{BookFormat, ContentType, Document, FormatError};

use super::*;

const COMIC_INFO: &[u8] = br#"<?xml version="1.0" encoding="utf-8"?>
<ComicInfo>
  <Title>Hollow Stars</Title>
  <Series>Deep Field</Series>
  <Number>7</Number>
  <Writer>Sam Ortega</Writer>
</ComicInfo>"#;

fn sample_cbr() -> PathBuf {
    test_data_dir().join("sample.cbr")
}

fn write_cbz(path: &Path, with_info: bool) {
    let mut files: Vec<(&str, &[u8])> = vec![
        ("p10.jpg", b"page ten"),
        ("p02.png", b"page two"),
        (".p00.jpg", b"hidden"),
        ("readme.txt", b"not a page"),
        ("p01.JPG", b"page one"),
    ];
    if with_info {
        files.push(("comicinfo.XML", COMIC_INFO));
    }
    write_zip(path, &files);
}

#[test]
fn cbz_pages_are_sorted_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Deep Field 7.cbz");
    write_cbz(&path, false);

    let pages = page_list_cbz(&path).unwrap();
    assert_eq!(pages, vec!["p01.JPG", "p02.png", "p10.jpg"]);
    assert_eq!(page_list_cbz(&path).unwrap(), pages);
}

#[test]
fn cbz_metadata_from_filename() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Saga - #12.cbz");
    write_cbz(&path, false);

    let meta = parse_cbz(&path).unwrap();
    assert_eq!(meta.title, "Saga - #12");
    assert_eq!(meta.series.as_deref(), Some("Saga"));
    assert_eq!(meta.series_index, 12.0);
    assert_eq!(meta.author, "Unknown");
    assert_eq!(meta.page_count, Some(3));
    assert_eq!(meta.content_type, ContentType::Comic);
}

#[test]
fn cbz_comic_info_overrides_filename() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan_0001 v2.cbz");
    write_cbz(&path, true);

    let meta = parse_cbz(&path).unwrap();
    assert_eq!(meta.title, "Hollow Stars");
    assert_eq!(meta.series.as_deref(), Some("Deep Field"));
    assert_eq!(meta.series_index, 7.0);
    assert_eq!(meta.author, "Sam Ortega");
    assert_eq!(meta.page_count, Some(3));
}

#[test]
fn cbz_cover_and_pages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.cbz");
    write_cbz(&path, false);

    let cover = extract_cover_cbz(&path).unwrap();
    assert_eq!(cover.data, b"page one");
    assert_eq!(cover.extension, ".jpg");

    let page = get_page_cbz(&path, 1).unwrap();
    assert_eq!(page.data, b"page two");
    assert_eq!(page.content_type, "image/png");

    assert!(matches!(
        get_page_cbz(&path, -1),
        Err(FormatError::PageIndexOutOfRange { index: -1, count: 3 })
    ));
    assert!(matches!(
        get_page_cbz(&path, 3),
        Err(FormatError::PageIndexOutOfRange { index: 3, count: 3 })
    ));
}

#[test]
fn cbz_page_read_is_single_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.cbz");
    write_cbz(&path, false);

    let mut comic = open_cbz(&path).unwrap();
    assert_eq!(comic.reader().access(), Access::Seekable);
    comic.page(2).unwrap();
    assert_eq!(comic.reader().passes(), 1);
}

#[test]
fn cbz_without_images_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("text-only.cbz");
    write_zip(&path, &[("notes.txt", b"hello"), (".cover.jpg", b"hidden")]);

    assert!(matches!(validate_cbz(&path), Err(FormatError::NoImagesFound)));
    assert!(matches!(extract_cover_cbz(&path), Err(FormatError::NoImagesFound)));
}

#[test]
fn cbr_pages_and_metadata() {
    let path = sample_cbr();
    assert_eq!(
        page_list_cbr(&path).unwrap(),
        vec!["page_01.jpg", "page_02.png", "page_03.png"]
    );
    assert!(validate_cbr(&path).is_ok());

    let meta = parse_cbr(&path).unwrap();
    assert_eq!(meta.title, "The Long Night");
    assert_eq!(meta.series.as_deref(), Some("Night Watch"));
    assert_eq!(meta.series_index, 3.0);
    assert_eq!(meta.author, "Jane Doe");
    assert_eq!(meta.description, "Rain & neon.");
    assert_eq!(meta.page_count, Some(3));
}

#[test]
fn cbr_cover_and_pages() {
    let path = sample_cbr();

    let cover = extract_cover_cbr(&path).unwrap();
    assert_eq!(cover.data, b"\xff\xd8\xff\xe0first page");
    assert_eq!(cover.extension, ".jpg");

    let page = get_page_cbr(&path, 1).unwrap();
    assert_eq!(page.data, b"\x89PNG\r\n\x1a\nsecond page");
    assert_eq!(page.content_type, "image/png");

    assert!(matches!(
        get_page_cbr(&path, -1),
        Err(FormatError::PageIndexOutOfRange { index: -1, count: 3 })
    ));
    assert!(matches!(
        get_page_cbr(&path, 3),
        Err(FormatError::PageIndexOutOfRange { index: 3, count: 3 })
    ));
}

#[test]
fn cbr_page_read_takes_two_passes() {
    let mut comic = open_cbr(&sample_cbr()).unwrap();
    assert_eq!(comic.reader().access(), Access::ForwardOnly);
    let page = comic.page(2).unwrap();
    assert_eq!(page.data, b"\x89PNG\r\n\x1a\nthird page");
    assert_eq!(comic.reader().passes(), 2);
}

#[test]
fn document_detects_comics_by_content() {
    let dir = tempfile::tempdir().unwrap();

    let rar = dir.path().join("mystery-rar");
    std::fs::copy(sample_cbr(), &rar).unwrap();
    assert_eq!(Document::open(&rar, None).unwrap().format(), BookFormat::Cbr);

    let zip = dir.path().join("mystery-zip");
    write_cbz(&zip, false);
    assert_eq!(Document::open(&zip, None).unwrap().format(), BookFormat::Cbz);
}

#[test]
fn declared_format_wins_over_detection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("actually-a-comic.epub");
    write_cbz(&path, false);

    let doc = Document::open(&path, Some(BookFormat::Cbz)).unwrap();
    assert_eq!(doc.metadata().unwrap().page_count, Some(3));
}
