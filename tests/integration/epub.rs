use shelfkeep::formats::epub::{
    chapter_content, chapter_text, extract_cover_epub, parse_epub, table_of_contents,
    validate_epub,
};
use shelfkeep::formats::{BookFormat, ContentType, Contents, Document, FormatError};

use super::*;

const FULL_METADATA: &str = r#"
    <dc:title>A Study in Ink</dc:title>
    <dc:creator opf:role="aut">Mary Quill</dc:creator>
    <dc:identifier opf:scheme="ISBN">urn:isbn:978-1-23-456789-7</dc:identifier>
    <dc:description>&lt;p&gt;A &lt;b&gt;mystery&lt;/b&gt;.&lt;/p&gt;</dc:description>
    <dc:language>en</dc:language>
    <dc:subject>Mystery</dc:subject>
    <dc:subject>Detective</dc:subject>
    <meta name="calibre:series" content="Ink Cases"/>
    <meta name="calibre:series_index" content="1"/>"#;

#[test]
fn parse_epub_reads_package_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ink.epub");
    write_epub(&path, FULL_METADATA, &["<p>One</p>"]);

    let meta = parse_epub(&path).unwrap();
    assert_eq!(meta.title, "A Study in Ink");
    assert_eq!(meta.author, "Mary Quill");
    assert_eq!(meta.isbn, "9781234567897");
    assert_eq!(meta.description, "A mystery.");
    assert_eq!(meta.language, "en");
    assert_eq!(meta.subjects, vec!["Mystery", "Detective"]);
    assert_eq!(meta.series.as_deref(), Some("Ink Cases"));
    assert_eq!(meta.series_index, 1.0);
    assert_eq!(meta.content_type, ContentType::Book);
}

#[test]
fn parse_epub_without_metadata_uses_filename() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Nameless Draft.epub");
    write_epub(&path, "", &["<p>One</p>"]);

    let meta = parse_epub(&path).unwrap();
    assert_eq!(meta.title, "Nameless Draft");
    assert_eq!(meta.author, "Unknown");
    assert_eq!(meta.isbn, "");
}

#[test]
fn table_of_contents_indices_are_contiguous() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("three.epub");
    write_epub(&path, "<dc:title>Three</dc:title>", &["<p>a</p>", "<p>b</p>", "<p>c</p>"]);

    let toc = table_of_contents(&path).unwrap();
    let indices: Vec<usize> = toc.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(toc[2].href, "OEBPS/text/ch2.xhtml");
    // Recomputed, not cached: same answer twice.
    assert_eq!(table_of_contents(&path).unwrap(), toc);
}

#[test]
fn chapter_access_and_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.epub");
    write_epub(
        &path,
        "<dc:title>One</dc:title>",
        &["<h1>Start</h1><script>var x = 1;</script><p>Tom &amp; Jerry</p>"],
    );

    assert!(chapter_content(&path, 0).unwrap().contains("<h1>Start</h1>"));
    assert_eq!(chapter_text(&path, 0).unwrap(), "Start\nTom & Jerry");
    assert_eq!(chapter_content(&path, 999).unwrap(), "");
    assert_eq!(chapter_content(&path, -1).unwrap(), "");
}

#[test]
fn cover_from_cover_image_property() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("covered.epub");
    write_epub(&path, "<dc:title>C</dc:title>", &["<p>x</p>"]);

    let cover = extract_cover_epub(&path).unwrap().unwrap();
    assert_eq!(cover.extension, ".jpg");
    assert_eq!(cover.data, b"\xff\xd8\xff\xe0cover");
}

#[test]
fn validate_epub_rejects_broken_containers() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.epub");
    write_epub(&good, "<dc:title>G</dc:title>", &["<p>x</p>"]);
    assert!(validate_epub(&good).is_ok());

    let garbage = dir.path().join("garbage.epub");
    std::fs::write(&garbage, b"not a zip at all").unwrap();
    assert!(matches!(
        validate_epub(&garbage),
        Err(FormatError::InvalidFormat { format: BookFormat::Epub, .. })
    ));

    let no_package = dir.path().join("empty.epub");
    write_zip(&no_package, &[("mimetype", b"application/epub+zip")]);
    assert!(matches!(
        validate_epub(&no_package),
        Err(FormatError::InvalidFormat { .. })
    ));
}

#[test]
fn document_detects_epub_by_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upload.bin");
    write_epub(&path, "<dc:title>Sniffed</dc:title>", &["<p>x</p>"]);

    let doc = Document::open(&path, None).unwrap();
    assert_eq!(doc.format(), BookFormat::Epub);
    assert_eq!(doc.metadata().unwrap().title, "Sniffed");
    match doc.contents().unwrap() {
        Contents::Chapters(chapters) => assert_eq!(chapters.len(), 1),
        other => panic!("expected chapters, got {other:?}"),
    }
}
