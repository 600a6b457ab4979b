mod comic;
mod epub;
mod ingest;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zip::write::SimpleFileOptions;

use shelfkeep::config::Config;
use shelfkeep::db::models::Book;
use shelfkeep::db::{self, SqliteBookStore};
use shelfkeep::dedup::BookStore;

/// Directory containing committed test fixtures.
pub fn test_data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

/// Build a minimal Config pointing at the given library root.
pub fn test_config(lib_dir: &Path) -> Config {
    let toml_str = format!(
        r#"
[library]
root_path = {lib_dir:?}

[database]
url = "sqlite::memory:"

[dedup]
batch_size = 2
"#
    );
    toml::from_str(&toml_str).expect("test config should parse")
}

/// Store backed by a fresh in-memory database.
pub async fn test_store() -> Arc<SqliteBookStore> {
    Arc::new(SqliteBookStore::new(db::create_test_pool().await))
}

/// Write a zip archive with the given entries to `path`.
pub fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, data) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

pub const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Write an EPUB whose package carries `metadata` and one spine entry per
/// chapter body.
pub fn write_epub(path: &Path, metadata: &str, chapters: &[&str]) {
    let mut manifest = String::new();
    let mut spine = String::new();
    let mut files: Vec<(String, Vec<u8>)> = vec![
        ("mimetype".to_string(), b"application/epub+zip".to_vec()),
        ("META-INF/container.xml".to_string(), CONTAINER_XML.as_bytes().to_vec()),
    ];
    for (i, body) in chapters.iter().enumerate() {
        manifest.push_str(&format!(
            r#"<item id="ch{i}" href="text/ch{i}.xhtml" media-type="application/xhtml+xml"/>"#
        ));
        spine.push_str(&format!(r#"<itemref idref="ch{i}"/>"#));
        files.push((
            format!("OEBPS/text/ch{i}.xhtml"),
            format!("<html><body>{body}</body></html>").into_bytes(),
        ));
    }
    manifest.push_str(r#"<item id="cover-img" href="images/cover.jpg" media-type="image/jpeg" properties="cover-image"/>"#);
    files.push(("OEBPS/images/cover.jpg".to_string(), b"\xff\xd8\xff\xe0cover".to_vec()));

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf" version="3.0">
  <metadata>{metadata}</metadata>
  <manifest>{manifest}</manifest>
  <spine>{spine}</spine>
</package>"#
    );
    files.push(("OEBPS/content.opf".to_string(), opf.into_bytes()));

    let refs: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(n, d)| (n.as_str(), d.as_slice()))
        .collect();
    write_zip(path, &refs);
}

/// A record as the ingest pipeline would store it.
pub fn make_book(id: &str, owner: Option<&str>, file_path: &Path, hash: Option<&str>) -> Book {
    Book {
        id: id.to_string(),
        owner_id: owner.map(String::from),
        title: format!("Book {id}"),
        author: "Author".to_string(),
        series: None,
        series_index: 0.0,
        format: "epub".to_string(),
        file_path: file_path.to_string_lossy().into_owned(),
        cover_path: None,
        file_hash: hash.map(String::from),
        file_size: 0,
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

pub async fn insert_book(store: &SqliteBookStore, book: &Book) {
    store.insert(book).await.unwrap();
}
