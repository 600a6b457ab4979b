use std::sync::Arc;

use shelfkeep::db::models::Book;
use shelfkeep::dedup::{BookStore, DuplicateResolver, StoreError};
use shelfkeep::formats::BookFormat;
use shelfkeep::ingest::{IngestError, Ingestor};
use shelfkeep::organize::Organizer;

use super::*;

fn ingestor<S: BookStore + 'static>(store: Arc<S>, config: &Config) -> Ingestor<S> {
    let resolver = Arc::new(DuplicateResolver::new(store, config.dedup.batch_size));
    let organizer = Organizer::new(&config.library.root_path, &config.organize).unwrap();
    Ingestor::new(resolver, organizer)
}

const METADATA: &str = r#"<dc:title>Harbor Lights</dc:title>
    <dc:creator>Ola Berg</dc:creator>
    <meta name="calibre:series" content="Coastline"/>
    <meta name="calibre:series_index" content="2"/>"#;

#[tokio::test]
async fn prepare_then_commit_epub() {
    let staging = tempfile::tempdir().unwrap();
    let lib = tempfile::tempdir().unwrap();
    let config = test_config(lib.path());
    let store = test_store().await;
    let ingestor = ingestor(store.clone(), &config);

    let src = staging.path().join("download (1).epub");
    write_epub(&src, METADATA, &["<p>Chapter</p>"]);

    let preview = ingestor.prepare(&src, None, Some("alice")).await.unwrap();
    assert_eq!(preview.format, BookFormat::Epub);
    assert_eq!(preview.metadata.title, "Harbor Lights");
    assert!(preview.cover.is_some());
    assert!(!preview.duplicate.is_duplicate);
    assert!(src.exists(), "prepare must not move the file");

    let hash = preview.duplicate.file_hash.clone();
    let book = ingestor.commit(preview, false).await.unwrap();

    let root = ingestor.organizer().root().to_path_buf();
    let expected = root.join("Ola Berg/Coastline/Harbor Lights.epub");
    assert_eq!(PathBuf::from(&book.file_path), expected);
    assert_eq!(
        book.cover_path.as_deref().map(PathBuf::from),
        Some(root.join("Ola Berg/Coastline/Harbor Lights.jpg"))
    );
    assert_eq!(book.file_hash.as_deref(), Some(hash.as_str()));
    assert_eq!(book.owner_id.as_deref(), Some("alice"));
    assert_eq!(book.series_index, 2.0);
    assert_eq!(book.format, "epub");
    assert!(expected.exists());
    assert!(!src.exists());

    assert_eq!(store.get(&book.id).await.unwrap(), Some(book));
}

#[tokio::test]
async fn duplicate_upload_is_refused_unless_allowed() {
    let staging = tempfile::tempdir().unwrap();
    let lib = tempfile::tempdir().unwrap();
    let config = test_config(lib.path());
    let store = test_store().await;
    let ingestor = ingestor(store.clone(), &config);

    let first = staging.path().join("first.epub");
    write_epub(&first, METADATA, &["<p>Chapter</p>"]);
    let copy = staging.path().join("renamed.epub");
    std::fs::copy(&first, &copy).unwrap();

    let original = ingestor
        .commit(ingestor.prepare(&first, None, None).await.unwrap(), false)
        .await
        .unwrap();

    let preview = ingestor.prepare(&copy, None, None).await.unwrap();
    assert!(preview.duplicate.is_duplicate);
    assert_eq!(preview.duplicate.duplicates[0].id, original.id);

    let err = ingestor.commit(preview.clone(), false).await.unwrap_err();
    assert!(matches!(err, IngestError::Duplicate { existing, .. } if existing == original.id));
    assert!(copy.exists());

    let second = ingestor.commit(preview, true).await.unwrap();
    assert!(second.file_path.ends_with("Harbor Lights (2).epub"));
}

#[tokio::test]
async fn prepare_comic_from_rar_fixture() {
    let staging = tempfile::tempdir().unwrap();
    let lib = tempfile::tempdir().unwrap();
    let config = test_config(lib.path());
    let ingestor = ingestor(test_store().await, &config);

    let src = staging.path().join("upload.bin");
    std::fs::copy(test_data_dir().join("sample.cbr"), &src).unwrap();

    let preview = ingestor.prepare(&src, None, None).await.unwrap();
    assert_eq!(preview.format, BookFormat::Cbr);
    assert_eq!(preview.metadata.title, "The Long Night");
    assert_eq!(preview.metadata.page_count, Some(3));
    assert_eq!(preview.cover.as_ref().map(|c| c.extension.as_str()), Some(".jpg"));

    let book = ingestor.commit(preview, false).await.unwrap();
    assert!(book.file_path.ends_with("Jane Doe/Night Watch/The Long Night.cbr"));
}

#[tokio::test]
async fn prepare_rejects_invalid_files() {
    let staging = tempfile::tempdir().unwrap();
    let lib = tempfile::tempdir().unwrap();
    let config = test_config(lib.path());
    let ingestor = ingestor(test_store().await, &config);

    let empty_comic = staging.path().join("empty.cbz");
    write_zip(&empty_comic, &[("notes.txt", b"no pages")]);
    assert!(matches!(
        ingestor.prepare(&empty_comic, None, None).await,
        Err(IngestError::Format(_))
    ));

    assert!(matches!(
        ingestor.prepare(&staging.path().join("missing.epub"), None, None).await,
        Err(IngestError::Io { .. })
    ));
}

/// Store whose inserts always fail.
struct RejectingStore(SqliteBookStore);

impl BookStore for RejectingStore {
    async fn find_by_hash(&self, hash: &str) -> Result<Vec<Book>, StoreError> {
        self.0.find_by_hash(hash).await
    }
    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError> {
        self.0.get(id).await
    }
    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.0.delete(id).await
    }
    async fn update_hash(&self, id: &str, hash: &str) -> Result<(), StoreError> {
        self.0.update_hash(id, hash).await
    }
    async fn update_paths(
        &self,
        id: &str,
        file_path: &str,
        cover_path: Option<&str>,
    ) -> Result<(), StoreError> {
        self.0.update_paths(id, file_path, cover_path).await
    }
    async fn count_missing_hash(&self, owner: Option<&str>) -> Result<u64, StoreError> {
        self.0.count_missing_hash(owner).await
    }
    async fn list_missing_hash(
        &self,
        owner: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Book>, StoreError> {
        self.0.list_missing_hash(owner, limit, offset).await
    }
    async fn insert(&self, _book: &Book) -> Result<(), StoreError> {
        Err(StoreError::Backend("read-only".to_string()))
    }
}

#[tokio::test]
async fn failed_insert_returns_book_to_source() {
    let staging = tempfile::tempdir().unwrap();
    let lib = tempfile::tempdir().unwrap();
    let config = test_config(lib.path());
    let store = Arc::new(RejectingStore(
        SqliteBookStore::new(shelfkeep::db::create_test_pool().await),
    ));
    let ingestor = ingestor(store, &config);

    let src = staging.path().join("book.epub");
    write_epub(&src, METADATA, &["<p>x</p>"]);
    let preview = ingestor.prepare(&src, None, None).await.unwrap();

    let original = std::fs::read(&src).unwrap();

    let err = ingestor.commit(preview, false).await.unwrap_err();
    assert!(matches!(err, IngestError::Store(StoreError::Backend(_))));

    assert_eq!(std::fs::read(&src).unwrap(), original);
    let root = ingestor.organizer().root();
    assert!(!root.join("Ola Berg/Coastline/Harbor Lights.epub").exists());
    assert!(!root.join("Ola Berg/Coastline/Harbor Lights.jpg").exists());
    assert!(!root.join("Ola Berg").exists());
}
