//! Two-step ingest: `prepare` inspects a file without touching the library,
//! `commit` places it and records it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::db::models::Book;
use crate::dedup::{BookStore, DedupError, DuplicateCheckResult, DuplicateResolver, StoreError};
use crate::formats::{BookFormat, CoverImage, Document, FormatError, Metadata};
use crate::organize::{OrganizeError, Organizer};

/// Everything learned about a file before it enters the library.
#[derive(Debug, Clone, Serialize)]
pub struct IngestPreview {
    pub source: PathBuf,
    pub format: BookFormat,
    pub metadata: Metadata,
    #[serde(skip)]
    pub cover: Option<CoverImage>,
    pub file_size: u64,
    pub duplicate: DuplicateCheckResult,
    pub owner: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Dedup(#[from] DedupError),
    #[error(transparent)]
    Organize(#[from] OrganizeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{path} duplicates existing book {existing}")]
    Duplicate { path: PathBuf, existing: String },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct Ingestor<S: BookStore> {
    store: Arc<S>,
    resolver: Arc<DuplicateResolver<S>>,
    organizer: Organizer,
}

impl<S: BookStore + 'static> Ingestor<S> {
    pub fn new(resolver: Arc<DuplicateResolver<S>>, organizer: Organizer) -> Self {
        Self {
            store: Arc::clone(resolver.store()),
            resolver,
            organizer,
        }
    }

    pub fn organizer(&self) -> &Organizer {
        &self.organizer
    }

    /// Detect, validate and parse `path`, then check it for duplicates.
    ///
    /// A missing or unreadable cover does not fail the preview.
    pub async fn prepare(
        &self,
        path: &Path,
        declared: Option<BookFormat>,
        owner: Option<&str>,
    ) -> Result<IngestPreview, IngestError> {
        let file_size = tokio::fs::metadata(path)
            .await
            .map_err(|source| IngestError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let owned = path.to_path_buf();
        let (format, metadata, cover) =
            tokio::task::spawn_blocking(move || -> Result<_, FormatError> {
                let doc = Document::open(&owned, declared)?;
                doc.validate()?;
                let metadata = doc.metadata()?;
                let cover = match doc.cover() {
                    Ok(cover) => cover,
                    Err(e) => {
                        warn!(path = %owned.display(), error = %e, "cover extraction failed");
                        None
                    }
                };
                Ok((doc.format(), metadata, cover))
            })
            .await??;

        let duplicate = self.resolver.check_for_duplicate(path, owner).await?;
        info!(
            path = %path.display(),
            format = %format,
            title = %metadata.title,
            duplicate = duplicate.is_duplicate,
            "prepared file"
        );

        Ok(IngestPreview {
            source: path.to_path_buf(),
            format,
            metadata,
            cover,
            file_size,
            duplicate,
            owner: owner.map(String::from),
        })
    }

    /// Move the previewed file into the library and record it.
    ///
    /// Duplicates are refused unless `allow_duplicate` is set. The cover is
    /// written next to the book on a best-effort basis. If the record cannot
    /// be stored, the placed files are removed again.
    pub async fn commit(
        &self,
        preview: IngestPreview,
        allow_duplicate: bool,
    ) -> Result<Book, IngestError> {
        if preview.duplicate.is_duplicate && !allow_duplicate {
            let existing = preview
                .duplicate
                .duplicates
                .first()
                .map(|b| b.id.clone())
                .unwrap_or_default();
            return Err(IngestError::Duplicate {
                path: preview.source,
                existing,
            });
        }

        let organizer = self.organizer.clone();
        let source = preview.source.clone();
        let metadata = preview.metadata.clone();
        let cover = preview.cover.clone();
        let ext = preview.format.extension();
        let (book_path, cover_path) = tokio::task::spawn_blocking(
            move || -> Result<(PathBuf, Option<PathBuf>), OrganizeError> {
                let book_path = organizer.place_new(&source, &metadata, ext)?;
                let cover_path = cover.and_then(|cover| {
                    match organizer.place_cover(&book_path, &cover) {
                        Ok(path) => Some(path),
                        Err(e) => {
                            warn!(book = %book_path.display(), error = %e, "failed to store cover");
                            None
                        }
                    }
                });
                Ok((book_path, cover_path))
            },
        )
        .await??;

        let meta = preview.metadata;
        let book = Book {
            id: new_book_id(),
            owner_id: preview.owner,
            title: meta.title,
            author: meta.author,
            series: meta.series,
            series_index: meta.series_index,
            format: ext.to_string(),
            file_path: book_path.to_string_lossy().into_owned(),
            cover_path: cover_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            file_hash: Some(preview.duplicate.file_hash),
            file_size: i64::try_from(preview.file_size).unwrap_or(i64::MAX),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        if let Err(e) = self.store.insert(&book).await {
            self.roll_back(book_path, cover_path, preview.source).await;
            return Err(e.into());
        }

        info!(id = %book.id, path = %book.file_path, "ingested book");
        Ok(book)
    }

    /// Return the book to where it came from and drop the cover written for
    /// it. Failures are logged; the book file is never deleted.
    async fn roll_back(&self, book_path: PathBuf, cover_path: Option<PathBuf>, source: PathBuf) {
        let organizer = self.organizer.clone();
        let undone = tokio::task::spawn_blocking(move || {
            if let Some(cover) = &cover_path
                && let Err(e) = organizer.discard(cover)
            {
                warn!(path = %cover.display(), error = %e, "failed to remove placed cover");
            }
            if let Err(e) = organizer.undo_move(&book_path, &source) {
                warn!(
                    placed = %book_path.display(),
                    source = %source.display(),
                    error = %e,
                    "failed to move book back, it stays in the library"
                );
            }
        })
        .await;
        if let Err(e) = undone {
            warn!(error = %e, "rollback task failed");
        }
    }
}

/// Random-looking, unique record id: SHA-256 over time, a process-wide
/// counter and the pid, first 32 hex digits.
pub fn new_book_id() -> String {
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();

    let mut hasher = Sha256::new();
    hasher.update(b"book-id:");
    hasher.update(ts.to_le_bytes());
    hasher.update(count.to_le_bytes());
    hasher.update(pid.to_le_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(32);
    id
}
