use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::hasher::hash_file;
use super::store::BookStore;
use super::DedupError;
use crate::db::models::Book;

/// Outcome of checking one file against the library.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCheckResult {
    pub is_duplicate: bool,
    pub file_hash: String,
    /// Existing records with the same hash in the caller's scope, oldest first.
    pub duplicates: Vec<Book>,
}

/// Counters of a hash backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HashProgress {
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeResult {
    pub kept_book: Book,
    /// Ids actually removed, in request order.
    pub deleted_books: Vec<String>,
    /// Book and cover files deleted from disk.
    pub files_removed: usize,
}

#[derive(Default)]
struct ProgressCounters {
    total: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl ProgressCounters {
    fn reset(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HashProgress {
        HashProgress {
            total: self.total.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Duplicate detection and cleanup keyed on content hash.
///
/// One backfill runs at a time per resolver; a second caller waits for the
/// running one to finish and then starts its own pass.
pub struct DuplicateResolver<S: BookStore> {
    store: Arc<S>,
    batch_size: u32,
    backfill_lock: Mutex<()>,
    progress: ProgressCounters,
}

impl<S: BookStore> DuplicateResolver<S> {
    pub fn new(store: Arc<S>, batch_size: u32) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            backfill_lock: Mutex::new(()),
            progress: ProgressCounters::default(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Hash `path` and look up records with the same bytes.
    ///
    /// Only records in the caller's scope count: the owner's own books, or
    /// the unowned pool when `owner` is `None`.
    pub async fn check_for_duplicate(
        &self,
        path: &Path,
        owner: Option<&str>,
    ) -> Result<DuplicateCheckResult, DedupError> {
        let file_hash = hash_path(path).await?;
        let duplicates: Vec<Book> = self
            .store
            .find_by_hash(&file_hash)
            .await?
            .into_iter()
            .filter(|b| b.owner_id.as_deref() == owner)
            .collect();

        if !duplicates.is_empty() {
            info!(
                path = %path.display(),
                hash = %file_hash,
                matches = duplicates.len(),
                "duplicate content detected"
            );
        }
        Ok(DuplicateCheckResult {
            is_duplicate: !duplicates.is_empty(),
            file_hash,
            duplicates,
        })
    }

    /// Fill in hashes for records stored without one.
    ///
    /// Records are fetched in batches. A record whose file cannot be hashed
    /// or whose update fails is counted in `failed` and skipped; the run
    /// keeps going.
    pub async fn compute_missing_hashes(
        &self,
        owner: Option<&str>,
    ) -> Result<HashProgress, DedupError> {
        let _running = self.backfill_lock.lock().await;

        let total = self.store.count_missing_hash(owner).await?;
        self.progress.reset(total);
        info!(total, owner = owner.unwrap_or("<unowned>"), "hash backfill started");

        // Hashed records drop out of the listing; failed ones stay, so the
        // window moves past them.
        let mut offset: u32 = 0;
        loop {
            let batch = self
                .store
                .list_missing_hash(owner, self.batch_size, offset)
                .await?;
            if batch.is_empty() {
                break;
            }

            for book in batch {
                match self.backfill_one(&book).await {
                    Ok(()) => {
                        self.progress.processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!(book_id = %book.id, path = %book.file_path, error = %e, "hash backfill failed");
                        self.progress.failed.fetch_add(1, Ordering::Relaxed);
                        offset = offset.saturating_add(1);
                    }
                }
            }
        }

        let progress = self.progress.snapshot();
        info!(
            total = progress.total,
            processed = progress.processed,
            failed = progress.failed,
            "hash backfill finished"
        );
        Ok(progress)
    }

    async fn backfill_one(&self, book: &Book) -> Result<(), DedupError> {
        let hash = hash_path(Path::new(&book.file_path)).await?;
        self.store.update_hash(&book.id, &hash).await?;
        debug!(book_id = %book.id, hash = %hash, "stored content hash");
        Ok(())
    }

    /// Counters of the current (or last finished) backfill run.
    pub fn progress(&self) -> HashProgress {
        self.progress.snapshot()
    }

    /// Delete `delete_ids` in favour of `keep_id`.
    ///
    /// A candidate is removed only when it shares the kept record's owner and
    /// content hash; anything else (including `keep_id` itself and ids that
    /// fail to load) is skipped with a warning. Each removal deletes the row
    /// first and then, best effort, the book and cover files, except files
    /// the kept record also points at. Removals are
    /// not rolled back if a later candidate fails.
    pub async fn merge_duplicates(
        &self,
        keep_id: &str,
        delete_ids: &[String],
        owner: Option<&str>,
    ) -> Result<MergeResult, DedupError> {
        let kept_book = self
            .store
            .get(keep_id)
            .await?
            .ok_or_else(|| DedupError::NotFound(keep_id.to_string()))?;
        if let Some(owner) = owner
            && kept_book.owner_id.as_deref() != Some(owner)
        {
            return Err(DedupError::NotOwner {
                book_id: keep_id.to_string(),
            });
        }
        if kept_book.file_hash.is_none() {
            warn!(book_id = keep_id, "kept book has no content hash; nothing can be merged into it");
        }

        let mut deleted_books = Vec::new();
        let mut files_removed = 0;

        for id in delete_ids {
            if id == keep_id {
                continue;
            }
            let candidate = match self.store.get(id).await {
                Ok(Some(book)) => book,
                Ok(None) => {
                    warn!(book_id = %id, "merge candidate not found, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(book_id = %id, error = %e, "failed to load merge candidate, skipping");
                    continue;
                }
            };
            if candidate.owner_id != kept_book.owner_id {
                warn!(book_id = %id, "merge candidate has a different owner, skipping");
                continue;
            }
            if candidate.file_hash.is_none() || candidate.file_hash != kept_book.file_hash {
                warn!(book_id = %id, "merge candidate content differs, skipping");
                continue;
            }

            match self.store.delete(id).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(book_id = %id, "merge candidate vanished before delete");
                    continue;
                }
                Err(e) => {
                    warn!(book_id = %id, error = %e, "failed to delete merge candidate");
                    continue;
                }
            }
            deleted_books.push(id.clone());

            let kept_files = [Some(kept_book.file_path.as_str()), kept_book.cover_path.as_deref()];
            let files = std::iter::once(candidate.file_path.as_str())
                .chain(candidate.cover_path.as_deref())
                .filter(|f| !kept_files.contains(&Some(*f)));
            for file in files {
                if remove_if_present(Path::new(file)).await {
                    files_removed += 1;
                }
            }
        }

        info!(
            kept = keep_id,
            deleted = deleted_books.len(),
            files_removed,
            "merged duplicates"
        );
        Ok(MergeResult {
            kept_book,
            deleted_books,
            files_removed,
        })
    }
}

async fn hash_path(path: &Path) -> Result<String, DedupError> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file(&owned))
        .await?
        .map_err(|source| DedupError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Remove a file; a missing file is not an error. Returns whether a file
/// was deleted.
async fn remove_if_present(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove duplicate file");
            false
        }
    }
}
