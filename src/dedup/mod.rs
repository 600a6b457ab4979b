//! Content-hash identity: hashing, duplicate lookup, hash backfill and
//! merging of duplicate records.

mod hasher;
mod resolver;
mod store;

use std::path::PathBuf;

pub use self::hasher::{hash_file, hash_reader};
pub use self::resolver::{DuplicateCheckResult, DuplicateResolver, HashProgress, MergeResult};
pub use self::store::{BookStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("book {book_id} does not belong to the requesting owner")]
    NotOwner { book_id: String },
    #[error("book not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
