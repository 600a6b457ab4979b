use std::future::Future;

use crate::db::models::Book;

/// Persistence collaborator for book records.
///
/// Owner scope: `Some(owner)` limits a query to that owner's records, `None`
/// to the unowned pool.
pub trait BookStore: Send + Sync {
    /// Every record with this content hash, regardless of owner.
    fn find_by_hash(&self, hash: &str) -> impl Future<Output = Result<Vec<Book>, StoreError>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Result<Option<Book>, StoreError>> + Send;

    /// Returns whether a record was removed.
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn update_hash(&self, id: &str, hash: &str)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    fn update_paths(
        &self,
        id: &str,
        file_path: &str,
        cover_path: Option<&str>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn count_missing_hash(
        &self,
        owner: Option<&str>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn list_missing_hash(
        &self,
        owner: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> impl Future<Output = Result<Vec<Book>, StoreError>> + Send;

    fn insert(&self, book: &Book) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    Backend(String),
}
