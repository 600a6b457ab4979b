use crate::db::DbPool;
use crate::db::models::Book;
use crate::db::queries::books;
use crate::dedup::{BookStore, StoreError};

/// [`BookStore`] over the SQLite `books` table.
#[derive(Debug, Clone)]
pub struct SqliteBookStore {
    pool: DbPool,
}

impl SqliteBookStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl BookStore for SqliteBookStore {
    async fn find_by_hash(&self, hash: &str) -> Result<Vec<Book>, StoreError> {
        Ok(books::find_by_hash(&self.pool, hash).await?)
    }

    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError> {
        Ok(books::get_by_id(&self.pool, id).await?)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(books::delete(&self.pool, id).await?)
    }

    async fn update_hash(&self, id: &str, hash: &str) -> Result<(), StoreError> {
        Ok(books::update_hash(&self.pool, id, hash).await?)
    }

    async fn update_paths(
        &self,
        id: &str,
        file_path: &str,
        cover_path: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(books::update_paths(&self.pool, id, file_path, cover_path).await?)
    }

    async fn count_missing_hash(&self, owner: Option<&str>) -> Result<u64, StoreError> {
        let count = books::count_missing_hash(&self.pool, owner).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_missing_hash(
        &self,
        owner: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Book>, StoreError> {
        Ok(books::list_missing_hash(&self.pool, owner, limit, offset).await?)
    }

    async fn insert(&self, book: &Book) -> Result<(), StoreError> {
        Ok(books::insert(&self.pool, book).await?)
    }
}
