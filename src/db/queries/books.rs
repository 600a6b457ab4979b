use crate::db::DbPool;
use crate::db::models::Book;

pub async fn get_by_id(pool: &DbPool, id: &str) -> Result<Option<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// All records sharing a content hash, oldest first.
pub async fn find_by_hash(pool: &DbPool, hash: &str) -> Result<Vec<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>(
        "SELECT * FROM books WHERE file_hash = ? ORDER BY created_at, id",
    )
    .bind(hash)
    .fetch_all(pool)
    .await
}

/// Records of one owner (or of the unowned pool when `owner` is `None`).
pub async fn get_by_owner(
    pool: &DbPool,
    owner: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>(
        "SELECT * FROM books WHERE owner_id IS ? ORDER BY created_at, id LIMIT ? OFFSET ?",
    )
    .bind(owner)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn insert(pool: &DbPool, book: &Book) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO books (id, owner_id, title, author, series, series_index, format, \
         file_path, cover_path, file_hash, file_size, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&book.id)
    .bind(&book.owner_id)
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.series)
    .bind(book.series_index)
    .bind(&book.format)
    .bind(&book.file_path)
    .bind(&book.cover_path)
    .bind(&book.file_hash)
    .bind(book.file_size)
    .bind(&book.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns whether a row was removed.
pub async fn delete(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_hash(pool: &DbPool, id: &str, hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE books SET file_hash = ? WHERE id = ?")
        .bind(hash)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_paths(
    pool: &DbPool,
    id: &str,
    file_path: &str,
    cover_path: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE books SET file_path = ?, cover_path = ? WHERE id = ?")
        .bind(file_path)
        .bind(cover_path)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_missing_hash(pool: &DbPool, owner: Option<&str>) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM books WHERE file_hash IS NULL AND owner_id IS ?",
    )
    .bind(owner)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn list_missing_hash(
    pool: &DbPool,
    owner: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>(
        "SELECT * FROM books WHERE file_hash IS NULL AND owner_id IS ? \
         ORDER BY created_at, id LIMIT ? OFFSET ?",
    )
    .bind(owner)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}
