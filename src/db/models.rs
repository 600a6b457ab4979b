use serde::Serialize;
use sqlx::FromRow;

/// One library record. `owner_id == None` places the book in the shared
/// (unowned) pool.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Book {
    pub id: String,
    pub owner_id: Option<String>,
    pub title: String,
    pub author: String,
    pub series: Option<String>,
    pub series_index: f64,
    /// Lowercase extension: `epub`, `cbz` or `cbr`.
    pub format: String,
    pub file_path: String,
    pub cover_path: Option<String>,
    /// Lowercase hex SHA-256 of the file; `None` until computed.
    pub file_hash: Option<String>,
    pub file_size: i64,
    /// RFC 3339.
    pub created_at: String,
}
