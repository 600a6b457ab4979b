use crate::dedup::{DedupError, StoreError};
use crate::formats::FormatError;
use crate::ingest::IngestError;
use crate::organize::OrganizeError;

/// Top-level error of the command-line front end.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Dedup(#[from] DedupError),

    #[error(transparent)]
    Organize(#[from] OrganizeError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),
}
