pub mod archive;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod formats;
pub mod ingest;
pub mod organize;
pub mod text;
