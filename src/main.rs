use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use shelfkeep::config::Config;
use shelfkeep::db::models::Book;
use shelfkeep::db::{self, SqliteBookStore};
use shelfkeep::dedup::{BookStore, DuplicateResolver};
use shelfkeep::error::AppError;
use shelfkeep::formats::{self, BookFormat, Document};
use shelfkeep::ingest::Ingestor;
use shelfkeep::organize::{Organizer, ReorganizedPaths};

const REORGANIZE_PAGE: u32 = 100;

#[derive(Parser)]
#[command(name = "shelfkeep", version, about = "EPUB/CBZ/CBR library ingestion")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print metadata and contents of a file without importing it
    Inspect {
        path: PathBuf,
        /// epub, cbz or cbr; detected when omitted
        #[arg(long)]
        format: Option<String>,
    },
    /// Print one EPUB chapter (plain text unless --raw)
    Chapter {
        path: PathBuf,
        index: i64,
        #[arg(long)]
        raw: bool,
    },
    /// Write one comic page to a file
    Page {
        path: PathBuf,
        index: i64,
        output: PathBuf,
    },
    /// Import files or directories into the library
    Ingest {
        paths: Vec<PathBuf>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        format: Option<String>,
        /// Import even when identical content is already in the library
        #[arg(long)]
        allow_duplicates: bool,
        /// Only show what would be imported
        #[arg(long)]
        dry_run: bool,
    },
    /// Check a file against the library by content hash
    Check {
        path: PathBuf,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Compute hashes for records stored without one
    Backfill {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Delete duplicate records in favour of one kept record
    Merge {
        keep: String,
        #[arg(required = true)]
        delete: Vec<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Move stored books to their canonical paths
    Reorganize {
        #[arg(long)]
        owner: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Error loading config: {e}");
        std::process::exit(1);
    });

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command, &config).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(command: Command, config: &Config) -> Result<(), AppError> {
    match command {
        Command::Inspect { path, format } => {
            let declared = parse_format(format.as_deref())?;
            let report = tokio::task::spawn_blocking(move || inspect(&path, declared)).await??;
            print_json(&report)
        }
        Command::Chapter { path, index, raw } => {
            let text = tokio::task::spawn_blocking(move || {
                if raw {
                    formats::epub::chapter_content(&path, index)
                } else {
                    formats::epub::chapter_text(&path, index)
                }
            })
            .await??;
            println!("{text}");
            Ok(())
        }
        Command::Page {
            path,
            index,
            output,
        } => {
            let page = tokio::task::spawn_blocking(move || {
                let doc = Document::open(&path, None)?;
                match doc.format() {
                    BookFormat::Cbz => formats::cbz::get_page_cbz(&path, index),
                    BookFormat::Cbr => formats::cbr::get_page_cbr(&path, index),
                    BookFormat::Epub => Err(formats::FormatError::UnsupportedFormat(
                        "pages are only available for comics".to_string(),
                    )),
                }
            })
            .await??;
            tokio::fs::write(&output, &page.data).await?;
            tracing::info!(
                "wrote page {index} ({}, {} bytes) to {}",
                page.content_type,
                page.data.len(),
                output.display()
            );
            Ok(())
        }
        Command::Ingest {
            paths,
            owner,
            format,
            allow_duplicates,
            dry_run,
        } => {
            let declared = parse_format(format.as_deref())?;
            let ingestor = build_ingestor(config).await?;
            let mut imported = 0usize;
            let mut failed = 0usize;
            for file in collect_files(&paths) {
                let preview = match ingestor.prepare(&file, declared, owner.as_deref()).await {
                    Ok(preview) => preview,
                    Err(e) => {
                        tracing::warn!("skipping {}: {e}", file.display());
                        failed += 1;
                        continue;
                    }
                };
                if dry_run {
                    print_json(&preview)?;
                    continue;
                }
                match ingestor.commit(preview, allow_duplicates).await {
                    Ok(book) => {
                        print_json(&book)?;
                        imported += 1;
                    }
                    Err(e) => {
                        tracing::warn!("not imported {}: {e}", file.display());
                        failed += 1;
                    }
                }
            }
            tracing::info!("ingest finished: imported={imported}, failed={failed}");
            Ok(())
        }
        Command::Check { path, owner } => {
            let resolver = build_resolver(config).await?;
            let result = resolver.check_for_duplicate(&path, owner.as_deref()).await?;
            print_json(&result)
        }
        Command::Backfill { owner } => {
            let resolver = build_resolver(config).await?;
            let progress = resolver.compute_missing_hashes(owner.as_deref()).await?;
            print_json(&progress)
        }
        Command::Merge {
            keep,
            delete,
            owner,
        } => {
            let resolver = build_resolver(config).await?;
            let result = resolver
                .merge_duplicates(&keep, &delete, owner.as_deref())
                .await?;
            print_json(&result)
        }
        Command::Reorganize { owner } => reorganize_all(config, owner.as_deref()).await,
    }
}

#[derive(Serialize)]
struct InspectReport {
    path: PathBuf,
    format: BookFormat,
    metadata: formats::Metadata,
    contents: formats::Contents,
    cover: Option<String>,
}

fn inspect(path: &Path, declared: Option<BookFormat>) -> Result<InspectReport, AppError> {
    let doc = Document::open(path, declared)?;
    doc.validate()?;
    let cover = doc
        .cover()?
        .map(|c| format!("{} bytes ({})", c.data.len(), c.extension));
    Ok(InspectReport {
        path: path.to_path_buf(),
        format: doc.format(),
        metadata: doc.metadata()?,
        contents: doc.contents()?,
        cover,
    })
}

async fn reorganize_all(config: &Config, owner: Option<&str>) -> Result<(), AppError> {
    let pool = db::create_pool(&config.database).await?;
    let store = SqliteBookStore::new(pool.clone());
    let organizer = Organizer::new(&config.library.root_path, &config.organize)?;

    let mut offset = 0u32;
    let mut moved = 0usize;
    let mut failed = 0usize;
    loop {
        let books = db::queries::books::get_by_owner(&pool, owner, REORGANIZE_PAGE, offset).await?;
        if books.is_empty() {
            break;
        }
        offset += REORGANIZE_PAGE;

        for book in books {
            let task_organizer = organizer.clone();
            let book_path = PathBuf::from(&book.file_path);
            let cover_path = book.cover_path.as_ref().map(PathBuf::from);
            let format = BookFormat::from_extension(&book.format);
            let result = tokio::task::spawn_blocking(move || -> Result<_, AppError> {
                let metadata = Document::open(&book_path, format)?.metadata()?;
                Ok(task_organizer.reorganize(&book_path, cover_path.as_deref(), &metadata)?)
            })
            .await?;

            let paths = match result {
                Ok(paths) => paths,
                Err(e) => {
                    tracing::warn!("cannot reorganize book {}: {e}", book.id);
                    failed += 1;
                    continue;
                }
            };

            let recorded = {
                let file_path = paths.book_path.to_string_lossy();
                let cover = paths.cover_path.as_ref().map(|p| p.to_string_lossy());
                store
                    .update_paths(&book.id, &file_path, cover.as_deref())
                    .await
            };
            if let Err(e) = recorded {
                tracing::warn!("cannot record new paths of book {}: {e}", book.id);
                failed += 1;
                restore_paths(&organizer, &book, paths).await?;
                continue;
            }
            moved += 1;
            print_json(&paths)?;
        }
    }
    tracing::info!("reorganize finished: processed={moved}, failed={failed}");
    Ok(())
}

/// Move a book (and cover) back to the paths its record still holds.
async fn restore_paths(
    organizer: &Organizer,
    book: &Book,
    paths: ReorganizedPaths,
) -> Result<(), AppError> {
    let organizer = organizer.clone();
    let old_book = PathBuf::from(&book.file_path);
    let old_cover = book.cover_path.as_ref().map(PathBuf::from);
    let id = book.id.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = organizer.undo_move(&paths.book_path, &old_book) {
            tracing::error!("book {id} left at {}: {e}", paths.book_path.display());
        }
        if let (Some(new_cover), Some(old_cover)) = (&paths.cover_path, &old_cover)
            && let Err(e) = organizer.undo_move(new_cover, old_cover)
        {
            tracing::warn!("cover of book {id} left at {}: {e}", new_cover.display());
        }
    })
    .await?;
    Ok(())
}

async fn build_resolver(config: &Config) -> Result<DuplicateResolver<SqliteBookStore>, AppError> {
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database initialized: {}", config.database.url);
    Ok(DuplicateResolver::new(
        Arc::new(SqliteBookStore::new(pool)),
        config.dedup.batch_size,
    ))
}

async fn build_ingestor(config: &Config) -> Result<Ingestor<SqliteBookStore>, AppError> {
    let resolver = build_resolver(config).await?;
    let organizer = Organizer::new(&config.library.root_path, &config.organize)?;
    Ok(Ingestor::new(Arc::new(resolver), organizer))
}

fn parse_format(raw: Option<&str>) -> Result<Option<BookFormat>, AppError> {
    match raw {
        None => Ok(None),
        Some(ext) => BookFormat::from_extension(ext)
            .map(Some)
            .ok_or_else(|| formats::FormatError::UnsupportedFormat(ext.to_string()).into()),
    }
}

/// Files given directly, plus supported files found under given directories.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("walk error: {e}");
                    continue;
                }
            };
            let supported = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .and_then(BookFormat::from_extension)
                .is_some();
            if entry.file_type().is_file() && supported {
                files.push(entry.into_path());
            }
        }
    }
    files
}

fn print_json(value: &impl Serialize) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
