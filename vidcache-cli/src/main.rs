use std::path::Path;

use clap::Parser;
use error::AppError;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use vidcache_engine::{CacheHandler, Eviction, VideoMetadataRecord};

mod cli;
mod config;
mod error;
mod utils;

use cli::{CliArgs, Command};
use utils::format_bytes;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn init_logging(args: &CliArgs) -> Result<(), AppError> {
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // Logs go to stderr so stdout only carries command output
    let result = match &args.log_file {
        Some(path) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_writer(MakeWriterExt::and(std::io::stderr, log_file))
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        None => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    result.map_err(|e| AppError::Initialization(e.to_string()))
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();
    init_logging(&args)?;

    let cache_config = config::cache_config(&args);
    let downloader_config = config::downloader_config(&args);
    let handler = CacheHandler::from_config(cache_config, downloader_config)?;

    match args.command {
        Command::Resolve { video_id, url } => {
            let resolved = handler.resolve(&video_id, &url).await?;
            info!(video_id = %video_id, status = %resolved.status, "Video ready");
            println!("{}\t{}", resolved.status, resolved.path.display());
        }
        Command::Evict { video_id } => match handler.evict(&video_id).await? {
            Eviction::NotCached => println!("{video_id}: not cached"),
            Eviction::Evicted { path, file_deleted } => {
                let path = path.map(|p| p.display().to_string()).unwrap_or_default();
                if file_deleted {
                    println!("{video_id}: evicted {path}");
                } else {
                    println!("{video_id}: metadata removed, file already gone {path}");
                }
            }
        },
        Command::Show { video_id } => match handler.lookup(&video_id).await? {
            Some(record) => print_record(&record).await,
            None => {
                return Err(AppError::InvalidInput(format!(
                    "video '{video_id}' is not cached"
                )));
            }
        },
        Command::List => {
            let mut records = handler.cached_videos().await?;
            records.sort_by(|a, b| a.video_id.cmp(&b.video_id));
            for record in &records {
                print_record(record).await;
            }
            info!(count = records.len(), "Listed cached videos");
        }
        Command::Purge => {
            let evicted = handler.evict_all().await?;
            println!("evicted {evicted} video(s)");
        }
    }

    Ok(())
}

async fn print_record(record: &VideoMetadataRecord) {
    let size = file_size(&record.local_path)
        .await
        .map(format_bytes)
        .unwrap_or_else(|| "missing".to_string());

    println!(
        "{}\t{}\t{}\t{}",
        record.video_id,
        record.fetched_at.to_rfc3339(),
        size,
        record.local_path.display()
    );
}

async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}
