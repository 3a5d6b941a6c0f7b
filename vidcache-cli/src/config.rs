use std::time::Duration;

use tracing::info;
use vidcache_engine::{CacheConfig, DownloaderConfig};

use crate::cli::CliArgs;
use crate::utils::parse_headers;

/// Cache layout from the command line
pub fn cache_config(args: &CliArgs) -> CacheConfig {
    CacheConfig {
        document_dir: args.documents_dir.clone(),
        metadata_dir: args.metadata_dir.clone(),
        key_prefix: args.key_prefix.clone(),
        coalesce_downloads: !args.no_coalesce,
        ..CacheConfig::default()
    }
}

/// HTTP settings from the command line
pub fn downloader_config(args: &CliArgs) -> DownloaderConfig {
    let mut builder = DownloaderConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_read_timeout(Duration::from_secs(args.read_timeout))
        .with_max_retries(args.retries)
        .with_headers(parse_headers(&args.headers));

    if args.no_proxy {
        info!("Proxy environment variables ignored (--no-proxy flag)");
        builder = builder.with_system_proxy(false);
    }

    builder.build()
}
