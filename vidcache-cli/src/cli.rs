use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Local video cache for the clinic education app",
    long_about = "Resolves catalog videos to local files, downloading them only when no\n\
                  valid copy is cached, and evicts cached videos on request.\n\
                  \n\
                  Metadata is kept in a key-value directory shared with other app data;\n\
                  videos are stored as <documents-dir>/<video-id>.mp4."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Directory downloaded videos are written to
    #[arg(long, global = true, help = "Directory for downloaded videos")]
    pub documents_dir: Option<PathBuf>,

    /// Directory of the metadata key-value store
    #[arg(long, global = true, help = "Directory for cache metadata")]
    pub metadata_dir: Option<PathBuf>,

    /// Namespace prefix for metadata keys
    #[arg(long, global = true, default_value = vidcache_engine::cache::DEFAULT_KEY_PREFIX)]
    pub key_prefix: String,

    /// Start a separate download for every concurrent miss
    #[arg(long, global = true, help = "Disable coalescing of concurrent downloads")]
    pub no_coalesce: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value = "0",
        help = "Overall timeout in seconds for a download (0 disables it)"
    )]
    pub timeout: u64,

    #[arg(
        long,
        global = true,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    #[arg(
        long,
        global = true,
        default_value = "30",
        help = "Read timeout in seconds (maximum time between receiving data chunks)"
    )]
    pub read_timeout: u64,

    #[arg(
        long,
        global = true,
        default_value = "0",
        help = "Retry attempts after connection errors or 5xx responses"
    )]
    pub retries: u32,

    #[arg(
        long,
        global = true,
        help = "Ignore HTTP(S)_PROXY environment variables for downloads"
    )]
    pub no_proxy: bool,

    #[arg(
        long = "header",
        short = 'H',
        global = true,
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a local path for a video, downloading it on a cache miss
    Resolve {
        video_id: String,
        url: String,
    },
    /// Delete a cached video and its metadata
    Evict { video_id: String },
    /// Show the metadata of a cached video
    Show { video_id: String },
    /// List every cached video
    List,
    /// Evict every cached video
    Purge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_global_flags() {
        let args = CliArgs::try_parse_from([
            "vidcache",
            "resolve",
            "abc123",
            "https://host/v.mp4",
            "--documents-dir",
            "/tmp/docs",
            "-H",
            "Authorization: Bearer t",
            "--no-proxy",
        ])
        .unwrap();

        assert!(matches!(
            args.command,
            Command::Resolve { ref video_id, ref url } if video_id == "abc123" && url == "https://host/v.mp4"
        ));
        assert_eq!(args.documents_dir, Some(PathBuf::from("/tmp/docs")));
        assert_eq!(args.headers, vec!["Authorization: Bearer t".to_string()]);
        assert!(args.no_proxy);
        assert_eq!(args.key_prefix, "video_metadata_");
    }

    #[test]
    fn test_resolve_requires_url() {
        assert!(CliArgs::try_parse_from(["vidcache", "resolve", "abc123"]).is_err());
    }
}
