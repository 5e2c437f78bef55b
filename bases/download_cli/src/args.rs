// bases/download_cli/src/args.rs
use clap::Parser;
use std::path::PathBuf;

/// Download every track of a playlist as tagged audio files
#[derive(Parser, Debug, Clone)]
#[command(name = "playlist-dl", author, version, about, long_about = None)]
pub struct CliArgs {
    /// Playlist link (`https://open.spotify.com/playlist/...`), URI or id
    pub playlist: String,

    /// Directory holding exported playlists as `<playlist id>.json`
    #[arg(long)]
    pub playlist_dir: PathBuf,

    /// Directory to store downloaded files
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Staging directory for in-progress downloads (defaults to `<output-dir>/temp`)
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Tracks downloaded at the same time
    #[arg(short = 'j', long, default_value_t = 1)]
    pub max_concurrent: usize,

    /// Accepted difference between a source's duration and the track's, in seconds
    #[arg(long, default_value_t = 30)]
    pub tolerance: u64,

    /// Retries per source after a transient failure
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Largest artwork edge in pixels
    #[arg(long, default_value_t = 800)]
    pub artwork_size: u32,

    /// Search results considered per track
    #[arg(long, default_value_t = 3)]
    pub search_results: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
