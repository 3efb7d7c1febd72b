use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "yt-transcript-api",
    about = "HTTP API returning YouTube transcripts as JSON",
    version
)]
pub struct Cli {
    /// Address to listen on [default: 127.0.0.1:3000]
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Caption language used when a request names none [default: pl]
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Read configuration from this file instead of the default location
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}
