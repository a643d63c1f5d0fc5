//! Command-line interface definitions for News Reel.
//!
//! Global options select the day, the run-slot and the config file; the
//! subcommand selects the stage. Options that name endpoints can also be
//! provided via environment variables.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the News Reel pipeline.
///
/// # Examples
///
/// ```sh
/// # Everything for the morning slot of today
/// news_reel run
///
/// # Re-render the afternoon edition of a past day
/// news_reel --today 20250601 --times 1 --rewrite video
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Day to process as YYYYMMDD (defaults to the local date)
    #[arg(long, global = true)]
    pub today: Option<String>,

    /// Run-slot index within the day, selects edition name, voice and presenter
    #[arg(long, global = true, default_value_t = 0)]
    pub times: u32,

    /// Regenerate outputs that already exist
    #[arg(long, global = true)]
    pub rewrite: bool,

    /// Optional path to a YAML config file
    #[arg(short, long, global = true, env = "NEWS_REEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Chat webhook for operator notifications
    #[arg(long, global = true, env = "NEWS_REEL_WEBHOOK")]
    pub webhook_url: Option<String>,

    /// Base URL of the Ollama-compatible generation endpoint
    #[arg(long, global = true, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Discover, filter and store new articles for every source
    Crawl,
    /// Summarize crawled articles and build the edition file
    Summarize,
    /// Render the narrated edition video
    Video,
    /// Publish the day's finished editions
    Upload,
    /// Delete day folders past the retention window
    Sweep,
    /// Crawl, summarize, render and upload in sequence
    Run,
}
