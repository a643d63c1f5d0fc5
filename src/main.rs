//! # News Reel
//!
//! A daily news-video pipeline: crawl a fixed set of news sites, keep the
//! articles that pass content filters, summarize them with a locally hosted
//! LLM, narrate the summaries, and assemble one composited video per
//! edition.
//!
//! ## Usage
//!
//! ```sh
//! news_reel --times 0 run
//! ```
//!
//! ## Architecture
//!
//! The application runs as sequential stages sharing files on disk:
//! 1. **Crawl**: discover and extract articles per source, download images
//! 2. **Summarize**: translate titles, summarize bodies, merge the edition
//! 3. **Video**: narrate and render clips, concatenate with intro and outro
//! 4. **Upload**: publish finished editions (feature `upload`)
//! 5. **Sweep**: drop day folders past the retention window
//!
//! A failing stage is logged and the next stage still runs.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod curator;
mod filters;
mod models;
mod notify;
mod outputs;
mod retention;
mod scrapers;
mod summarize;
mod tts;
mod upload;
mod utils;
mod video;
mod visited;

use api::OllamaClient;
use cli::{Cli, Command};
use config::{PipelineConfig, RunContext, parse_day};
use notify::Notifier;
use scrapers::{Fetcher, Scraper};
use summarize::SummaryClient;
use utils::ensure_writable_dir;
use video::Assembler;

#[instrument(level = "info", skip_all)]
async fn crawl(config: &PipelineConfig, ctx: &RunContext) -> Result<(), Box<dyn Error>> {
    let fetcher = Fetcher::new(&config.crawl)?;
    let sources: Vec<Scraper> = config
        .crawl
        .sources
        .iter()
        .map(|kind| Scraper::new(*kind, ctx.times, &config.crawl, fetcher.clone()))
        .collect();
    let added = curator::crawl_all(config, ctx, &sources).await;
    info!(added, "Crawl stage complete");
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn summarize(config: &PipelineConfig, ctx: &RunContext) -> Result<(), Box<dyn Error>> {
    let client = SummaryClient::new(OllamaClient::new(&config.llm)?, &config.llm);
    let path = summarize::summarize_all(&client, config, ctx).await?;
    info!(path = %path.display(), "Summarize stage complete");
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn render(config: &PipelineConfig, ctx: &RunContext) -> Result<(), Box<dyn Error>> {
    ensure_writable_dir(&config.paths.final_videos_dir).await?;
    let client = SummaryClient::new(OllamaClient::new(&config.llm)?, &config.llm);
    match Assembler::new(config, ctx, &client).assemble().await? {
        Some(path) => info!(path = %path.display(), "Video stage complete"),
        None => warn!("Video stage produced nothing"),
    }
    Ok(())
}

/// Stages executed for a subcommand, in order.
fn stages(command: Command) -> Vec<Command> {
    match command {
        Command::Run => vec![
            Command::Crawl,
            Command::Summarize,
            Command::Video,
            Command::Upload,
            Command::Sweep,
        ],
        single => vec![single],
    }
}

async fn run_stage(stage: Command, config: &PipelineConfig, ctx: &RunContext, notifier: &Notifier) {
    let result = match stage {
        Command::Crawl => crawl(config, ctx).await,
        Command::Summarize => summarize(config, ctx).await,
        Command::Video => render(config, ctx).await,
        Command::Upload => upload::upload_all(config, ctx, notifier).await,
        Command::Sweep => retention::sweep(&config.paths.news_dir, ctx.today, config.paths.retention_days)
            .await
            .map(|_| ()),
        Command::Run => Ok(()),
    };
    if let Err(e) = result {
        error!(stage = ?stage, error = %e, "Stage failed");
    }
}

#[tokio::main]
#[instrument]
async fn main() {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_reel starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut config = match PipelineConfig::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return;
        }
    };
    if let Some(url) = args.ollama_url.clone() {
        config.llm.base_url = url;
    }
    if args.webhook_url.is_some() {
        config.upload.webhook_url = args.webhook_url.clone();
    }

    let today = match args.today.as_deref().map(parse_day) {
        None => chrono::Local::now().date_naive(),
        Some(Ok(day)) => day,
        Some(Err(e)) => {
            error!(today = ?args.today, error = %e, "Invalid --today; expected YYYYMMDD");
            return;
        }
    };
    let ctx = RunContext::new(today, args.times, args.rewrite);
    info!(
        day = %ctx.day(),
        times = ctx.times,
        edition = ctx.edition_name(),
        rewrite = ctx.rewrite,
        stage = ?args.command,
        "Run context ready"
    );

    let notifier = Notifier::new(config.upload.webhook_url.clone());
    debug!(webhook = notifier.is_enabled(), "Notifier ready");
    for stage in stages(args.command) {
        run_stage(stage, &config, &ctx, &notifier).await;
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_expands_to_every_stage_in_order() {
        assert_eq!(
            stages(Command::Run),
            vec![
                Command::Crawl,
                Command::Summarize,
                Command::Video,
                Command::Upload,
                Command::Sweep
            ]
        );
        assert_eq!(stages(Command::Video), vec![Command::Video]);
    }
}
