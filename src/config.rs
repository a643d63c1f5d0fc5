//! Run configuration.
//!
//! Two layers feed every stage:
//! - [`RunContext`]: what this invocation is about (day, run-slot, rewrite flag),
//!   built from the command line.
//! - [`PipelineConfig`]: how the pipeline behaves (paths, model endpoint,
//!   thresholds, keyword lists, media assets), loaded from an optional YAML
//!   file with defaults for every field.
//!
//! Both are immutable once built and are passed by reference into each
//! component, so nothing run-scoped lives in globals.
//!
//! # On-disk layout
//!
//! ```text
//! {news_dir}/
//! ├── end.mp4 / end.mp3                       # shared outro
//! └── 20250601/
//!     ├── all.json                            # daily digest
//!     ├── new_articles0.json                  # merged edition for run-slot 0
//!     ├── 0introduction.mp4 / .mp3
//!     └── bbc0/
//!         ├── news_results.json
//!         ├── news_results_processed.json
//!         └── 0000/                           # per-article images, audio, clip
//! {final_videos_dir}/
//! ├── 20250601_0_final.mp4
//! └── 20250601_uploads.json
//! {visited_dir}/202506_visited_urls.json
//! ```

use crate::scrapers::SourceKind;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const NEWS_JSON_FILE_NAME: &str = "news_results.json";
pub const PROCESSED_NEWS_JSON_FILE_NAME: &str = "news_results_processed.json";
pub const AUDIO_FILE_NAME: &str = "summary_audio.mp3";
pub const CLIP_FILE_NAME: &str = "video.mp4";

/// Edition names by run-slot. Slots past the table fall back to the last name.
const EDITION_NAMES: [&str; 4] = ["晨间全球快讯", "午间全球快讯", "晚间全球快讯", "深夜全球快讯"];

/// What a single invocation works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// The day being processed.
    pub today: NaiveDate,
    /// Run-slot index; namespaces source folders, editions and voice selection.
    pub times: u32,
    /// Regenerate cached outputs (audio, clips, processed batches, final video).
    pub rewrite: bool,
}

impl RunContext {
    pub fn new(today: NaiveDate, times: u32, rewrite: bool) -> Self {
        Self { today, times, rewrite }
    }

    /// `YYYYMMDD`, the day-folder name.
    pub fn day(&self) -> String {
        self.today.format("%Y%m%d").to_string()
    }

    /// `YYYYMM`, the visited-set scope.
    pub fn year_month(&self) -> String {
        format!("{:04}{:02}", self.today.year(), self.today.month())
    }

    pub fn edition_name(&self) -> &'static str {
        let idx = (self.times as usize).min(EDITION_NAMES.len() - 1);
        EDITION_NAMES[idx]
    }
}

/// Parse a `YYYYMMDD` day string.
pub fn parse_day(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub crawl: CrawlConfig,
    pub filters: FilterConfig,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub video: VideoConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub news_dir: PathBuf,
    pub final_videos_dir: PathBuf,
    pub visited_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// Day folders older than this many days are removed by the sweep.
    pub retention_days: i64,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            news_dir: PathBuf::from("news_p"),
            final_videos_dir: PathBuf::from("final_videos"),
            visited_dir: PathBuf::from("."),
            temp_dir: PathBuf::from("temp"),
            retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Maximum candidates examined, and maximum articles kept, per source.
    pub batch_size: usize,
    /// Sources crawled by the `crawl` stage.
    pub sources: Vec<SourceKind>,
    pub proxy: Option<String>,
    pub page_timeout_secs: u64,
    pub image_timeout_secs: u64,
    /// Per-source override of the politeness delay upper bound, in seconds.
    pub politeness_secs: HashMap<SourceKind, u64>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            batch_size: 15,
            sources: vec![
                SourceKind::Bbc,
                SourceKind::AlJazeera,
                SourceKind::Rt,
                SourceKind::ChinaDailyEn,
            ],
            proxy: None,
            page_timeout_secs: 10,
            image_timeout_secs: 7,
            politeness_secs: HashMap::new(),
        }
    }
}

impl CrawlConfig {
    pub fn politeness_for(&self, kind: SourceKind) -> u64 {
        self.politeness_secs
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_politeness_secs())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Native-language keywords; text hitting more than one is rejected.
    pub native_keywords: Vec<String>,
    /// Foreign-language terms; a single hit rejects.
    pub foreign_keywords: Vec<String>,
    pub min_title_chars: usize,
    pub min_body_chars: usize,
    /// Summaries whose Latin-letter fraction is above this are hidden.
    pub latin_fraction_limit: f64,
    /// Summaries containing all of these phrases are hidden.
    pub boilerplate_phrases: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            native_keywords: ["平", "%%%", "习", "县", "杀", "总书记", "近"]
                .into_iter()
                .map(String::from)
                .collect(),
            foreign_keywords: vec!["Jinping".to_string()],
            min_title_chars: 2,
            min_body_chars: 8,
            latin_fraction_limit: 0.4,
            boilerplate_phrases: vec!["版权声明".to_string(), "授权".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Total attempts per generation call (not retries after the first).
    pub attempts: usize,
    pub timeout_secs: u64,
    pub summary_max_chars: usize,
    pub topic_max_chars: usize,
    /// Foreign bodies are cut to this many characters before prompting.
    pub foreign_input_max_chars: usize,
    /// Passed through verbatim as the request's `options`.
    pub options: serde_json::Value,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "deepseek-r1:8b".to_string(),
            attempts: 3,
            timeout_secs: 300,
            summary_max_chars: 150,
            topic_max_chars: 66,
            foreign_input_max_chars: 3000,
            options: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TtsConfig {
    pub program: String,
    /// Voice per run-slot, cycled.
    pub voices: Vec<String>,
    /// Speech rate increase in percent.
    pub rate: i32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            program: "edge-tts".to_string(),
            voices: vec![
                "zh-CN-XiaoxiaoNeural".to_string(),
                "zh-CN-XiaoyiNeural".to_string(),
                "zh-TW-HsiaoChenNeural".to_string(),
                "zh-TW-HsiaoYuNeural".to_string(),
            ],
            rate: 70,
        }
    }
}

impl TtsConfig {
    pub fn voice_for(&self, times: u32) -> &str {
        if self.voices.is_empty() {
            return "zh-CN-XiaoxiaoNeural";
        }
        &self.voices[times as usize % self.voices.len()]
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VideoConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub font: PathBuf,
    /// Looping presenter overlays per run-slot, cycled.
    pub presenters: Vec<PathBuf>,
    pub frame_color: String,
    pub panel_color: String,
    /// Clips with narration shorter than this are dropped.
    pub min_clip_secs: f64,
    pub outro_narration: String,
    pub outro_caption: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            width: 1920,
            height: 1080,
            fps: 40,
            font: PathBuf::from("./font/simhei.ttf"),
            presenters: vec![PathBuf::from("videos/lady_announcer.mp4")],
            frame_color: "#FF9900".to_string(),
            panel_color: "#FCFEFE".to_string(),
            min_clip_secs: 2.0,
            outro_narration: "今天的信息，至此结束，下次见".to_string(),
            outro_caption: "谢谢收看".to_string(),
        }
    }
}

impl VideoConfig {
    pub fn presenter_for(&self, times: u32) -> Option<&Path> {
        if self.presenters.is_empty() {
            return None;
        }
        Some(self.presenters[times as usize % self.presenters.len()].as_path())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    pub home_url: String,
    pub upload_url: String,
    pub session_path: PathBuf,
    pub qrcode_path: PathBuf,
    pub headless: bool,
    pub login_timeout_secs: u64,
    pub webhook_url: Option<String>,
    pub tags: Vec<String>,
    pub category: String,
    pub source_hint: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            home_url: "https://www.bilibili.com/".to_string(),
            upload_url: "https://member.bilibili.com/platform/upload/video/frame".to_string(),
            session_path: PathBuf::from("temp/upload_session.json"),
            qrcode_path: PathBuf::from("temp/login_qrcode.png"),
            headless: true,
            login_timeout_secs: 60,
            webhook_url: None,
            tags: ["新闻", "每日新闻", "热点", "信息差"]
                .into_iter()
                .map(String::from)
                .collect(),
            category: "资讯".to_string(),
            source_hint: "信息来源:[中国日报国际版] [中东半岛电视台] [英国广播公司] [今日俄罗斯电视台]"
                .to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load the YAML config at `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&raw)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn day_dir(&self, ctx: &RunContext) -> PathBuf {
        self.paths.news_dir.join(ctx.day())
    }

    /// Folder for one source in one day; its existence is the crawl re-run guard.
    pub fn source_dir(&self, ctx: &RunContext, source_id: &str) -> PathBuf {
        self.day_dir(ctx).join(source_id)
    }

    pub fn batch_path(&self, ctx: &RunContext, source_id: &str) -> PathBuf {
        self.source_dir(ctx, source_id).join(NEWS_JSON_FILE_NAME)
    }

    pub fn processed_batch_path(&self, ctx: &RunContext, source_id: &str) -> PathBuf {
        self.source_dir(ctx, source_id)
            .join(PROCESSED_NEWS_JSON_FILE_NAME)
    }

    /// Merged edition of the run-slot, `new_articles{times}.json`.
    pub fn edition_path(&self, ctx: &RunContext) -> PathBuf {
        self.day_dir(ctx)
            .join(format!("new_articles{}.json", ctx.times))
    }

    pub fn digest_path(&self, ctx: &RunContext) -> PathBuf {
        self.day_dir(ctx).join("all.json")
    }

    pub fn intro_path(&self, ctx: &RunContext) -> PathBuf {
        self.day_dir(ctx)
            .join(format!("{}introduction.mp4", ctx.times))
    }

    pub fn intro_audio_path(&self, ctx: &RunContext) -> PathBuf {
        self.day_dir(ctx)
            .join(format!("{}introduction.mp3", ctx.times))
    }

    pub fn outro_path(&self) -> PathBuf {
        self.paths.news_dir.join("end.mp4")
    }

    pub fn outro_audio_path(&self) -> PathBuf {
        self.paths.news_dir.join("end.mp3")
    }

    pub fn final_video_path(&self, ctx: &RunContext) -> PathBuf {
        self.paths
            .final_videos_dir
            .join(format!("{}_{}_final.mp4", ctx.day(), ctx.times))
    }

    pub fn uploads_path(&self, ctx: &RunContext) -> PathBuf {
        self.paths
            .final_videos_dir
            .join(format!("{}_uploads.json", ctx.day()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        RunContext::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), 1, false)
    }

    #[test]
    fn test_day_and_month_strings() {
        let ctx = ctx();
        assert_eq!(ctx.day(), "20250601");
        assert_eq!(ctx.year_month(), "202506");
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(
            parse_day("20250604").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 4).unwrap()
        );
        assert!(parse_day("2025-06-04").is_err());
    }

    #[test]
    fn test_edition_name_clamps() {
        let mut ctx = ctx();
        assert_eq!(ctx.edition_name(), "午间全球快讯");
        ctx.times = 9;
        assert_eq!(ctx.edition_name(), "深夜全球快讯");
    }

    #[test]
    fn test_paths_are_namespaced_by_day_and_slot() {
        let config = PipelineConfig::default();
        let ctx = ctx();
        assert_eq!(
            config.batch_path(&ctx, "bbc1"),
            PathBuf::from("news_p/20250601/bbc1/news_results.json")
        );
        assert_eq!(
            config.edition_path(&ctx),
            PathBuf::from("news_p/20250601/new_articles1.json")
        );
        assert_eq!(
            config.final_video_path(&ctx),
            PathBuf::from("final_videos/20250601_1_final.mp4")
        );
    }

    #[test]
    fn test_yaml_overrides_keep_defaults() {
        let yaml = r#"
crawl:
  batch_size: 7
  politeness_secs:
    bbc: 0
llm:
  model: qwen3:8b
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.crawl.batch_size, 7);
        assert_eq!(config.crawl.politeness_for(SourceKind::Bbc), 0);
        assert_eq!(config.crawl.politeness_for(SourceKind::AlJazeera), 20);
        assert_eq!(config.llm.model, "qwen3:8b");
        assert_eq!(config.llm.attempts, 3);
        assert_eq!(config.filters.min_body_chars, 8);
    }

    #[test]
    fn test_voice_and_presenter_cycle_by_slot() {
        let config = PipelineConfig::default();
        assert_eq!(config.tts.voice_for(0), "zh-CN-XiaoxiaoNeural");
        assert_eq!(config.tts.voice_for(5), "zh-CN-XiaoyiNeural");
        assert_eq!(
            config.video.presenter_for(3),
            Some(Path::new("videos/lady_announcer.mp4"))
        );
    }
}
