//! The `video` stage: one narrated clip per renderable article, framed by an
//! intro and an outro, concatenated into the edition video.

use crate::api::Generate;
use crate::config::{AUDIO_FILE_NAME, CLIP_FILE_NAME, PipelineConfig, RunContext};
use crate::models::{Article, UploadEntry};
use crate::outputs::{digest, json};
use crate::summarize::SummaryClient;
use crate::tts::Narrator;
use crate::video::ffmpeg::{ArticleClip, Ffmpeg, TextOverlay, TitleCard};
use crate::video::layout;
use chrono::Datelike;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Titles of the visible articles, joined for the topics prompt.
pub fn topic_input(articles: &[Article]) -> String {
    articles
        .iter()
        .filter(|a| a.visible)
        .map(|a| a.display_title())
        .collect::<Vec<_>>()
        .join(";")
}

/// Manifest entry for a finished edition.
pub fn upload_entry(config: &PipelineConfig, ctx: &RunContext, video: &Path, topics: &str) -> UploadEntry {
    UploadEntry {
        video_path: video.display().to_string(),
        title: format!(
            "【{}】{}",
            ctx.edition_name(),
            ctx.today.format("%Y年%m月%d日")
        ),
        tags: config.upload.tags.clone(),
        description: format!("{}\n{}", config.upload.source_hint, topics),
        uploaded: false,
    }
}

/// Where one article's clip and its intermediate files live.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipFiles {
    pub dir: PathBuf,
    pub audio: PathBuf,
    pub caption: PathBuf,
    pub title: PathBuf,
    pub out: PathBuf,
}

/// Crawled articles work inside their folder. A footage article without a
/// folder works beside its video, with names prefixed by the video's stem.
pub fn clip_files(config: &PipelineConfig, ctx: &RunContext, article: &Article) -> Result<ClipFiles, Box<dyn Error>> {
    let (dir, prefix) = match (article.folder.as_deref(), article.video.as_deref()) {
        (Some(folder), _) => (config.source_dir(ctx, &article.source_id).join(folder), String::new()),
        (None, Some(video)) => {
            let video = Path::new(video);
            let stem = video
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or("article video has no file name")?;
            let dir = video.parent().map(Path::to_path_buf).unwrap_or_default();
            (dir, format!("{stem}_"))
        }
        (None, None) => return Err("article has no folder".into()),
    };
    let file = |name: &str| dir.join(format!("{prefix}{name}"));
    Ok(ClipFiles {
        audio: file(AUDIO_FILE_NAME),
        caption: file("caption.txt"),
        title: file("title.txt"),
        out: file(CLIP_FILE_NAME),
        dir,
    })
}

async fn write_text(path: &Path, text: &str) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, text).await?;
    Ok(())
}

/// Builds every clip of one edition.
pub struct Assembler<'a, G> {
    config: &'a PipelineConfig,
    ctx: &'a RunContext,
    client: &'a SummaryClient<G>,
    narrator: Narrator,
    ffmpeg: Ffmpeg,
}

impl<'a, G: Generate> Assembler<'a, G> {
    pub fn new(config: &'a PipelineConfig, ctx: &'a RunContext, client: &'a SummaryClient<G>) -> Self {
        Self {
            config,
            ctx,
            client,
            narrator: Narrator::new(&config.tts, ctx.times),
            ffmpeg: Ffmpeg::new(&config.video),
        }
    }

    fn presenter(&self) -> Option<PathBuf> {
        self.config
            .video
            .presenter_for(self.ctx.times)
            .filter(|p| p.exists())
            .map(Path::to_path_buf)
    }

    /// Narrate `text` into `audio` and return its duration.
    async fn narrate(&self, text: &str, audio: &Path) -> Result<f64, Box<dyn Error>> {
        self.narrator.synthesize(text, audio, self.ctx.rewrite).await?;
        self.ffmpeg.probe_duration(audio).await
    }

    #[instrument(level = "info", skip_all)]
    async fn render_intro(&self, topics: &str) -> Result<PathBuf, Box<dyn Error>> {
        let out = self.config.intro_path(self.ctx);
        if out.exists() && !self.ctx.rewrite {
            info!(path = %out.display(), "Intro exists; reusing");
            return Ok(out);
        }
        let cfg = &self.config.video;
        let text = layout::intro_text(self.ctx.today, self.ctx.edition_name());
        let audio = self.config.intro_audio_path(self.ctx);
        let duration = self.narrate(&text, &audio).await?;

        let date_file = out.with_extension("date.txt");
        let topics_file = out.with_extension("topics.txt");
        write_text(&date_file, &text).await?;
        write_text(&topics_file, topics).await?;

        let gap = layout::frame_gap(cfg.width) as f64;
        let topic_size = layout::topic_font_size(cfg.height);
        let card = TitleCard {
            audio,
            duration,
            texts: vec![
                TextOverlay {
                    textfile: date_file,
                    font_size: layout::intro_font_size(&text, cfg.width),
                    color: "black".to_string(),
                    x: ((gap * 1.75) as u32).to_string(),
                    y: ((cfg.height as f64 * 0.7) as u32).to_string(),
                    line_spacing: 0,
                },
                TextOverlay {
                    textfile: topics_file,
                    font_size: topic_size,
                    color: layout::weekday_color(self.ctx.today.weekday()).to_string(),
                    x: ((gap * 1.75) as u32).to_string(),
                    y: (cfg.height / 10).to_string(),
                    line_spacing: topic_size / 4,
                },
            ],
            presenter: self.presenter().map(|p| {
                (
                    p,
                    (cfg.width as f64 * 0.68) as u32,
                    (cfg.height as f64 * 0.47) as u32,
                )
            }),
            out: out.clone(),
        };
        self.ffmpeg.run(&self.ffmpeg.title_card_args(&card)).await?;
        info!(path = %out.display(), "Intro rendered");
        Ok(out)
    }

    #[instrument(level = "info", skip_all)]
    async fn render_outro(&self) -> Result<PathBuf, Box<dyn Error>> {
        let out = self.config.outro_path();
        if out.exists() && !self.ctx.rewrite {
            info!(path = %out.display(), "Outro exists; reusing");
            return Ok(out);
        }
        let cfg = &self.config.video;
        let audio = self.config.outro_audio_path();
        let duration = self.narrate(&cfg.outro_narration, &audio).await?;
        let caption_file = out.with_extension("txt");
        write_text(&caption_file, &cfg.outro_caption).await?;

        let card = TitleCard {
            audio,
            duration,
            texts: vec![TextOverlay {
                textfile: caption_file,
                font_size: (cfg.height as f64 * 0.15) as u32,
                color: "black".to_string(),
                x: "(w-text_w)/2".to_string(),
                y: ((cfg.height as f64 * 0.7) as u32).to_string(),
                line_spacing: 0,
            }],
            presenter: self.presenter().map(|p| {
                (
                    p,
                    (cfg.width as f64 * 0.38) as u32,
                    (cfg.height as f64 * 0.17) as u32,
                )
            }),
            out: out.clone(),
        };
        self.ffmpeg.run(&self.ffmpeg.title_card_args(&card)).await?;
        info!(path = %out.display(), "Outro rendered");
        Ok(out)
    }

    /// Render (or reuse) the clip for one article numbered `n`.
    ///
    /// `Ok(None)` means the narration was too short to keep.
    #[instrument(level = "info", skip_all, fields(n = n, url = %article.canonical_url))]
    async fn render_article(&self, article: &Article, n: usize) -> Result<Option<PathBuf>, Box<dyn Error>> {
        let ClipFiles {
            dir,
            audio,
            caption: caption_file,
            title: title_file,
            out,
        } = clip_files(self.config, self.ctx, article)?;
        if out.exists() && !self.ctx.rewrite {
            info!(path = %out.display(), "Clip exists; reusing");
            return Ok(Some(out));
        }
        let video = article.video.as_deref().map(PathBuf::from);
        if let Some(missing) = video.as_deref().filter(|v| !v.exists()) {
            return Err(format!("article video {} is missing", missing.display()).into());
        }

        let summary = article.summary.as_deref().unwrap_or_default();
        let duration = self.narrate(summary, &audio).await?;
        if duration < self.config.video.min_clip_secs {
            warn!(duration, "Narration too short; skipping article");
            return Ok(None);
        }

        let l = self.ffmpeg.layout();
        let (box_w, box_h) = l.caption_box();
        let fit = layout::fit_caption(summary, box_w, box_h);
        write_text(&caption_file, &layout::wrap_chars(summary, fit.chars_per_line)).await?;
        write_text(&title_file, &format!("{n} {}", article.display_title())).await?;

        let clip = ArticleClip {
            audio,
            duration,
            images: article.image_filenames.iter().map(|f| dir.join(f)).collect(),
            presenter: self.presenter(),
            video,
            caption_file,
            caption_font_size: fit.font_size,
            title_file,
            out: out.clone(),
        };
        self.ffmpeg.run(&self.ffmpeg.article_clip_args(&clip)).await?;
        info!(duration, font_size = fit.font_size, footage = article.video.is_some(), "Article clip rendered");
        Ok(Some(out))
    }

    /// Keep clips that probe at or above the minimum duration.
    async fn playable(&self, clips: Vec<PathBuf>) -> Vec<PathBuf> {
        let mut kept = Vec::with_capacity(clips.len());
        for clip in clips {
            match self.ffmpeg.probe_duration(&clip).await {
                Ok(d) if d >= self.config.video.min_clip_secs => kept.push(clip),
                Ok(d) => warn!(path = %clip.display(), duration = d, "Dropping short clip"),
                Err(e) => warn!(path = %clip.display(), error = %e, "Dropping unreadable clip"),
            }
        }
        kept
    }

    /// Build the edition video. `Ok(None)` when there is no edition file.
    #[instrument(level = "info", skip_all, fields(day = %self.ctx.day(), times = self.ctx.times))]
    pub async fn assemble(&self) -> Result<Option<PathBuf>, Box<dyn Error>> {
        let edition_path = self.config.edition_path(self.ctx);
        if !edition_path.exists() {
            warn!(path = %edition_path.display(), "No edition to render");
            return Ok(None);
        }
        let final_path = self.config.final_video_path(self.ctx);
        if final_path.exists() && !self.ctx.rewrite {
            info!(path = %final_path.display(), "Final video exists; reusing");
            return Ok(Some(final_path));
        }
        let articles = json::read_batch(&edition_path).await?;

        let topics = match self.client.top_topics(&topic_input(&articles)).await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "Topic extraction failed; intro without topics");
                String::new()
            }
        };

        let mut clips = Vec::new();
        match self.render_intro(&topics).await {
            Ok(p) => clips.push(p),
            Err(e) => error!(error = %e, "Intro failed"),
        }

        let mut n = 1;
        for article in articles.iter().filter(|a| a.is_renderable()) {
            match self.render_article(article, n).await {
                Ok(Some(p)) => {
                    clips.push(p);
                    n += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(title = %article.display_title(), error = %e, "Article clip failed"),
            }
        }
        info!(articles = n - 1, "Article clips ready");

        match self.render_outro().await {
            Ok(p) => clips.push(p),
            Err(e) => error!(error = %e, "Outro failed"),
        }

        let clips = self.playable(clips).await;
        if clips.is_empty() {
            return Err("no playable clips".into());
        }
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.ffmpeg
            .run(&self.ffmpeg.concat_args(&clips, &final_path))
            .await?;
        info!(clips = clips.len(), path = %final_path.display(), "Edition video written");

        let day = self.ctx.day();
        if let Err(e) = digest::append_digest(
            &self.config.digest_path(self.ctx),
            &day,
            &topics,
            &self.config.upload.source_hint,
            &articles,
        )
        .await
        {
            error!(error = %e, "Failed to update daily digest");
        }
        let entry = upload_entry(self.config, self.ctx, &final_path, &topics);
        if let Err(e) = digest::record_upload(&self.config.uploads_path(self.ctx), self.ctx.times, entry).await {
            error!(error = %e, "Failed to update upload manifest");
        }
        Ok(Some(final_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::ScriptedGenerator;
    use crate::config::PathsConfig;
    use chrono::NaiveDate;

    fn setup(dir: &Path, rewrite: bool) -> (PipelineConfig, RunContext) {
        let config = PipelineConfig {
            paths: PathsConfig {
                news_dir: dir.join("news_p"),
                final_videos_dir: dir.join("final_videos"),
                ..PathsConfig::default()
            },
            ..PipelineConfig::default()
        };
        let ctx = RunContext::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), 0, rewrite);
        (config, ctx)
    }

    fn article(title: &str, visible: bool) -> Article {
        let mut a = Article::new("bbc0", "英国广播公司", "https://www.bbc.com/news/articles/x");
        a.title = Some(title.to_string());
        a.visible = visible;
        a
    }

    #[test]
    fn test_topic_input_uses_visible_titles() {
        let articles = [article("一", true), article("二", false), article("三", true)];
        assert_eq!(topic_input(&articles), "一;三");
    }

    #[test]
    fn test_upload_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (config, ctx) = setup(dir.path(), false);
        let entry = upload_entry(&config, &ctx, Path::new("final_videos/20250601_0_final.mp4"), "1.话题");
        assert_eq!(entry.title, "【晨间全球快讯】2025年06月01日");
        assert!(entry.description.ends_with("\n1.话题"));
        assert_eq!(entry.tags, config.upload.tags);
    }

    #[test]
    fn test_clip_files_for_crawled_and_footage_articles() {
        let dir = tempfile::tempdir().unwrap();
        let (config, ctx) = setup(dir.path(), false);

        let mut crawled = article("一", true);
        crawled.set_position(2);
        let files = clip_files(&config, &ctx, &crawled).unwrap();
        let folder = dir.path().join("news_p").join("20250601").join("bbc0").join("0002");
        assert_eq!(files.out, folder.join(CLIP_FILE_NAME));
        assert_eq!(files.audio, folder.join(AUDIO_FILE_NAME));
        assert_eq!(files.dir, folder);

        let mut footage = Article::new("alj_up", "中东半岛新闻", "");
        footage.video = Some("uploads/20250601/alj_up/0_港口.mp4".to_string());
        let files = clip_files(&config, &ctx, &footage).unwrap();
        let beside = Path::new("uploads/20250601/alj_up");
        assert_eq!(files.out, beside.join(format!("0_港口_{CLIP_FILE_NAME}")));
        assert_eq!(files.caption, beside.join("0_港口_caption.txt"));

        assert!(clip_files(&config, &ctx, &article("二", true)).is_err());
    }

    #[tokio::test]
    async fn test_missing_edition_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let (config, ctx) = setup(dir.path(), false);
        let fake = ScriptedGenerator::default();
        let client = SummaryClient::new(&fake, &config.llm);
        let out = Assembler::new(&config, &ctx, &client).assemble().await.unwrap();
        assert!(out.is_none());
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_existing_final_video_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let (config, ctx) = setup(dir.path(), false);
        json::write_batch(&config.edition_path(&ctx), &[article("一", true)])
            .await
            .unwrap();
        let final_path = config.final_video_path(&ctx);
        std::fs::create_dir_all(final_path.parent().unwrap()).unwrap();
        std::fs::write(&final_path, b"mp4").unwrap();

        let fake = ScriptedGenerator::default();
        let client = SummaryClient::new(&fake, &config.llm);
        let out = Assembler::new(&config, &ctx, &client).assemble().await.unwrap();
        assert_eq!(out, Some(final_path));
        assert_eq!(fake.calls(), 0);
    }
}
