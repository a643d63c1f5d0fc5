//! Summarization and translation of curated batches.
//!
//! [`SummaryClient`] wraps a [`Generate`] backend with the pipeline's
//! prompts and output shaping:
//!
//! - every prompt goes through [`RetryGenerate`] (fixed attempts, no delay)
//! - the reasoning preamble is stripped from each answer
//! - an answer over the length budget gets exactly one shaping pass, which
//!   is not retried and falls back to the first answer on failure
//!
//! The stage functions below drive it over a day's batches: each source's
//! `news_results.json` becomes `news_results_processed.json`, and the
//! processed batches are merged into one edition file per run-slot.

use crate::api::{Generate, RetryGenerate, strip_reasoning};
use crate::config::{FilterConfig, LlmConfig, PipelineConfig, RunContext};
use crate::filters;
use crate::models::Article;
use crate::outputs::json;
use crate::scrapers::SourceKind;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

/// Translation direction relative to the target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToNative,
    ToForeign,
}

fn summary_prompt(max_chars: usize, text: &str) -> String {
    format!("请为以下文本生成一份不超过{max_chars}个字的中文新闻摘要，只返回摘要内容：\n{text}")
}

fn translate_prompt(direction: Direction, text: &str) -> String {
    match direction {
        Direction::ToNative => format!("请将以下英文文本翻译成中文,只返回中文：\n{text}"),
        Direction::ToForeign => format!("请将以下中文文本翻译成英文，只返回英文：\n{text}"),
    }
}

fn topics_prompt(per_topic_chars: &str, text: &str) -> String {
    format!(
        "1.请从以下新闻主题，提取出影响力最高的5个，这5个主题每个主题{per_topic_chars}，\n\
         2.同时请排除一些未成年内容,\n\
         3.同时请排除一些死亡事件，\n\
         4.只需返回按序号排列5个主题：\n{text}"
    )
}

/// Cut `text` to at most `max_chars` characters, preferring to end on the
/// last `.` inside the limit.
pub fn cut_foreign_input(text: &str, max_chars: usize) -> &str {
    let Some((limit, _)) = text.char_indices().nth(max_chars) else {
        return text;
    };
    match text[..limit].rfind('.') {
        Some(dot) => &text[..dot + 1],
        None => &text[..limit],
    }
}

pub struct SummaryClient<G> {
    generator: RetryGenerate<G>,
    cfg: LlmConfig,
}

impl<G: Generate> SummaryClient<G> {
    pub fn new(generator: G, cfg: &LlmConfig) -> Self {
        Self {
            generator: RetryGenerate::new(generator, cfg.attempts),
            cfg: cfg.clone(),
        }
    }

    /// Generate with retries, then strip the reasoning block.
    async fn ask(&self, prompt: &str, remove_newlines: bool) -> Result<String, Box<dyn Error>> {
        let raw = self.generator.generate(prompt).await?;
        Ok(strip_reasoning(&raw, remove_newlines))
    }

    /// One extra, unretried pass when `first` is over budget. Keeps `first`
    /// if that pass fails.
    async fn shape(&self, first: String, max_chars: usize, prompt: String, remove_newlines: bool) -> String {
        let len = first.chars().count();
        if len <= max_chars {
            return first;
        }
        info!(len, max_chars, "Answer over budget; shaping once");
        match self.generator.inner().generate(&prompt).await {
            Ok(raw) => strip_reasoning(&raw, remove_newlines),
            Err(e) => {
                warn!(error = %e, "Shaping pass failed; keeping first answer");
                first
            }
        }
    }

    /// Native-language summary of at most `max_chars` characters (best effort).
    #[instrument(level = "debug", skip(self, text))]
    pub async fn summarize(&self, text: &str, max_chars: usize) -> Result<String, Box<dyn Error>> {
        let first = self.ask(&summary_prompt(max_chars, text), true).await?;
        let retry_prompt = summary_prompt(max_chars, &first);
        Ok(self.shape(first, max_chars, retry_prompt, true).await)
    }

    /// Native-language summary of a foreign-language body.
    #[instrument(level = "debug", skip(self, text))]
    pub async fn summarize_foreign(&self, text: &str, max_chars: usize) -> Result<String, Box<dyn Error>> {
        let input = cut_foreign_input(text, self.cfg.foreign_input_max_chars);
        if input.len() < text.len() {
            info!(
                from = text.chars().count(),
                to = input.chars().count(),
                "Foreign body cut before prompting"
            );
        }
        self.summarize(input, max_chars).await
    }

    #[instrument(level = "debug", skip(self, text))]
    pub async fn translate(&self, text: &str, direction: Direction) -> Result<String, Box<dyn Error>> {
        self.ask(&translate_prompt(direction, text), true).await
    }

    /// The five most impactful topics among `titles`, one per line.
    #[instrument(level = "debug", skip_all)]
    pub async fn top_topics(&self, titles: &str) -> Result<String, Box<dyn Error>> {
        let max_chars = self.cfg.topic_max_chars;
        let first = self.ask(&topics_prompt("再精简到17个字左右", titles), false).await?;
        let retry_prompt = topics_prompt("必须精简到15个字以内", &first);
        let topics = self.shape(first, max_chars, retry_prompt, false).await;
        Ok(topics.replace("**", "").replace("死亡", "罹难"))
    }

    /// Fill in `title` and `summary` for one article and apply the gates.
    #[instrument(level = "info", skip_all, fields(url = %article.canonical_url))]
    pub async fn process_article(&self, article: &mut Article, filters_cfg: &FilterConfig) {
        debug!(foreign = article.is_foreign(), "Processing article");
        if let Some(original) = article.title_foreign.clone() {
            match self.translate(&original, Direction::ToNative).await {
                Ok(title) if !title.is_empty() => article.title = Some(title),
                Ok(_) => warn!("Title translation came back empty"),
                Err(e) => warn!(error = %e, "Title translation failed"),
            }
        }

        let max_chars = self.cfg.summary_max_chars;
        let summary = if let Some(body) = article.body_native.as_deref().filter(|b| !b.is_empty()) {
            self.summarize(body, max_chars).await
        } else if let Some(body) = article.body_foreign.as_deref().filter(|b| !b.is_empty()) {
            self.summarize_foreign(body, max_chars).await
        } else {
            Err("article has no body text".into())
        };
        match summary {
            Ok(s) => article.summary = Some(s),
            Err(e) => warn!(error = %e, "Summary generation failed"),
        }

        if let Some(reason) = filters::review_summary(article.summary.as_deref(), filters_cfg) {
            warn!(title = %article.display_title(), %reason, "Article hidden");
            article.visible = false;
        }
    }
}

/// Summarize one source's batch, or load the processed batch if it exists.
///
/// Returns an empty list when the source was not crawled for this day.
#[instrument(level = "info", skip(client, config, ctx), fields(day = %ctx.day()))]
pub async fn process_source<G: Generate>(
    client: &SummaryClient<G>,
    config: &PipelineConfig,
    ctx: &RunContext,
    source_id: &str,
) -> Vec<Article> {
    let batch_path = config.batch_path(ctx, source_id);
    let processed_path = config.processed_batch_path(ctx, source_id);

    if !ctx.rewrite && fs::try_exists(&processed_path).await.unwrap_or(false) {
        match json::read_batch(&processed_path).await {
            Ok(articles) => {
                info!(count = articles.len(), "Processed batch exists; reusing");
                return articles;
            }
            Err(e) => warn!(path = %processed_path.display(), error = %e, "Unreadable processed batch; redoing"),
        }
    }

    let mut articles = match json::read_batch(&batch_path).await {
        Ok(a) => a,
        Err(e) => {
            info!(path = %batch_path.display(), error = %e, "No batch to summarize");
            return Vec::new();
        }
    };

    for article in articles.iter_mut() {
        client.process_article(article, &config.filters).await;
    }

    match json::write_batch(&processed_path, &articles).await {
        Ok(()) => info!(
            count = articles.len(),
            visible = articles.iter().filter(|a| a.visible).count(),
            path = %processed_path.display(),
            "Wrote processed batch"
        ),
        Err(e) => error!(path = %processed_path.display(), error = %e, "Failed to write processed batch"),
    }
    articles
}

/// Build one edition from per-source processed batches: fixed source
/// order, body text dropped, sequence renumbered from 1.
pub fn merge_edition(mut batches: Vec<(SourceKind, Vec<Article>)>) -> Vec<Article> {
    batches.sort_by_key(|(kind, _)| {
        SourceKind::EDITION_ORDER
            .iter()
            .position(|k| k == kind)
            .unwrap_or(usize::MAX)
    });
    batches
        .into_iter()
        .flat_map(|(_, articles)| articles)
        .enumerate()
        .map(|(i, mut article)| {
            article.body_native = None;
            article.body_foreign = None;
            article.sequence_in_batch = Some(i + 1);
            article
        })
        .collect()
}

/// The `summarize` stage: every source of the run-slot, then the edition file.
#[instrument(level = "info", skip_all, fields(day = %ctx.day(), times = ctx.times))]
pub async fn summarize_all<G: Generate>(
    client: &SummaryClient<G>,
    config: &PipelineConfig,
    ctx: &RunContext,
) -> Result<PathBuf, Box<dyn Error>> {
    let mut batches = Vec::new();
    for kind in SourceKind::EDITION_ORDER {
        let articles = process_source(client, config, ctx, &kind.tag(ctx.times)).await;
        if !articles.is_empty() {
            batches.push((kind, articles));
        }
    }

    let edition = merge_edition(batches);
    let path = config.edition_path(ctx);
    json::write_batch(&path, &edition).await?;
    info!(articles = edition.len(), path = %path.display(), "Wrote edition");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::ScriptedGenerator;
    use chrono::NaiveDate;

    fn cfg() -> LlmConfig {
        LlmConfig {
            summary_max_chars: 10,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_summary_strips_reasoning() {
        let fake = ScriptedGenerator::new([Ok("<think>hmm</think>\n短摘要\n")]);
        let client = SummaryClient::new(&fake, &cfg());
        assert_eq!(client.summarize("正文", 10).await.unwrap(), "短摘要");
        assert!(fake.prompts.lock().unwrap()[0].contains("不超过10个字"));
    }

    #[tokio::test]
    async fn test_retries_then_shapes_once() {
        let long = "这是一段明显超过十个字的摘要内容";
        let fake = ScriptedGenerator::new([Err("timeout"), Ok(long), Ok("精简后摘要")]);
        let client = SummaryClient::new(&fake, &cfg());
        assert_eq!(client.summarize("正文", 10).await.unwrap(), "精简后摘要");
        assert_eq!(fake.calls(), 3);
        // The shaping prompt carries the first summary, not the body.
        assert!(fake.prompts.lock().unwrap()[2].ends_with(long));
    }

    #[tokio::test]
    async fn test_failed_shaping_keeps_first_summary() {
        let long = "这是一段明显超过十个字的摘要内容";
        let fake = ScriptedGenerator::new([Ok(long), Err("boom"), Ok("never used")]);
        let client = SummaryClient::new(&fake, &cfg());
        assert_eq!(client.summarize("正文", 10).await.unwrap(), long);
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn test_three_failures_surface_error() {
        let fake = ScriptedGenerator::new([Err("a"), Err("b"), Err("c")]);
        let client = SummaryClient::new(&fake, &cfg());
        assert!(client.summarize("正文", 10).await.is_err());
        assert_eq!(fake.calls(), 3);
    }

    #[test]
    fn test_cut_foreign_input() {
        let text = "One. Two. Three four five";
        assert_eq!(cut_foreign_input(text, 100), text);
        assert_eq!(cut_foreign_input(text, 12), "One. Two.");
        assert_eq!(cut_foreign_input("abcdefgh", 4), "abcd");
    }

    #[tokio::test]
    async fn test_top_topics_cleanup() {
        let fake = ScriptedGenerator::new([Ok("</think>1. **地震**造成多人死亡\n2. 股市上涨")]);
        let client = SummaryClient::new(&fake, &LlmConfig::default());
        assert_eq!(
            client.top_topics("a;b").await.unwrap(),
            "1. 地震造成多人罹难\n2. 股市上涨"
        );
    }

    #[tokio::test]
    async fn test_process_article_translates_and_gates() {
        let fake = ScriptedGenerator::new([Ok("洪水袭击海岸"), Ok("This summary is English only")]);
        let client = SummaryClient::new(&fake, &LlmConfig::default());
        let mut article = Article::new("bbc0", "英国广播公司", "https://www.bbc.com/news/articles/1");
        article.title_foreign = Some("Floods hit coast".to_string());
        article.body_foreign = Some("Heavy rain flooded the coast.".to_string());

        client.process_article(&mut article, &FilterConfig::default()).await;
        assert_eq!(article.title.as_deref(), Some("洪水袭击海岸"));
        assert!(!article.visible);
        assert!(fake.prompts.lock().unwrap()[0].starts_with("请将以下英文文本翻译成中文"));
    }

    #[tokio::test]
    async fn test_failed_summary_hides_article() {
        let fake = ScriptedGenerator::new([Err("a"), Err("b"), Err("c")]);
        let client = SummaryClient::new(&fake, &LlmConfig::default());
        let mut article = Article::new("chinadaily0", "中国日报", "https://cn.chinadaily.com.cn/a/1.html");
        article.title = Some("标题".to_string());
        article.body_native = Some("正文内容足够长。".to_string());
        client.process_article(&mut article, &FilterConfig::default()).await;
        assert!(article.summary.is_none());
        assert!(!article.visible);
    }

    #[test]
    fn test_merge_edition_order_and_numbering() {
        let mk = |source: &str, url: &str| {
            let mut a = Article::new(source, "x", url);
            a.body_foreign = Some("body".to_string());
            a.sequence_in_batch = Some(0);
            a
        };
        let edition = merge_edition(vec![
            (SourceKind::ChinaDailyEn, vec![mk("chinadaily_en0", "en1")]),
            (SourceKind::Bbc, vec![mk("bbc0", "bbc1"), mk("bbc0", "bbc2")]),
            (SourceKind::Rt, vec![mk("rt0", "rt1")]),
        ]);
        let urls: Vec<&str> = edition.iter().map(|a| a.canonical_url.as_str()).collect();
        assert_eq!(urls, vec!["rt1", "bbc1", "bbc2", "en1"]);
        let seq: Vec<Option<usize>> = edition.iter().map(|a| a.sequence_in_batch).collect();
        assert_eq!(seq, vec![Some(1), Some(2), Some(3), Some(4)]);
        assert!(edition.iter().all(|a| a.body_foreign.is_none()));
    }

    #[tokio::test]
    async fn test_processed_batch_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.paths.news_dir = dir.path().to_path_buf();
        let ctx = RunContext::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), 0, false);

        let mut done = Article::new("rt0", "今日俄罗斯", "https://www.rt.com/news/1/");
        done.summary = Some("已有摘要".to_string());
        json::write_batch(&config.processed_batch_path(&ctx, "rt0"), &[done.clone()])
            .await
            .unwrap();

        let fake = ScriptedGenerator::new(Vec::<Result<&str, &str>>::new());
        let client = SummaryClient::new(&fake, &config.llm);
        let articles = process_source(&client, &config, &ctx, "rt0").await;
        assert_eq!(articles, vec![done]);
        assert_eq!(fake.calls(), 0);
    }
}
