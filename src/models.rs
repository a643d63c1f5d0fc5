//! Data models for curated articles and the per-day bookkeeping files.
//!
//! - [`Article`]: one curated news article, the only record that flows through
//!   every stage (crawl → summarize → video)
//! - [`DailyDigest`]: the `all.json` roll-up of every edition produced in a day
//! - [`UploadEntry`] / [`UploadManifest`]: the finished editions awaiting upload
//!
//! Field names on disk follow the historical JSON schema of the pipeline (for
//! example `content_cn`, `index_inner`, `show`), so existing batches on disk
//! stay readable. Rust field names describe what the data is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default title when a page has no `<h1>`.
pub const UNTITLED: &str = "无标题";

fn default_visible() -> bool {
    true
}

/// A curated news article.
///
/// Native-language sources populate `title`/`body_native`; foreign-language
/// sources populate `title_foreign`/`body_foreign` at curation time and get
/// `title` filled in by translation during summarization.
///
/// `image_filenames` and `image_urls` are always index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Article {
    /// Display title in the target language.
    pub title: Option<String>,
    /// Original title of a foreign-language article.
    #[serde(rename = "title_en")]
    pub title_foreign: Option<String>,
    /// Local file names of the downloaded images, inside the article folder.
    #[serde(rename = "images", default)]
    pub image_filenames: Vec<String>,
    /// Path of footage supplied for the article, shown instead of images.
    pub video: Option<String>,
    pub audio: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub video_url: Option<String>,
    /// Extracted body of a native-language article.
    #[serde(rename = "content_cn")]
    pub body_native: Option<String>,
    /// Extracted body of a foreign-language article.
    #[serde(rename = "content_en")]
    pub body_foreign: Option<String>,
    /// Per-article folder name, `{:04}` of the sequence.
    pub folder: Option<String>,
    #[serde(rename = "index_inner")]
    pub sequence_in_batch: Option<usize>,
    #[serde(rename = "index_show")]
    pub display_index: Option<usize>,
    /// Canonical article URL; the cross-run dedup key.
    #[serde(rename = "url")]
    pub canonical_url: String,
    /// Run-scoped source tag, e.g. `bbc0`.
    #[serde(rename = "source")]
    pub source_id: String,
    /// Human-readable source label.
    #[serde(rename = "news_type")]
    pub category: String,
    pub publish_time: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Narration text produced by the summarizer.
    pub summary: Option<String>,
    /// Cleared when the article fails a post-summarization gate.
    #[serde(rename = "show", default = "default_visible")]
    pub visible: bool,
}

impl Article {
    pub fn new(source_id: &str, category: &str, canonical_url: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            category: category.to_string(),
            canonical_url: canonical_url.to_string(),
            visible: true,
            ..Default::default()
        }
    }

    /// Attach an image, keeping the filename and URL lists aligned.
    pub fn push_image(&mut self, url: String, filename: String) {
        self.image_urls.push(url);
        self.image_filenames.push(filename);
    }

    pub fn image_count(&self) -> usize {
        self.image_filenames.len()
    }

    /// Whether the extracted text came from a foreign-language page.
    pub fn is_foreign(&self) -> bool {
        self.title_foreign.is_some() || self.body_foreign.is_some()
    }

    /// Title to show on screen, falling back to the source-language title.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.title_foreign.as_deref())
            .unwrap_or("")
    }

    /// Assign the per-batch position: folder name, sequence and display index.
    pub fn set_position(&mut self, idx: usize) {
        self.folder = Some(format!("{idx:04}"));
        self.sequence_in_batch = Some(idx);
        self.display_index = Some(idx);
    }

    /// Whether the video stage should render this article: visible, with
    /// images or footage to show.
    pub fn is_renderable(&self) -> bool {
        self.visible && (!self.image_filenames.is_empty() || self.video.is_some())
    }
}

/// Per-day roll-up of produced editions (`all.json`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DailyDigest {
    pub topic: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub titles: Vec<String>,
}

/// One finished edition, ready to upload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UploadEntry {
    pub video_path: String,
    pub title: String,
    pub tags: Vec<String>,
    pub description: String,
    /// Set once the edition has been submitted.
    #[serde(default)]
    pub uploaded: bool,
}

/// Finished editions of a day keyed by run-slot (as a string).
pub type UploadManifest = BTreeMap<String, UploadEntry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Article {
        let mut article = Article::new("bbc0", "英国广播公司", "https://www.bbc.com/news/articles/c1");
        article.title_foreign = Some("Floods hit the coast".to_string());
        article.body_foreign = Some("Heavy rain caused flooding along the coast.".to_string());
        article.push_image(
            "https://ichef.bbci.co.uk/a/1024/abc.jpg.webp".to_string(),
            "abc.jpg".to_string(),
        );
        article.set_position(3);
        article
    }

    #[test]
    fn test_new_article_is_visible() {
        let article = Article::new("rt0", "今日俄罗斯", "https://www.rt.com/news/1/");
        assert!(article.visible);
        assert!(!article.is_renderable());
        assert_eq!(article.image_count(), 0);
    }

    #[test]
    fn test_footage_article_is_renderable() {
        let mut article = Article::new("alj_up", "中东半岛新闻", "");
        article.video = Some("news_p/20250601/alj_up/0_clip.mp4".to_string());
        assert!(article.is_renderable());
        article.visible = false;
        assert!(!article.is_renderable());
        assert!(sample().is_renderable());
    }

    #[test]
    fn test_push_image_keeps_lists_aligned() {
        let article = sample();
        assert_eq!(article.image_filenames.len(), article.image_urls.len());
        assert_eq!(article.image_filenames[0], "abc.jpg");
    }

    #[test]
    fn test_set_position() {
        let article = sample();
        assert_eq!(article.folder.as_deref(), Some("0003"));
        assert_eq!(article.sequence_in_batch, Some(3));
        assert_eq!(article.display_index, Some(3));
    }

    #[test]
    fn test_serialized_keys_follow_disk_schema() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["title_en"], "Floods hit the coast");
        assert_eq!(json["images"][0], "abc.jpg");
        assert_eq!(json["index_inner"], 3);
        assert_eq!(json["source"], "bbc0");
        assert_eq!(json["news_type"], "英国广播公司");
        assert_eq!(json["show"], true);
        assert!(json["content_cn"].is_null());
    }

    #[test]
    fn test_pretty_batch_round_trip_is_byte_stable() {
        let batch = vec![sample(), Article::new("alj0", "中东半岛新闻", "https://www.aljazeera.com/x")];
        let first = serde_json::to_string_pretty(&batch).unwrap();
        let parsed: Vec<Article> = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string_pretty(&parsed).unwrap();
        assert_eq!(first, second);
        // Non-ASCII text is written as-is, not escaped.
        assert!(first.contains("英国广播公司"));
    }

    #[test]
    fn test_missing_show_defaults_to_visible() {
        let json = r#"{
            "title": "标题", "title_en": null, "video": null, "audio": null,
            "video_url": null, "content_cn": "正文", "content_en": null,
            "folder": "0000", "index_inner": 0, "index_show": 0,
            "url": "https://cn.chinadaily.com.cn/a/202506/01/x.html",
            "source": "chinadaily0", "news_type": "中国日报",
            "publish_time": null, "author": null, "summary": null
        }"#;
        let article: Article = serde_json::from_str(json).unwrap();
        assert!(article.visible);
        assert!(article.image_filenames.is_empty());
        assert_eq!(article.display_title(), "标题");
        assert!(!article.is_foreign());
    }

    #[test]
    fn test_display_title_falls_back_to_foreign() {
        let article = sample();
        assert_eq!(article.display_title(), "Floods hit the coast");
        assert!(article.is_foreign());
    }
}
