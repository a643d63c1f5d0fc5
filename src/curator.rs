//! Article curation: discovery, extraction, filtering and image download for
//! one source, producing the per-source `news_results.json` batch.
//!
//! The source folder `{news_dir}/{day}/{source_id}` doubles as the re-run
//! guard: if it exists, curation for that source is skipped without any
//! network access, whatever its contents.

use crate::config::{PipelineConfig, RunContext};
use crate::filters;
use crate::models::Article;
use crate::outputs::json;
use crate::scrapers::NewsSource;
use crate::visited::VisitedSet;
use futures::future::join_all;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument, warn};

pub struct Curator<'a> {
    config: &'a PipelineConfig,
    ctx: &'a RunContext,
    visited: &'a VisitedSet,
}

impl<'a> Curator<'a> {
    pub fn new(config: &'a PipelineConfig, ctx: &'a RunContext, visited: &'a VisitedSet) -> Self {
        Self { config, ctx, visited }
    }

    /// Curate one source.
    ///
    /// Returns `None` when the source folder already exists (nothing was
    /// done), otherwise the accepted articles, which have also been written
    /// to the batch file.
    #[instrument(level = "info", skip_all, fields(source = %source.source_id()))]
    pub async fn curate<S: NewsSource>(&self, source: &S) -> Option<Vec<Article>> {
        let source_id = source.source_id();
        let source_dir = self.config.source_dir(self.ctx, source_id);
        if fs::try_exists(&source_dir).await.unwrap_or(false) {
            info!(path = %source_dir.display(), "Source folder exists; skipping crawl");
            return None;
        }
        if let Err(e) = fs::create_dir_all(&source_dir).await {
            error!(path = %source_dir.display(), error = %e, "Cannot create source folder");
            return None;
        }

        let batch_size = self.config.crawl.batch_size;
        let candidates = source.discover_links(self.ctx.today).await;
        info!(
            found = candidates.len(),
            examined = candidates.len().min(batch_size),
            "Starting curation"
        );

        let mut accepted: Vec<Article> = Vec::new();
        for url in candidates.into_iter().take(batch_size) {
            if self.visited.contains(&url) {
                info!(%url, "Already curated this month; skipping");
                continue;
            }
            let Some(mut article) = source.extract_article(&url).await else {
                warn!(%url, "No content extracted");
                continue;
            };
            if let Err(reason) = filters::screen(&article, &self.config.filters) {
                warn!(%url, %reason, "Article rejected");
                continue;
            }

            article.set_position(accepted.len());
            if !self.acquire_images(source, &article, &source_dir).await {
                warn!(%url, "Image download incomplete; article dropped");
                continue;
            }
            accepted.push(article);
        }

        let batch_path = self.config.batch_path(self.ctx, source_id);
        match json::write_batch(&batch_path, &accepted).await {
            Ok(()) => info!(kept = accepted.len(), path = %batch_path.display(), "Wrote batch"),
            Err(e) => error!(path = %batch_path.display(), error = %e, "Failed to write batch"),
        }
        Some(accepted)
    }

    /// Download every image of `article` into its folder.
    ///
    /// Files already on disk count as acquired. Anything short of the full
    /// set removes the folder and fails the article.
    async fn acquire_images<S: NewsSource>(
        &self,
        source: &S,
        article: &Article,
        source_dir: &Path,
    ) -> bool {
        let Some(folder) = article.folder.as_deref() else {
            return false;
        };
        let dir = source_dir.join(folder);
        if let Err(e) = fs::create_dir_all(&dir).await {
            error!(path = %dir.display(), error = %e, "Cannot create article folder");
            return false;
        }

        let mut acquired = 0usize;
        for (name, url) in article.image_filenames.iter().zip(&article.image_urls) {
            if name.is_empty() {
                warn!(%url, "Image has no file name");
                continue;
            }
            let path = dir.join(name);
            if fs::try_exists(&path).await.unwrap_or(false) {
                acquired += 1;
                continue;
            }
            match source.fetch_image(url).await {
                Ok(bytes) => match fs::write(&path, bytes).await {
                    Ok(()) => acquired += 1,
                    Err(e) => warn!(%url, path = %path.display(), error = %e, "Image write failed"),
                },
                Err(e) => warn!(%url, error = %e, "Image download failed"),
            }
        }

        if acquired == article.image_count() {
            return true;
        }
        info!(
            expected = article.image_count(),
            acquired,
            "Removing partial article folder"
        );
        if let Err(e) = fs::remove_dir_all(&dir).await {
            warn!(path = %dir.display(), error = %e, "Failed to remove partial folder");
        }
        false
    }
}

/// Curate every source concurrently, then record all accepted URLs in the
/// month's visited set in a single write.
#[instrument(level = "info", skip_all, fields(day = %ctx.day(), sources = sources.len()))]
pub async fn crawl_all<S: NewsSource>(
    config: &PipelineConfig,
    ctx: &RunContext,
    sources: &[S],
) -> usize {
    let year_month = ctx.year_month();
    let visited = match VisitedSet::load(&config.paths.visited_dir, &year_month).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Could not read visited set; treating as empty");
            VisitedSet::default()
        }
    };
    info!(known = visited.len(), "Loaded visited set");
    let curator = Curator::new(config, ctx, &visited);

    let results = join_all(sources.iter().map(|s| curator.curate(s))).await;
    let urls: Vec<String> = results
        .into_iter()
        .flatten()
        .flatten()
        .map(|a| a.canonical_url)
        .collect();
    let curated = urls.len();

    if let Err(e) = VisitedSet::union_and_save(&config.paths.visited_dir, &year_month, urls).await {
        error!(error = %e, "Failed to save visited set");
    }
    info!(curated, "Crawl finished");
    curated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::SourceKind;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned articles; URLs in `broken_images` fail to download.
    struct FakeSource {
        id: String,
        links: Vec<String>,
        broken_images: HashSet<String>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(id: &str, links: &[&str]) -> Self {
            Self {
                id: id.to_string(),
                links: links.iter().map(|s| s.to_string()).collect(),
                broken_images: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl NewsSource for FakeSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Bbc
        }

        fn source_id(&self) -> &str {
            &self.id
        }

        async fn discover_links(&self, _date: NaiveDate) -> Vec<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.links.clone()
        }

        async fn extract_article(&self, url: &str) -> Option<Article> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.ends_with("/empty") {
                return None;
            }
            let mut a = Article::new(&self.id, "英国广播公司", url);
            a.title_foreign = Some(format!("Headline for {url}"));
            a.body_foreign = Some("Plenty of body text for the filters.".to_string());
            if url.ends_with("/jinping") {
                a.body_foreign = Some("Xi Jinping spoke on Monday.".to_string());
            }
            if url.ends_with("/noname") {
                a.push_image(format!("{url}/dir/"), String::new());
            } else if !url.ends_with("/noimg") {
                let slug = url.rsplit('/').next().unwrap_or("x");
                a.push_image(format!("{url}/img1.jpg"), format!("{slug}-1.jpg"));
                a.push_image(format!("{url}/img2.jpg"), format!("{slug}-2.jpg"));
            }
            Some(a)
        }

        async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, Box<dyn Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken_images.contains(url) {
                return Err("connection reset".into());
            }
            Ok(b"\xFF\xD8\xFFjpeg".to_vec())
        }
    }

    fn setup(root: &Path) -> (PipelineConfig, RunContext) {
        let mut config = PipelineConfig::default();
        config.paths.news_dir = root.join("news");
        config.paths.visited_dir = root.to_path_buf();
        let ctx = RunContext::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), 0, false);
        (config, ctx)
    }

    #[tokio::test]
    async fn test_filters_and_sequential_folders() {
        let dir = tempfile::tempdir().unwrap();
        let (config, ctx) = setup(dir.path());
        let mut source = FakeSource::new(
            "bbc0",
            &[
                "https://b/a",
                "https://b/empty",
                "https://b/noimg",
                "https://b/jinping",
                "https://b/seen",
                "https://b/broken",
                "https://b/c",
            ],
        );
        source.broken_images.insert("https://b/broken/img2.jpg".to_string());

        VisitedSet::union_and_save(dir.path(), "202506", vec!["https://b/seen".to_string()])
            .await
            .unwrap();
        let visited = VisitedSet::load(dir.path(), "202506").await.unwrap();

        let curator = Curator::new(&config, &ctx, &visited);
        let articles = curator.curate(&source).await.unwrap();

        let urls: Vec<&str> = articles.iter().map(|a| a.canonical_url.as_str()).collect();
        assert_eq!(urls, vec!["https://b/a", "https://b/c"]);
        assert_eq!(articles[1].folder.as_deref(), Some("0001"));
        assert_eq!(articles[1].sequence_in_batch, Some(1));

        let source_dir = config.source_dir(&ctx, "bbc0");
        for a in &articles {
            assert_eq!(a.image_filenames.len(), a.image_urls.len());
            let folder = source_dir.join(a.folder.as_deref().unwrap());
            for name in &a.image_filenames {
                assert!(folder.join(name).exists(), "missing {name}");
            }
        }
        // The broken article's partial download was removed before 0001 was reused.
        assert!(!source_dir.join("0001").join("broken-1.jpg").exists());
        assert!(!source_dir.join("0002").exists());

        let saved = json::read_batch(&config.batch_path(&ctx, "bbc0")).await.unwrap();
        assert_eq!(saved, articles);
    }

    #[tokio::test]
    async fn test_existing_folder_skips_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let (config, ctx) = setup(dir.path());
        let batch_path = config.batch_path(&ctx, "bbc0");
        std::fs::create_dir_all(batch_path.parent().unwrap()).unwrap();
        std::fs::write(&batch_path, "[]").unwrap();

        let source = FakeSource::new("bbc0", &["https://b/a"]);
        let visited = VisitedSet::default();
        let curator = Curator::new(&config, &ctx, &visited);
        assert!(curator.curate(&source).await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_to_string(&batch_path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_batch_size_caps_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, ctx) = setup(dir.path());
        config.crawl.batch_size = 2;
        let source = FakeSource::new("bbc0", &["https://b/a", "https://b/noimg", "https://b/c"]);
        let visited = VisitedSet::default();
        let curator = Curator::new(&config, &ctx, &visited);
        let articles = curator.curate(&source).await.unwrap();
        // Only the first two candidates are examined, and one of them fails.
        assert_eq!(articles.len(), 1);
    }

    #[tokio::test]
    async fn test_crawl_all_unions_visited_once() {
        let dir = tempfile::tempdir().unwrap();
        let (config, ctx) = setup(dir.path());
        let sources = vec![
            FakeSource::new("bbc0", &["https://b/a"]),
            FakeSource::new("rt0", &["https://r/a", "https://r/b"]),
        ];
        let curated = crawl_all(&config, &ctx, &sources).await;
        assert_eq!(curated, 3);

        let visited = VisitedSet::load(dir.path(), "202506").await.unwrap();
        assert_eq!(visited.len(), 3);
        assert!(visited.contains("https://r/b"));

        // A second run finds the folders and adds nothing.
        assert_eq!(crawl_all(&config, &ctx, &sources).await, 0);
    }

    #[tokio::test]
    async fn test_nameless_image_is_not_acquired() {
        let dir = tempfile::tempdir().unwrap();
        let (config, ctx) = setup(dir.path());
        let source = FakeSource::new("bbc0", &["https://b/noname", "https://b/a"]);
        let visited = VisitedSet::default();
        let curator = Curator::new(&config, &ctx, &visited);
        let articles = curator.curate(&source).await.unwrap();

        let urls: Vec<&str> = articles.iter().map(|a| a.canonical_url.as_str()).collect();
        assert_eq!(urls, vec!["https://b/a"]);
        assert_eq!(articles[0].folder.as_deref(), Some("0000"));
    }
}
