//! News source scrapers.
//!
//! Each source follows the same two-phase pattern:
//!
//! 1. **Discovery**: fetch a handful of index pages and collect article links
//!    that match a source-specific rule (date fragment or path fragment)
//! 2. **Extraction**: fetch one article page and pull out the title, body text
//!    and image URLs with source-specific selectors
//!
//! # Supported Sources
//!
//! | Source | Module | Language | Link rule |
//! |--------|--------|----------|-----------|
//! | China Daily | [`chinadaily`] | native | `YYYYMM/DD` in href |
//! | China Daily (English) | [`chinadaily`] | foreign | `YYYYMM/DD` in href |
//! | BBC | [`bbc`] | foreign | `/articles/`, not `/live/` |
//! | Al Jazeera | [`aljazeera`] | foreign | `YYYY/M/D` in href, no liveblogs |
//! | RT | [`rt`] | foreign | `/news/` or `/russia/` |
//!
//! The per-site modules are pure HTML parsing. Network access goes through
//! [`Fetcher`], and [`Scraper`] ties one site to a fetcher behind the
//! [`NewsSource`] trait the curator consumes.
//!
//! Failures never propagate out of a scraper: a failed index page is skipped,
//! a failed article page yields `None`, both logged with source and URL.

pub mod aljazeera;
pub mod bbc;
pub mod chinadaily;
pub mod rt;

use crate::config::CrawlConfig;
use crate::models::{Article, UNTITLED};
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use rand::seq::IndexedRandom;
use rand::{Rng, rng};
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Proxy};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Paragraph runs of this many characters or fewer are dropped from bodies.
const MIN_PARAGRAPH_CHARS: usize = 10;

static USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static P: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static A_HREF: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static WIDTH_DESCRIPTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?://[^ ]+) +(\d+)w$").unwrap());

/// The news sites this pipeline knows how to crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ChinaDaily,
    ChinaDailyEn,
    Bbc,
    AlJazeera,
    Rt,
}

impl SourceKind {
    /// Order in which sources appear in a merged edition.
    pub const EDITION_ORDER: [SourceKind; 5] = [
        SourceKind::Rt,
        SourceKind::Bbc,
        SourceKind::AlJazeera,
        SourceKind::ChinaDailyEn,
        SourceKind::ChinaDaily,
    ];

    pub fn base_tag(self) -> &'static str {
        match self {
            SourceKind::ChinaDaily => "chinadaily",
            SourceKind::ChinaDailyEn => "chinadaily_en",
            SourceKind::Bbc => "bbc",
            SourceKind::AlJazeera => "alj",
            SourceKind::Rt => "rt",
        }
    }

    /// Run-scoped source tag, e.g. `bbc0`.
    pub fn tag(self, times: u32) -> String {
        format!("{}{}", self.base_tag(), times)
    }

    pub fn category(self) -> &'static str {
        match self {
            SourceKind::ChinaDaily | SourceKind::ChinaDailyEn => "中国日报",
            SourceKind::Bbc => "英国广播公司",
            SourceKind::AlJazeera => "中东半岛新闻",
            SourceKind::Rt => "今日俄罗斯",
        }
    }

    pub fn default_politeness_secs(self) -> u64 {
        match self {
            SourceKind::Bbc | SourceKind::AlJazeera => 20,
            SourceKind::ChinaDaily | SourceKind::ChinaDailyEn | SourceKind::Rt => 4,
        }
    }

    pub fn is_foreign(self) -> bool {
        !matches!(self, SourceKind::ChinaDaily)
    }

    pub fn seeds(self) -> &'static [&'static str] {
        match self {
            SourceKind::ChinaDaily => chinadaily::SEEDS,
            SourceKind::ChinaDailyEn => chinadaily::SEEDS_EN,
            SourceKind::Bbc => bbc::SEEDS,
            SourceKind::AlJazeera => aljazeera::SEEDS,
            SourceKind::Rt => rt::SEEDS,
        }
    }

    /// Hrefs on one index page that look like article links for `date`.
    pub fn extract_links(self, html: &str, date: NaiveDate) -> Vec<String> {
        let document = Html::parse_document(html);
        match self {
            SourceKind::ChinaDaily | SourceKind::ChinaDailyEn => {
                chinadaily::extract_links(&document, date)
            }
            SourceKind::Bbc => bbc::extract_links(&document),
            SourceKind::AlJazeera => aljazeera::extract_links(&document, date),
            SourceKind::Rt => rt::extract_links(&document),
        }
    }

    /// Turn a raw href found on `seed` into an absolute article URL, or drop it.
    pub fn normalize_link(self, seed: &Url, href: &str) -> Option<String> {
        match self {
            SourceKind::ChinaDaily | SourceKind::ChinaDailyEn => chinadaily::normalize(seed, href),
            SourceKind::Bbc => bbc::normalize(href),
            SourceKind::AlJazeera => aljazeera::normalize(href),
            SourceKind::Rt => rt::normalize(href),
        }
    }

    pub fn parse_page(self, html: &str, url: &str) -> Result<ExtractedPage, Box<dyn Error>> {
        let document = Html::parse_document(html);
        let base = Url::parse(url)?;
        match self {
            SourceKind::ChinaDaily => chinadaily::parse_article(&document, &base),
            SourceKind::ChinaDailyEn => chinadaily::parse_article_en(&document, &base),
            SourceKind::Bbc => bbc::parse_article(&document),
            SourceKind::AlJazeera => aljazeera::parse_article(&document, &base),
            SourceKind::Rt => rt::parse_article(&document, &base),
        }
    }
}

/// What a site parser pulls out of one article page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub body: String,
    /// `(remote URL, local file name)` pairs.
    pub images: Vec<(String, String)>,
}

impl ExtractedPage {
    /// Build the article record, placing text by the source's language.
    pub fn into_article(self, kind: SourceKind, source_id: &str, url: &str) -> Article {
        let mut article = Article::new(source_id, kind.category(), url);
        if kind.is_foreign() {
            article.title_foreign = Some(self.title);
            article.body_foreign = Some(self.body);
        } else {
            article.title = Some(self.title);
            article.body_native = Some(self.body);
        }
        for (url, filename) in self.images {
            article.push_image(url, filename);
        }
        article
    }
}

/// A crawlable news source as seen by the curator.
pub trait NewsSource {
    fn kind(&self) -> SourceKind;

    /// Run-scoped tag naming this source's output folder.
    fn source_id(&self) -> &str;

    /// Deduplicated absolute article URLs for `date`, in discovery order.
    async fn discover_links(&self, date: NaiveDate) -> Vec<String>;

    /// Fetch and parse one article; `None` on any failure.
    async fn extract_article(&self, url: &str) -> Option<Article>;

    /// Raw bytes of one article image.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, Box<dyn Error>>;
}

/// HTTP access shared by all sources: browser-like headers, a random
/// User-Agent per request, a timeout, an optional proxy, and a politeness
/// delay before each page fetch.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    page_timeout: Duration,
    image_timeout: Duration,
}

impl Fetcher {
    pub fn new(cfg: &CrawlConfig) -> Result<Self, Box<dyn Error>> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
        headers.insert(
            HeaderName::from_static("upgrade-insecure-requests"),
            HeaderValue::from_static("1"),
        );

        let mut builder = Client::builder().default_headers(headers);
        if let Some(proxy) = &cfg.proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
            page_timeout: Duration::from_secs(cfg.page_timeout_secs),
            image_timeout: Duration::from_secs(cfg.image_timeout_secs),
        })
    }

    fn user_agent() -> &'static str {
        USER_AGENTS.choose(&mut rng()).copied().unwrap_or(USER_AGENTS[0])
    }

    /// Sleep a uniform random `[secs/2, secs]` seconds.
    async fn pause(secs: u64) {
        if secs == 0 {
            return;
        }
        let wait = rng().random_range(secs / 2..=secs);
        debug!(wait, "Politeness delay");
        tokio::time::sleep(Duration::from_secs(wait)).await;
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_page(&self, url: &str, politeness_secs: u64) -> Result<String, Box<dyn Error>> {
        Self::pause(politeness_secs).await;
        let body = self
            .client
            .get(url)
            .header(USER_AGENT, Self::user_agent())
            .timeout(self.page_timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, Box<dyn Error>> {
        let bytes = self
            .client
            .get(url)
            .header(USER_AGENT, Self::user_agent())
            .timeout(self.image_timeout)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

/// One configured source bound to the shared [`Fetcher`].
#[derive(Debug, Clone)]
pub struct Scraper {
    kind: SourceKind,
    source_id: String,
    politeness_secs: u64,
    fetcher: Fetcher,
}

impl Scraper {
    pub fn new(kind: SourceKind, times: u32, cfg: &CrawlConfig, fetcher: Fetcher) -> Self {
        Self {
            kind,
            source_id: kind.tag(times),
            politeness_secs: cfg.politeness_for(kind),
            fetcher,
        }
    }
}

impl NewsSource for Scraper {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    #[instrument(level = "info", skip(self), fields(source = %self.source_id))]
    async fn discover_links(&self, date: NaiveDate) -> Vec<String> {
        let mut pages = Vec::new();
        for seed in self.kind.seeds() {
            let page = self.fetcher.fetch_page(seed, self.politeness_secs).await;
            pages.push((*seed, page));
        }
        let urls = collect_links(self.kind, pages, date);
        info!(count = urls.len(), "Discovered article links");
        urls
    }

    #[instrument(level = "debug", skip(self), fields(source = %self.source_id))]
    async fn extract_article(&self, url: &str) -> Option<Article> {
        let html = match self.fetcher.fetch_page(url, self.politeness_secs).await {
            Ok(html) => html,
            Err(e) => {
                warn!(%url, error = %e, "Article fetch failed");
                return None;
            }
        };
        match self.kind.parse_page(&html, url) {
            Ok(page) => {
                debug!(%url, images = page.images.len(), "Extracted article");
                Some(page.into_article(self.kind, &self.source_id, url))
            }
            Err(e) => {
                warn!(%url, error = %e, "Article parse failed");
                None
            }
        }
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, Box<dyn Error>> {
        self.fetcher.fetch_bytes(url).await
    }
}

/// Merge the article links of every fetched index page, in seed order.
///
/// A page that failed to fetch (or whose seed is not a URL) is skipped; the
/// rest still count. Links are deduplicated across seeds after
/// normalisation.
pub fn collect_links<'s, E: Display>(
    kind: SourceKind,
    pages: impl IntoIterator<Item = (&'s str, Result<String, E>)>,
    date: NaiveDate,
) -> Vec<String> {
    let mut urls = Vec::new();
    for (seed, page) in pages {
        let html = match page {
            Ok(html) => html,
            Err(e) => {
                warn!(%seed, error = %e, "Seed page fetch failed; skipping");
                continue;
            }
        };
        let Ok(base) = Url::parse(seed) else {
            warn!(%seed, "Seed is not a valid URL; skipping");
            continue;
        };
        let found = kind.extract_links(&html, date);
        info!(%seed, count = found.len(), "Indexed seed page");
        urls.extend(
            found
                .iter()
                .unique()
                .filter_map(|href| kind.normalize_link(&base, href)),
        );
    }
    urls.into_iter().unique().collect()
}

/// Text of the first `<h1>`, or the untitled placeholder.
pub fn first_heading(document: &Html) -> String {
    document
        .select(&H1)
        .next()
        .map(|h| element_text(&h))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// Whitespace-collapsed text of an element.
pub fn element_text(element: &ElementRef) -> String {
    element.text().flat_map(str::split_whitespace).join(" ")
}

/// Space-joined text of paragraphs longer than the minimum run length.
pub fn join_paragraphs<'a, I>(paragraphs: I) -> String
where
    I: IntoIterator<Item = ElementRef<'a>>,
{
    paragraphs
        .into_iter()
        .map(|p| element_text(&p))
        .filter(|t| t.chars().count() > MIN_PARAGRAPH_CHARS)
        .join(" ")
}

/// Every `<p>` in the document, joined.
pub fn document_paragraphs(document: &Html) -> String {
    join_paragraphs(document.select(&P))
}

/// Every `<p>` under `root`, joined.
pub fn paragraphs_within(root: &ElementRef) -> String {
    join_paragraphs(root.select(&P))
}

/// Cut `text` just after the first `terminator` found at or beyond
/// `at_chars` characters; text that is short enough, or has no terminator
/// past that point, is returned whole.
pub fn truncate_at_terminator(text: &str, at_chars: usize, terminator: char) -> String {
    if text.chars().count() <= at_chars {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .skip(at_chars)
        .find(|(_, c)| *c == terminator)
        .map(|(i, c)| i + c.len_utf8());
    match cut {
        Some(end) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// `srcset` entries as `(url, width)` where the descriptor is `NNNw`.
pub fn srcset_widths(srcset: &str) -> Vec<(String, u32)> {
    srcset
        .split(',')
        .filter_map(|entry| {
            let caps = WIDTH_DESCRIPTOR.captures(entry.trim())?;
            let width = caps[2].parse().ok()?;
            Some((caps[1].to_string(), width))
        })
        .collect()
}

/// URL of the last `srcset` candidate.
pub fn srcset_last(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .filter_map(|entry| entry.split_whitespace().next())
        .last()
        .map(str::to_string)
}

/// Absolute image URL, skipping inline `data:` images.
pub fn resolve_image(base: &Url, src: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    let url = base.join(src).ok()?.to_string();
    // The basename becomes the local file name; a directory URL has none.
    (!url_basename(&url).is_empty()).then_some(url)
}

/// Last path segment of an image URL.
pub fn url_basename(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Prefix site-relative hrefs with `origin`; absolute ones are kept.
pub fn absolutize(origin: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("{origin}{href}")
    }
}

/// All `a[href]` values in document order.
pub fn hrefs(document: &Html) -> impl Iterator<Item = &str> {
    document
        .select(&A_HREF)
        .filter_map(|a| a.value().attr("href"))
}
