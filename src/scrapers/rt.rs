//! RT scraper.
//!
//! The lead image is the first `<picture>` in the article container; its
//! second `<source>` carries a lazy-loaded `data-srcset` whose last
//! candidate is the largest rendition.

use super::{ExtractedPage, absolutize, first_heading, hrefs, paragraphs_within, resolve_image, srcset_last, url_basename};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::error::Error;
use url::Url;

pub const SEEDS: &[&str] = &["https://www.rt.com/", "https://www.rt.com/news/"];

static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.article").unwrap());
static PICTURE: Lazy<Selector> = Lazy::new(|| Selector::parse("picture").unwrap());
static SOURCE: Lazy<Selector> = Lazy::new(|| Selector::parse("source").unwrap());

pub fn extract_links(document: &Html) -> Vec<String> {
    hrefs(document)
        .filter(|href| href.contains("/news/") || href.contains("/russia/"))
        .map(str::to_string)
        .collect()
}

pub fn normalize(href: &str) -> Option<String> {
    Some(absolutize("https://www.rt.com", href))
}

pub fn parse_article(document: &Html, base: &Url) -> Result<ExtractedPage, Box<dyn Error>> {
    let article = document
        .select(&ARTICLE)
        .next()
        .ok_or("article container not found")?;

    let lead = article
        .select(&PICTURE)
        .next()
        .and_then(|picture| picture.select(&SOURCE).nth(1))
        .and_then(|source| source.value().attr("data-srcset"))
        .and_then(srcset_last)
        .and_then(|src| resolve_image(base, &src));

    let images = lead
        .into_iter()
        .map(|url| {
            let name = url_basename(&url);
            (url, name)
        })
        .collect();

    Ok(ExtractedPage {
        title: first_heading(document),
        body: paragraphs_within(&article),
        images,
    })
}
