//! China Daily scrapers, Chinese and English editions.
//!
//! Both editions share the link rule: article URLs carry the publication
//! date as `YYYYMM/DD`, and are often protocol-relative (`//…`). They differ
//! in the image container and in where the body gets cut.

use super::{ExtractedPage, document_paragraphs, first_heading, hrefs, resolve_image, truncate_at_terminator, url_basename};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::error::Error;
use url::Url;

pub const SEEDS: &[&str] = &[
    "https://cn.chinadaily.com.cn/",
    "https://china.chinadaily.com.cn/",
    "https://world.chinadaily.com.cn/",
];

pub const SEEDS_EN: &[&str] = &[
    "https://www.chinadaily.com.cn",
    "https://www.chinadaily.com.cn/world",
    "https://www.chinadaily.com.cn/business",
];

static CONTENT_IMAGES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.Artical_Content img[src]").unwrap());
static CONTENT_IMAGES_EN: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div#Content img[src]").unwrap());

const BODY_CUT_CHARS: usize = 700;
const BODY_CUT_CHARS_EN: usize = 4000;

pub fn extract_links(document: &Html, date: NaiveDate) -> Vec<String> {
    let marker = date.format("%Y%m/%d").to_string();
    hrefs(document)
        .filter(|href| href.contains(&marker))
        .map(str::to_string)
        .collect()
}

/// Resolve `href` against the index page it was found on; the three
/// Chinese seeds live on different hosts.
pub fn normalize(seed: &Url, href: &str) -> Option<String> {
    seed.join(href.trim()).ok().map(String::from)
}

fn parse_with(
    document: &Html,
    base: &Url,
    images: &Selector,
    cut_chars: usize,
    terminator: char,
) -> ExtractedPage {
    let images = document
        .select(images)
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| resolve_image(base, src))
        .map(|url| {
            let name = url_basename(&url);
            (url, name)
        })
        .collect();
    ExtractedPage {
        title: first_heading(document),
        body: truncate_at_terminator(&document_paragraphs(document), cut_chars, terminator),
        images,
    }
}

pub fn parse_article(document: &Html, base: &Url) -> Result<ExtractedPage, Box<dyn Error>> {
    Ok(parse_with(document, base, &CONTENT_IMAGES, BODY_CUT_CHARS, '。'))
}

pub fn parse_article_en(document: &Html, base: &Url) -> Result<ExtractedPage, Box<dyn Error>> {
    Ok(parse_with(document, base, &CONTENT_IMAGES_EN, BODY_CUT_CHARS_EN, '.'))
}
