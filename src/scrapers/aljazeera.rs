//! Al Jazeera scraper.
//!
//! Article paths embed the date without zero padding (`/2025/6/1/…`).
//! Liveblogs are dropped. Images and paragraphs are read from the main
//! content area only.

use super::{ExtractedPage, first_heading, hrefs, paragraphs_within, resolve_image, srcset_last, url_basename};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::error::Error;
use url::Url;

pub const SEEDS: &[&str] = &[
    "https://www.aljazeera.com/",
    "https://www.aljazeera.com/us-canada/",
    "https://www.aljazeera.com/asia-pacific/",
];

const ORIGIN: &str = "https://www.aljazeera.com";

static MAIN: Lazy<Selector> = Lazy::new(|| Selector::parse("main#main-content-area").unwrap());
static IMG_SRCSET: Lazy<Selector> = Lazy::new(|| Selector::parse("img[srcset]").unwrap());

pub fn extract_links(document: &Html, date: NaiveDate) -> Vec<String> {
    let marker = format!("{}/{}/{}", date.year(), date.month(), date.day());
    hrefs(document)
        .filter(|href| href.contains(&marker))
        .map(str::to_string)
        .collect()
}

pub fn normalize(href: &str) -> Option<String> {
    if href.contains("/liveblog") {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.starts_with(ORIGIN).then(|| href.to_string());
    }
    Some(format!("{ORIGIN}{href}"))
}

pub fn parse_article(document: &Html, base: &Url) -> Result<ExtractedPage, Box<dyn Error>> {
    let main = document
        .select(&MAIN)
        .next()
        .ok_or("main content area not found")?;

    let images = main
        .select(&IMG_SRCSET)
        .filter_map(|img| img.value().attr("srcset"))
        .filter_map(srcset_last)
        .filter_map(|src| resolve_image(base, &src))
        .map(|url| {
            let name = url_basename(&url);
            (url, name)
        })
        .collect();

    Ok(ExtractedPage {
        title: first_heading(document),
        body: paragraphs_within(&main),
        images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpadded_date_links() {
        let html = r#"<html><body>
            <a href="/news/2025/6/1/talks-resume">a</a>
            <a href="/news/liveblog/2025/6/1/live-updates">live</a>
            <a href="/news/2025/06/01/padded">padded</a>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let links: Vec<String> = extract_links(&doc, date)
            .iter()
            .filter_map(|h| normalize(h))
            .collect();
        assert_eq!(
            links,
            vec!["https://www.aljazeera.com/news/2025/6/1/talks-resume".to_string()]
        );
    }

    #[test]
    fn test_last_srcset_candidate_and_query_stripped() {
        let html = r#"<html><body>
            <h1>Talks resume</h1>
            <main id="main-content-area">
                <img srcset="/wp-content/uploads/2025/06/a.jpg?resize=300%2C200 300w, /wp-content/uploads/2025/06/a.jpg?resize=770%2C513 770w">
                <p>Negotiators met again on Sunday in Doha.</p>
            </main>
            <footer><p>Footer text that is long enough.</p></footer>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://www.aljazeera.com/news/2025/6/1/talks-resume").unwrap();
        let page = parse_article(&doc, &base).unwrap();
        assert_eq!(page.images.len(), 1);
        assert_eq!(
            page.images[0].0,
            "https://www.aljazeera.com/wp-content/uploads/2025/06/a.jpg?resize=770%2C513"
        );
        assert_eq!(page.images[0].1, "a.jpg");
        assert_eq!(page.body, "Negotiators met again on Sunday in Doha.");
    }

    #[test]
    fn test_missing_main_is_error() {
        let doc = Html::parse_document("<html><body><h1>x</h1></body></html>");
        let base = Url::parse("https://www.aljazeera.com/").unwrap();
        assert!(parse_article(&doc, &base).is_err());
    }
}
