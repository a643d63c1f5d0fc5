//! BBC scraper.
//!
//! Article links are site-relative `/…/articles/…` paths. Images sit in
//! `image-block` components and only expose a responsive `srcset`; the
//! widest candidate is kept and its `.webp` suffix dropped from the file
//! name.

use super::{ExtractedPage, document_paragraphs, first_heading, hrefs, srcset_widths, url_basename};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::error::Error;
use tracing::warn;

pub const SEEDS: &[&str] = &[
    "https://www.bbc.com/news",
    "https://www.bbc.com/business",
    "https://www.bbc.com/innovation",
    "https://www.bbc.com/future-planet",
    "https://www.bbc.com",
];

const ORIGIN: &str = "https://www.bbc.com";

static IMAGE_BLOCK_IMAGES: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[data-component="image-block"] img[srcset]"#).unwrap());

pub fn extract_links(document: &Html) -> Vec<String> {
    hrefs(document)
        .filter(|href| href.contains("/articles/") && !href.contains("/live/"))
        .map(str::to_string)
        .collect()
}

pub fn normalize(href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.starts_with(ORIGIN).then(|| href.to_string());
    }
    Some(format!("{ORIGIN}{href}"))
}

pub fn parse_article(document: &Html) -> Result<ExtractedPage, Box<dyn Error>> {
    let mut images = Vec::new();
    for img in document.select(&IMAGE_BLOCK_IMAGES) {
        let Some(srcset) = img.value().attr("srcset") else {
            continue;
        };
        match srcset_widths(srcset).into_iter().max_by_key(|(_, w)| *w) {
            Some((url, _)) => {
                let name = url_basename(&url).replace(".webp", "");
                if name.is_empty() {
                    warn!(%url, "Image URL has no file name");
                    continue;
                }
                images.push((url, name));
            }
            None => warn!(srcset, "No usable srcset candidate"),
        }
    }
    Ok(ExtractedPage {
        title: first_heading(document),
        body: document_paragraphs(document),
        images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widest_candidate_wins() {
        let html = r#"<html><body><h1>Storm batters coast</h1>
            <div data-component="image-block">
                <img srcset="https://ichef.bbci.co.uk/news/240/cpsprodpb/a.jpg.webp 240w, https://ichef.bbci.co.uk/news/1024/cpsprodpb/a.jpg.webp 1024w, https://ichef.bbci.co.uk/news/480/cpsprodpb/a.jpg.webp 480w">
            </div>
            <div data-component="text-block"><p>Residents were told to stay indoors overnight.</p></div>
            <div><img srcset="https://ichef.bbci.co.uk/ad.jpg 100w"></div>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let page = parse_article(&doc).unwrap();
        assert_eq!(page.title, "Storm batters coast");
        assert_eq!(
            page.images,
            vec![(
                "https://ichef.bbci.co.uk/news/1024/cpsprodpb/a.jpg.webp".to_string(),
                "a.jpg".to_string()
            )]
        );
        assert_eq!(page.body, "Residents were told to stay indoors overnight.");
    }

    #[test]
    fn test_link_rules() {
        let html = r#"<html><body>
            <a href="/news/articles/c0abc">a</a>
            <a href="/news/live/c0live/articles/x">live</a>
            <a href="/sport/football">sport</a>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let links: Vec<String> = extract_links(&doc).iter().filter_map(|h| normalize(h)).collect();
        assert_eq!(links, vec!["https://www.bbc.com/news/articles/c0abc".to_string()]);
    }
}
