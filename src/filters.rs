//! Content filters applied at curation time and after summarization.
//!
//! Curation filters reject a candidate outright ([`screen`]); summary gates
//! only hide an article from the video while keeping the record
//! ([`review_summary`]).
//!
//! The two sensitivity checks are deliberately asymmetric: native-language
//! text is rejected only when more than one distinct keyword occurs, while a
//! single hit of a foreign-language term rejects.

use crate::config::FilterConfig;
use crate::models::Article;
use std::fmt;

/// Why a candidate article was dropped during curation.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NoImages,
    SensitiveNative { field: &'static str, hits: usize },
    SensitiveForeign { field: &'static str },
    TitleTooShort { chars: usize },
    BodyTooShort { chars: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoImages => write!(f, "no images found"),
            Rejection::SensitiveNative { field, hits } => {
                write!(f, "{field} hits {hits} sensitive keywords")
            }
            Rejection::SensitiveForeign { field } => write!(f, "{field} contains a sensitive term"),
            Rejection::TitleTooShort { chars } => write!(f, "title too short ({chars} chars)"),
            Rejection::BodyTooShort { chars } => write!(f, "body too short ({chars} chars)"),
        }
    }
}

/// Why a summarized article was hidden.
#[derive(Debug, Clone, PartialEq)]
pub enum HideReason {
    NoSummary,
    MostlyLatin { fraction: f64 },
    Boilerplate,
}

impl fmt::Display for HideReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HideReason::NoSummary => write!(f, "summary could not be generated"),
            HideReason::MostlyLatin { fraction } => {
                write!(f, "summary is {:.0}% latin letters", fraction * 100.0)
            }
            HideReason::Boilerplate => write!(f, "summary is a copyright notice"),
        }
    }
}

/// Number of distinct keywords present in `text`.
pub fn keyword_hits(text: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|kw| !kw.is_empty() && text.contains(kw.as_str()))
        .count()
}

pub fn is_sensitive_native(text: &str, keywords: &[String]) -> bool {
    keyword_hits(text, keywords) > 1
}

pub fn is_sensitive_foreign(text: &str, keywords: &[String]) -> bool {
    keyword_hits(text, keywords) > 0
}

/// Run the curation filters in order, returning the first failure.
pub fn screen(article: &Article, cfg: &FilterConfig) -> Result<(), Rejection> {
    if article.image_count() == 0 {
        return Err(Rejection::NoImages);
    }

    let native = [("title", &article.title), ("body", &article.body_native)];
    for (field, text) in native {
        if let Some(text) = text {
            let hits = keyword_hits(text, &cfg.native_keywords);
            if hits > 1 {
                return Err(Rejection::SensitiveNative { field, hits });
            }
        }
    }

    let foreign = [
        ("title", &article.title_foreign),
        ("body", &article.body_foreign),
    ];
    for (field, text) in foreign {
        if text
            .as_deref()
            .is_some_and(|t| is_sensitive_foreign(t, &cfg.foreign_keywords))
        {
            return Err(Rejection::SensitiveForeign { field });
        }
    }

    let title_chars = article.display_title().chars().count();
    if title_chars < cfg.min_title_chars {
        return Err(Rejection::TitleTooShort { chars: title_chars });
    }

    let body = article
        .body_native
        .as_deref()
        .or(article.body_foreign.as_deref())
        .unwrap_or("");
    let body_chars = body.chars().count();
    if body_chars < cfg.min_body_chars {
        return Err(Rejection::BodyTooShort { chars: body_chars });
    }

    Ok(())
}

/// Fraction of characters in `text` that are ASCII letters.
pub fn latin_fraction(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let latin = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    latin as f64 / total as f64
}

/// True when every configured phrase occurs in `text`.
pub fn is_boilerplate(text: &str, phrases: &[String]) -> bool {
    !phrases.is_empty() && phrases.iter().all(|p| text.contains(p.as_str()))
}

/// Post-summarization gates. `None` means the article stays visible.
pub fn review_summary(summary: Option<&str>, cfg: &FilterConfig) -> Option<HideReason> {
    let summary = match summary {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Some(HideReason::NoSummary),
    };
    let fraction = latin_fraction(summary);
    if fraction > cfg.latin_fraction_limit {
        return Some(HideReason::MostlyLatin { fraction });
    }
    if is_boilerplate(summary, &cfg.boilerplate_phrases) {
        return Some(HideReason::Boilerplate);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native_article(title: &str, body: &str) -> Article {
        let mut a = Article::new("chinadaily0", "中国日报", "https://cn.chinadaily.com.cn/a/1.html");
        a.title = Some(title.to_string());
        a.body_native = Some(body.to_string());
        a.push_image("https://img/1.jpg".to_string(), "1.jpg".to_string());
        a
    }

    #[test]
    fn test_single_native_hit_is_retained() {
        let cfg = FilterConfig::default();
        let a = native_article("全省推进乡村振兴", "某县今年粮食产量创历史新高，农民收入持续增长。");
        assert_eq!(keyword_hits(a.body_native.as_deref().unwrap(), &cfg.native_keywords), 1);
        assert_eq!(screen(&a, &cfg), Ok(()));
    }

    #[test]
    fn test_two_distinct_native_hits_are_rejected() {
        let cfg = FilterConfig::default();
        let a = native_article("标题正常", "某县近日举行会议，部署相关工作。");
        assert_eq!(
            screen(&a, &cfg),
            Err(Rejection::SensitiveNative { field: "body", hits: 2 })
        );
    }

    #[test]
    fn test_repeated_single_keyword_counts_once() {
        let cfg = FilterConfig::default();
        assert!(!is_sensitive_native("县县县县", &cfg.native_keywords));
    }

    #[test]
    fn test_one_foreign_hit_rejects() {
        let cfg = FilterConfig::default();
        let mut a = Article::new("bbc0", "英国广播公司", "https://www.bbc.com/news/articles/x");
        a.title_foreign = Some("Leaders meet in Beijing".to_string());
        a.body_foreign = Some("Xi Jinping met visiting delegates on Monday.".to_string());
        a.push_image("https://img/2.jpg".to_string(), "2.jpg".to_string());
        assert_eq!(
            screen(&a, &cfg),
            Err(Rejection::SensitiveForeign { field: "body" })
        );
    }

    #[test]
    fn test_no_images_rejected_first() {
        let cfg = FilterConfig::default();
        let mut a = native_article("标题", "足够长的正文内容在这里。");
        a.image_filenames.clear();
        a.image_urls.clear();
        assert_eq!(screen(&a, &cfg), Err(Rejection::NoImages));
    }

    #[test]
    fn test_length_limits() {
        let cfg = FilterConfig::default();
        let a = native_article("标", "足够长的正文内容在这里。");
        assert_eq!(screen(&a, &cfg), Err(Rejection::TitleTooShort { chars: 1 }));
        let a = native_article("标题", "太短了");
        assert_eq!(screen(&a, &cfg), Err(Rejection::BodyTooShort { chars: 3 }));
    }

    #[test]
    fn test_latin_fraction_boundary() {
        let cfg = FilterConfig::default();
        // 2 latin letters out of 5 chars: exactly 0.4, stays visible.
        let at_limit = "ab中文字";
        assert!((latin_fraction(at_limit) - 0.4).abs() < f64::EPSILON);
        assert_eq!(review_summary(Some(at_limit), &cfg), None);

        // 41 latin letters out of 100 chars: hidden.
        let over = format!("{}{}", "a".repeat(41), "中".repeat(59));
        assert!(matches!(
            review_summary(Some(&over), &cfg),
            Some(HideReason::MostlyLatin { .. })
        ));
    }

    #[test]
    fn test_boilerplate_needs_both_phrases() {
        let cfg = FilterConfig::default();
        assert_eq!(
            review_summary(Some("版权声明：未经授权不得转载"), &cfg),
            Some(HideReason::Boilerplate)
        );
        assert_eq!(review_summary(Some("本文版权声明见页尾"), &cfg), None);
    }

    #[test]
    fn test_missing_summary_hides() {
        let cfg = FilterConfig::default();
        assert_eq!(review_summary(None, &cfg), Some(HideReason::NoSummary));
        assert_eq!(review_summary(Some("  "), &cfg), Some(HideReason::NoSummary));
    }
}
