//! Screen arithmetic for the composited clips. Pure functions only.
//!
//! An article clip is laid out inside an inner frame (the output size minus
//! a 2% gap) as:
//!
//! ```text
//! +--------------------------------------------+
//! | n title                        (title bar) |
//! +--------------------------------------------+
//! |                                            |
//! |        images, one per time segment        |  75% of the rest
//! |                                            |
//! +--------------------------------+-----------+
//! |            caption             | presenter |  80% / 20% width
//! +--------------------------------+-----------+
//! ```

use chrono::{Datelike, NaiveDate, Weekday};

pub const TITLE_BAR_HEIGHT: u32 = 40;
pub const TITLE_FONT_SIZE: u32 = 40;
const TOP_REGION_RATIO: f64 = 0.75;
const PRESENTER_WIDTH_RATIO: f64 = 0.2;
const CAPTION_FILL_RATIO: f64 = 0.95;

const CAPTION_START_FONT: u32 = 72;
const CAPTION_FALLBACK_FONT: u32 = 40;
const CHAR_WIDTH_RATIO: f64 = 1.0;
const LINE_HEIGHT_RATIO: f64 = 1.5;

/// Frame gap in pixels: 2% of the output width.
pub fn frame_gap(width: u32) -> u32 {
    (width as f64 * 0.02) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipLayout {
    pub width: u32,
    pub height: u32,
    pub title_height: u32,
    pub top_height: u32,
    pub bottom_height: u32,
    pub caption_width: u32,
    pub presenter_width: u32,
}

impl ClipLayout {
    /// Layout of an article clip for an output frame of `width` × `height`.
    pub fn for_frame(width: u32, height: u32) -> Self {
        let gap = frame_gap(width);
        let inner_w = width.saturating_sub(gap);
        let inner_h = height.saturating_sub(gap);
        let title_height = TITLE_BAR_HEIGHT.min(inner_h);
        let top_height = (inner_h.saturating_sub(title_height) as f64 * TOP_REGION_RATIO) as u32;
        let bottom_height = inner_h.saturating_sub(top_height + title_height);
        let presenter_width = (inner_w as f64 * PRESENTER_WIDTH_RATIO) as u32;
        Self {
            width: inner_w,
            height: inner_h,
            title_height,
            top_height,
            bottom_height,
            caption_width: inner_w.saturating_sub(presenter_width),
            presenter_width,
        }
    }

    /// Usable caption box; text is fitted to 95% of the region.
    pub fn caption_box(&self) -> (f64, f64) {
        (
            self.caption_width as f64 * CAPTION_FILL_RATIO,
            self.bottom_height as f64 * CAPTION_FILL_RATIO,
        )
    }
}

/// Panel drawn behind each clip in the final edition, as
/// `(x, y, w, h)`: inset 1.5 gaps from every edge.
pub fn concat_panel(width: u32, height: u32) -> (u32, u32, u32, u32) {
    let inset = frame_gap(width) * 3 / 2;
    (
        inset,
        inset,
        width.saturating_sub(2 * inset),
        height.saturating_sub(2 * inset),
    )
}

/// Font size and wrap width for a caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionFit {
    pub font_size: u32,
    pub chars_per_line: usize,
}

/// Largest font size, counting down from 72, at which `text` wrapped at a
/// whole number of characters per line fits `box_w` × `box_h`.
pub fn fit_caption(text: &str, box_w: f64, box_h: f64) -> CaptionFit {
    let len = text.chars().count();
    for font_size in (1..=CAPTION_START_FONT).rev() {
        let char_width = font_size as f64 * CHAR_WIDTH_RATIO;
        let line_height = font_size as f64 * LINE_HEIGHT_RATIO;
        let chars_per_line = ((box_w / char_width).floor() as usize).max(1);
        let lines = len.div_ceil(chars_per_line);
        if lines as f64 * line_height <= box_h {
            return CaptionFit {
                font_size,
                chars_per_line,
            };
        }
    }
    CaptionFit {
        font_size: CAPTION_FALLBACK_FONT,
        chars_per_line: len.max(1),
    }
}

/// Insert a newline every `n` characters.
pub fn wrap_chars(text: &str, n: usize) -> String {
    if n == 0 {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(n)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split `duration` into `n` equal back-to-back `(start, end)` intervals.
pub fn segment_times(duration: f64, n: usize) -> Vec<(f64, f64)> {
    if n == 0 {
        return Vec::new();
    }
    let step = duration / n as f64;
    (0..n)
        .map(|i| (i as f64 * step, (i + 1) as f64 * step))
        .collect()
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "星期一",
        Weekday::Tue => "星期二",
        Weekday::Wed => "星期三",
        Weekday::Thu => "星期四",
        Weekday::Fri => "星期五",
        Weekday::Sat => "星期六",
        Weekday::Sun => "星期日",
    }
}

/// Topic overlay color for the day of the week.
pub fn weekday_color(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Red",
        Weekday::Tue => "Orange",
        Weekday::Wed => "Yellow",
        Weekday::Thu => "Green",
        Weekday::Fri => "Blue",
        Weekday::Sat => "Purple",
        Weekday::Sun => "Pink",
    }
}

/// Opening line, narrated and drawn on the intro card.
pub fn intro_text(date: NaiveDate, edition_name: &str) -> String {
    format!(
        "今天是{}, {}, 欢迎收看【{}】",
        date.format("%Y年%m月%d日"),
        weekday_name(date.weekday()),
        edition_name
    )
}

/// Intro date-line font size: the longest line spans 75% of the width.
pub fn intro_font_size(text: &str, width: u32) -> u32 {
    let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(1).max(1);
    (width as f64 / longest as f64 * 0.75) as u32
}

/// Topic overlay font size: five lines in 75% of the height, at 60%.
pub fn topic_font_size(height: u32) -> u32 {
    (height as f64 * 0.75 / 5.0 * 0.6) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_frame_does_not_underflow() {
        let layout = ClipLayout::for_frame(10, 10);
        assert_eq!(layout.width, 10);
        assert_eq!(layout.title_height, 10);
        assert_eq!(layout.top_height, 0);
        assert_eq!(layout.bottom_height, 0);
        assert_eq!(layout.caption_width + layout.presenter_width, 10);

        let squat = ClipLayout::for_frame(1920, 30);
        assert_eq!(squat.height, 0);
        assert_eq!(squat.bottom_height, 0);
        assert_eq!(concat_panel(1920, 100), (57, 57, 1806, 0));
    }

    #[test]
    fn test_full_hd_layout() {
        let layout = ClipLayout::for_frame(1920, 1080);
        assert_eq!(frame_gap(1920), 38);
        assert_eq!((layout.width, layout.height), (1882, 1042));
        assert_eq!(layout.top_height, 751);
        assert_eq!(layout.bottom_height, 251);
        assert_eq!(layout.presenter_width, 376);
        assert_eq!(layout.caption_width, 1506);
        assert_eq!(concat_panel(1920, 1080), (57, 57, 1806, 966));
    }

    #[test]
    fn test_fit_caption_long_summary() {
        let text = "字".repeat(150);
        let fit = fit_caption(&text, 1430.7, 238.45);
        assert_eq!(fit, CaptionFit { font_size: 37, chars_per_line: 38 });
    }

    #[test]
    fn test_fit_caption_short_text_uses_start_size() {
        let fit = fit_caption("短", 1430.7, 238.45);
        assert_eq!(fit.font_size, 72);
        assert_eq!(fit.chars_per_line, 19);
    }

    #[test]
    fn test_fit_caption_fallback() {
        let fit = fit_caption(&"字".repeat(50), 1.0, 1.0);
        assert_eq!(fit, CaptionFit { font_size: 40, chars_per_line: 50 });
    }

    #[test]
    fn test_wrap_chars() {
        assert_eq!(wrap_chars("一二三四五六", 4), "一二三四\n五六");
        assert_eq!(wrap_chars("abc", 0), "abc");
    }

    #[test]
    fn test_segment_times() {
        assert_eq!(
            segment_times(9.0, 3),
            vec![(0.0, 3.0), (3.0, 6.0), (6.0, 9.0)]
        );
        assert!(segment_times(5.0, 0).is_empty());
    }

    #[test]
    fn test_intro_text() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(
            intro_text(date, "晨间全球快讯"),
            "今天是2025年06月01日, 星期日, 欢迎收看【晨间全球快讯】"
        );
        assert_eq!(weekday_color(date.weekday()), "Pink");
    }

    #[test]
    fn test_title_card_font_sizes() {
        assert_eq!(topic_font_size(1080), 97);
        assert_eq!(intro_font_size("一二三四五六七八九十", 1920), 144);
    }
}
