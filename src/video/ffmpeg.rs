//! `ffmpeg` / `ffprobe` invocations.
//!
//! Argument lists are built by pure functions so they can be checked without
//! the binaries installed; [`Ffmpeg::run`] executes them.

use crate::config::VideoConfig;
use crate::video::layout::{self, ClipLayout, TITLE_FONT_SIZE};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Gain applied to an article's own footage sound.
const FOOTAGE_VOLUME: f64 = 0.5;

/// Text drawn from a file, positioned by ffmpeg expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub textfile: PathBuf,
    pub font_size: u32,
    pub color: String,
    pub x: String,
    pub y: String,
    pub line_spacing: u32,
}

/// Inputs for one article clip.
#[derive(Debug, Clone)]
pub struct ArticleClip {
    pub audio: PathBuf,
    pub duration: f64,
    pub images: Vec<PathBuf>,
    pub presenter: Option<PathBuf>,
    /// Footage looped into the top pane in place of the images, its own
    /// sound mixed under the narration.
    pub video: Option<PathBuf>,
    pub caption_file: PathBuf,
    pub caption_font_size: u32,
    pub title_file: PathBuf,
    pub out: PathBuf,
}

/// Inputs for the intro and outro cards.
#[derive(Debug, Clone)]
pub struct TitleCard {
    pub audio: PathBuf,
    pub duration: f64,
    pub texts: Vec<TextOverlay>,
    /// Presenter video and its top-left corner.
    pub presenter: Option<(PathBuf, u32, u32)>,
    pub out: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: String,
    ffprobe: String,
    width: u32,
    height: u32,
    fps: u32,
    font: PathBuf,
    frame_color: String,
    panel_color: String,
}

/// Escape a value for use inside a filter option (`key=value`).
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ':' | '\'' | ',' | '[' | ']' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn path_arg(p: &Path) -> String {
    p.display().to_string()
}

fn push_all(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

impl Ffmpeg {
    pub fn new(cfg: &VideoConfig) -> Self {
        Self {
            ffmpeg: cfg.ffmpeg.clone(),
            ffprobe: cfg.ffprobe.clone(),
            width: cfg.width,
            height: cfg.height,
            fps: cfg.fps,
            font: cfg.font.clone(),
            frame_color: cfg.frame_color.clone(),
            panel_color: cfg.panel_color.clone(),
        }
    }

    pub fn layout(&self) -> ClipLayout {
        ClipLayout::for_frame(self.width, self.height)
    }

    fn drawtext(&self, t: &TextOverlay) -> String {
        format!(
            "drawtext=fontfile={}:textfile={}:fontsize={}:fontcolor={}:line_spacing={}:x={}:y={}",
            escape_filter_value(&path_arg(&self.font)),
            escape_filter_value(&path_arg(&t.textfile)),
            t.font_size,
            t.color,
            t.line_spacing,
            t.x,
            t.y
        )
    }

    fn encode_args(&self, args: &mut Vec<String>, duration: f64, out: &Path) {
        let fps = self.fps.to_string();
        push_all(
            args,
            &[
                "-t",
                &format!("{duration:.3}"),
                "-c:v",
                "libx264",
                "-c:a",
                "aac",
                "-r",
                &fps,
                "-pix_fmt",
                "yuv420p",
            ],
        );
        args.push(path_arg(out));
    }

    /// Arguments rendering one article clip.
    ///
    /// Input order: background, narration, presenter (if any), then the
    /// article footage or its images.
    pub fn article_clip_args(&self, clip: &ArticleClip) -> Vec<String> {
        let l = self.layout();
        let mut args: Vec<String> = vec!["-y".to_string()];
        push_all(
            &mut args,
            &[
                "-f",
                "lavfi",
                "-i",
                &format!(
                    "color=c={}:s={}x{}:r={}:d={:.3}",
                    self.panel_color, l.width, l.height, self.fps, clip.duration
                ),
            ],
        );
        push_all(&mut args, &["-i", &path_arg(&clip.audio)]);
        let mut next_input = 2;
        let presenter_input = clip.presenter.as_ref().map(|p| {
            push_all(&mut args, &["-stream_loop", "-1", "-i", &path_arg(p)]);
            next_input += 1;
            next_input - 1
        });
        let video_input = clip.video.as_ref().map(|v| {
            push_all(&mut args, &["-stream_loop", "-1", "-i", &path_arg(v)]);
            next_input += 1;
            next_input - 1
        });
        let images: &[PathBuf] = if video_input.is_some() { &[] } else { &clip.images };
        let first_image = next_input;
        for img in images {
            push_all(
                &mut args,
                &["-loop", "1", "-t", &format!("{:.3}", clip.duration), "-i", &path_arg(img)],
            );
        }

        let mut graph: Vec<String> = Vec::new();
        let mut current = "0:v".to_string();
        let mut audio_out = "1:a".to_string();
        if let Some(input) = video_input {
            graph.push(format!(
                "[{input}:v]scale={}:{}:force_original_aspect_ratio=decrease[footage]",
                l.width, l.top_height
            ));
            graph.push(format!(
                "[{current}][footage]overlay=x=(W-w)/2:y={}+({}-h)/2:shortest=0[vf]",
                l.title_height, l.top_height
            ));
            current = "vf".to_string();
            graph.push(format!("[{input}:a]volume={FOOTAGE_VOLUME}[footage_a]"));
            graph.push("[1:a][footage_a]amix=inputs=2:duration=first:normalize=0[aout]".to_string());
            audio_out = "[aout]".to_string();
        }
        for (i, (start, end)) in layout::segment_times(clip.duration, images.len())
            .into_iter()
            .enumerate()
        {
            graph.push(format!(
                "[{}:v]scale={}:{}:force_original_aspect_ratio=decrease[img{i}]",
                first_image + i,
                l.width,
                l.top_height
            ));
            graph.push(format!(
                "[{current}][img{i}]overlay=x=(W-w)/2:y={}+({}-h)/2:enable='between(t,{start:.3},{end:.3})'[v{i}]",
                l.title_height, l.top_height
            ));
            current = format!("v{i}");
        }
        if let Some(input) = presenter_input {
            graph.push(format!(
                "[{input}:v]scale=w='min(iw,{})':h='min(ih,{})':force_original_aspect_ratio=decrease[presenter]",
                l.presenter_width, l.bottom_height
            ));
            graph.push(format!("[{current}][presenter]overlay=x=W-w:y=H-h:shortest=0[vp]"));
            current = "vp".to_string();
        }
        let caption = TextOverlay {
            textfile: clip.caption_file.clone(),
            font_size: clip.caption_font_size,
            color: "black".to_string(),
            x: "10".to_string(),
            y: (l.title_height + l.top_height + 10).to_string(),
            line_spacing: clip.caption_font_size / 2,
        };
        let title = TextOverlay {
            textfile: clip.title_file.clone(),
            font_size: TITLE_FONT_SIZE,
            color: "black".to_string(),
            x: "10".to_string(),
            y: "0".to_string(),
            line_spacing: 0,
        };
        graph.push(format!("[{current}]{}[vc]", self.drawtext(&caption)));
        graph.push(format!("[vc]{}[vout]", self.drawtext(&title)));

        push_all(
            &mut args,
            &["-filter_complex", &graph.join(";"), "-map", "[vout]", "-map", &audio_out],
        );
        self.encode_args(&mut args, clip.duration, &clip.out);
        args
    }

    /// Arguments rendering an intro or outro card.
    pub fn title_card_args(&self, card: &TitleCard) -> Vec<String> {
        let l = self.layout();
        let mut args: Vec<String> = vec!["-y".to_string()];
        push_all(
            &mut args,
            &[
                "-f",
                "lavfi",
                "-i",
                &format!(
                    "color=c={}:s={}x{}:r={}:d={:.3}",
                    self.panel_color, l.width, l.height, self.fps, card.duration
                ),
                "-i",
                &path_arg(&card.audio),
            ],
        );
        let mut graph: Vec<String> = Vec::new();
        let mut current = "0:v".to_string();
        if let Some((presenter, x, y)) = &card.presenter {
            push_all(&mut args, &["-stream_loop", "-1", "-i", &path_arg(presenter)]);
            graph.push("[2:v]scale=iw*0.7:ih*0.7[presenter]".to_string());
            graph.push(format!("[0:v][presenter]overlay=x={x}:y={y}:shortest=0[vp]"));
            current = "vp".to_string();
        }
        for (i, text) in card.texts.iter().enumerate() {
            graph.push(format!("[{current}]{}[t{i}]", self.drawtext(text)));
            current = format!("t{i}");
        }
        if graph.is_empty() {
            graph.push("[0:v]null[t]".to_string());
            current = "t".to_string();
        }
        push_all(
            &mut args,
            &[
                "-filter_complex",
                &graph.join(";"),
                "-map",
                &format!("[{current}]"),
                "-map",
                "1:a",
            ],
        );
        self.encode_args(&mut args, card.duration, &card.out);
        args
    }

    /// Arguments joining `clips` into one video, each centered over the
    /// frame-colored background and its panel.
    pub fn concat_args(&self, clips: &[PathBuf], out: &Path) -> Vec<String> {
        let (px, py, pw, ph) = layout::concat_panel(self.width, self.height);
        let l = self.layout();
        let mut args: Vec<String> = vec!["-y".to_string()];
        for clip in clips {
            push_all(&mut args, &["-i", &path_arg(clip)]);
        }
        let mut graph: Vec<String> = Vec::new();
        let mut pairs = String::new();
        for i in 0..clips.len() {
            graph.push(format!(
                "color=c={}:s={}x{}:r={}[bg{i}]",
                self.frame_color, self.width, self.height, self.fps
            ));
            graph.push(format!(
                "[bg{i}]drawbox=x={px}:y={py}:w={pw}:h={ph}:color={}:t=fill[box{i}]",
                self.panel_color
            ));
            graph.push(format!(
                "[{i}:v]scale=w='min(iw,{})':h='min(ih,{})':force_original_aspect_ratio=decrease[s{i}]",
                l.width, l.height
            ));
            graph.push(format!("[box{i}][s{i}]overlay=x=(W-w)/2:y=(H-h)/2:shortest=1[c{i}]"));
            pairs.push_str(&format!("[c{i}][{i}:a]"));
        }
        graph.push(format!("{pairs}concat=n={}:v=1:a=1[outv][outa]", clips.len()));
        let fps = self.fps.to_string();
        push_all(
            &mut args,
            &[
                "-filter_complex",
                &graph.join(";"),
                "-map",
                "[outv]",
                "-map",
                "[outa]",
                "-c:v",
                "libx264",
                "-c:a",
                "aac",
                "-r",
                &fps,
                "-pix_fmt",
                "yuv420p",
            ],
        );
        args.push(path_arg(out));
        args
    }

    /// Run ffmpeg with `args`; a non-zero exit is an error carrying stderr.
    #[instrument(level = "debug", skip_all, fields(out = args.last().map(String::as_str).unwrap_or("")))]
    pub async fn run(&self, args: &[String]) -> Result<(), Box<dyn Error>> {
        let t0 = Instant::now();
        debug!(args = ?args, "Running ffmpeg");
        let output = Command::new(&self.ffmpeg).args(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = {
                let chars: Vec<char> = stderr.trim().chars().collect();
                chars[chars.len().saturating_sub(600)..].iter().collect()
            };
            return Err(format!("{} exited with {}: {tail}", self.ffmpeg, output.status).into());
        }
        info!(elapsed_ms = t0.elapsed().as_millis() as u64, "ffmpeg finished");
        Ok(())
    }

    /// Container duration in seconds.
    pub async fn probe_duration(&self, path: &Path) -> Result<f64, Box<dyn Error>> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await?;
        if !output.status.success() {
            return Err(format!(
                "{} failed on {}: {}",
                self.ffprobe,
                path.display(),
                crate::utils::truncate_for_log(String::from_utf8_lossy(&output.stderr).trim(), 300)
            )
            .into());
        }
        let raw = String::from_utf8_lossy(&output.stdout);
        let secs: f64 = raw.trim().parse().map_err(|e| {
            format!("unparseable duration {:?} for {}: {e}", raw.trim(), path.display())
        })?;
        Ok(secs)
    }
}
