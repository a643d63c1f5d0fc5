//! Narration audio via the `edge-tts` command-line tool.
//!
//! All invocations in the process go through one async lock, so at most one
//! synthesis runs at a time.

use crate::config::TtsConfig;
use once_cell::sync::Lazy;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, instrument};

static TTS_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Synthesizes speech with a fixed voice for one run-slot.
#[derive(Debug, Clone)]
pub struct Narrator {
    program: String,
    voice: String,
    rate: i32,
}

impl Narrator {
    pub fn new(cfg: &TtsConfig, times: u32) -> Self {
        Self {
            program: cfg.program.clone(),
            voice: cfg.voice_for(times).to_string(),
            rate: cfg.rate,
        }
    }

    fn args(&self, text: &str, out: &Path) -> Vec<String> {
        // Joined form so a summary starting with `-` is not read as a flag.
        vec![
            "--voice".to_string(),
            self.voice.clone(),
            format!("--text={text}"),
            "--write-media".to_string(),
            out.display().to_string(),
            format!("--rate={:+}%", self.rate),
        ]
    }

    /// Write narration of `text` to `out`.
    ///
    /// An existing file is kept unless `rewrite` is set. Returns whether
    /// audio was generated.
    #[instrument(level = "info", skip(self, text), fields(voice = %self.voice, out = %out.display()))]
    pub async fn synthesize(&self, text: &str, out: &Path, rewrite: bool) -> Result<bool, Box<dyn Error>> {
        if !rewrite && fs::try_exists(out).await? {
            info!("Narration exists; skipping");
            return Ok(false);
        }
        if text.trim().is_empty() {
            return Err("nothing to narrate".into());
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).await?;
        }

        let _guard = TTS_LOCK.lock().await;
        let output = Command::new(&self.program)
            .args(self.args(text, out))
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                crate::utils::truncate_for_log(stderr.trim(), 300)
            )
            .into());
        }
        info!(chars = text.chars().count(), "Narration written");
        Ok(true)
    }
}
