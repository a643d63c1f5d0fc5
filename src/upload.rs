//! The `upload` stage: publish each manifest entry through the video
//! platform's creator UI in a headless browser.
//!
//! Session cookies are persisted between runs; a fresh QR-code login is
//! only needed when the `SESSDATA` cookie is missing or expired. The browser
//! driver is compiled with the `upload` feature; the session store is always
//! available.

#![cfg_attr(not(feature = "upload"), allow(dead_code))]

use crate::config::{PipelineConfig, RunContext};
use crate::notify::Notifier;
use crate::outputs::{digest, json};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use tracing::{info, instrument, warn};

pub const SESSION_COOKIE: &str = "SESSDATA";

/// One persisted browser cookie.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    /// Seconds since the epoch; zero or negative for a session cookie.
    #[serde(default)]
    pub expires: f64,
}

fn root_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Session {
    pub cookies: Vec<SessionCookie>,
}

impl Session {
    pub async fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        json::read_json_or_default(path).await
    }

    pub async fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        json::write_json(path, self).await
    }

    /// Whether the login cookie is present and not expired at `now`
    /// (seconds since the epoch).
    pub fn is_logged_in(&self, now: f64) -> bool {
        self.cookies
            .iter()
            .any(|c| c.name == SESSION_COOKIE && !c.value.is_empty() && (c.expires <= 0.0 || c.expires > now))
    }
}

pub fn now_epoch_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Upload every edition of the day not yet submitted.
#[instrument(level = "info", skip_all, fields(day = %ctx.day()))]
pub async fn upload_all(config: &PipelineConfig, ctx: &RunContext, notifier: &Notifier) -> Result<(), Box<dyn Error>> {
    let manifest_path = config.uploads_path(ctx);
    let manifest = digest::load_manifest(&manifest_path).await?;
    let recorded = manifest.len();
    let pending = digest::pending_uploads(manifest);
    if pending.is_empty() {
        info!(path = %manifest_path.display(), recorded, "No editions pending upload");
        return Ok(());
    }
    info!(recorded, pending = pending.len(), "Uploading editions");

    upload_editions(config, &manifest_path, pending, notifier).await
}

#[cfg(feature = "upload")]
async fn upload_editions(
    config: &PipelineConfig,
    manifest_path: &Path,
    manifest: crate::models::UploadManifest,
    notifier: &Notifier,
) -> Result<(), Box<dyn Error>> {
    let session = Session::load(&config.upload.session_path).await?;
    let outcome = browser::run(config.upload.clone(), session, manifest, notifier.clone()).await?;
    outcome.session.save(&config.upload.session_path).await?;
    for (key, result) in &outcome.results {
        match result {
            Ok(()) => {
                info!(key = %key, "Upload submitted");
                if let Err(e) = digest::mark_uploaded(manifest_path, key).await {
                    warn!(key = %key, error = %e, "Could not mark edition uploaded");
                }
                notifier
                    .send(&format!("{} upload successful", manifest_video(&outcome.manifest, key)))
                    .await;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Upload failed");
                notifier.send(&format!("upload {key} failed: {e}")).await;
            }
        }
    }
    Ok(())
}

#[cfg(not(feature = "upload"))]
async fn upload_editions(
    _config: &PipelineConfig,
    _manifest_path: &Path,
    _manifest: crate::models::UploadManifest,
    _notifier: &Notifier,
) -> Result<(), Box<dyn Error>> {
    warn!("Upload support is not built; rebuild with `--features upload`");
    Ok(())
}

#[cfg(feature = "upload")]
fn manifest_video(manifest: &crate::models::UploadManifest, key: &str) -> String {
    manifest
        .get(key)
        .map(|e| e.video_path.clone())
        .unwrap_or_else(|| key.to_string())
}

#[cfg(feature = "upload")]
mod browser {
    //! Blocking browser automation, run on the blocking thread pool.

    use super::{Session, SessionCookie, now_epoch_secs};
    use crate::config::UploadConfig;
    use crate::models::{UploadEntry, UploadManifest};
    use crate::notify::Notifier;
    use headless_chrome::protocol::cdp::{DOM, Network, Page};
    use headless_chrome::{Browser, LaunchOptions, Tab};
    use std::error::Error;
    use std::sync::Arc;
    use std::thread::sleep;
    use std::time::{Duration, Instant};
    use tracing::{info, warn};

    type BoxError = Box<dyn Error + Send + Sync>;

    pub struct Outcome {
        pub session: Session,
        pub manifest: UploadManifest,
        pub results: Vec<(String, Result<(), String>)>,
    }

    pub async fn run(
        cfg: UploadConfig,
        session: Session,
        manifest: UploadManifest,
        notifier: Notifier,
    ) -> Result<Outcome, Box<dyn Error>> {
        let handle = tokio::runtime::Handle::current();
        let outcome = tokio::task::spawn_blocking(move || drive(&cfg, session, manifest, &notifier, &handle))
            .await?
            .map_err(|e| -> Box<dyn Error> { e.to_string().into() })?;
        Ok(outcome)
    }

    fn drive(
        cfg: &UploadConfig,
        session: Session,
        manifest: UploadManifest,
        notifier: &Notifier,
        handle: &tokio::runtime::Handle,
    ) -> Result<Outcome, BoxError> {
        let options = LaunchOptions::default_builder()
            .headless(cfg.headless)
            .window_size(Some((1600, 1000)))
            .build()
            .map_err(|e| e.to_string())?;
        let browser = Browser::new(options)?;
        let tab = browser.new_tab()?;

        let session = match login(cfg, &tab, session, notifier, handle) {
            Ok(s) => s,
            Err(e) => {
                handle.block_on(notifier.send("logging in failed"));
                return Err(e);
            }
        };

        let mut results = Vec::with_capacity(manifest.len());
        for (key, entry) in &manifest {
            info!(key = %key, video = %entry.video_path, "Starting upload");
            let result = upload_one(cfg, &tab, entry).map_err(|e| e.to_string());
            sleep(Duration::from_secs(1));
            results.push((key.clone(), result));
        }
        Ok(Outcome {
            session,
            manifest,
            results,
        })
    }

    fn cookie_params(session: &Session) -> Result<Vec<Network::CookieParam>, BoxError> {
        session
            .cookies
            .iter()
            .map(|c| {
                let value = serde_json::json!({
                    "name": c.name,
                    "value": c.value,
                    "domain": c.domain,
                    "path": c.path,
                    "expires": c.expires,
                });
                serde_json::from_value(value).map_err(BoxError::from)
            })
            .collect()
    }

    fn current_session(tab: &Tab) -> Result<Session, BoxError> {
        let cookies = tab
            .get_cookies()?
            .into_iter()
            .filter_map(|c| serde_json::to_value(c).ok())
            .filter_map(|v| serde_json::from_value::<SessionCookie>(v).ok())
            .collect();
        Ok(Session { cookies })
    }

    fn login(
        cfg: &UploadConfig,
        tab: &Arc<Tab>,
        session: Session,
        notifier: &Notifier,
        handle: &tokio::runtime::Handle,
    ) -> Result<Session, BoxError> {
        tab.navigate_to(&cfg.home_url)?.wait_until_navigated()?;
        if !session.cookies.is_empty() {
            tab.set_cookies(cookie_params(&session)?)?;
            tab.reload(false, None)?.wait_until_navigated()?;
        }
        let restored = current_session(tab)?;
        if restored.is_logged_in(now_epoch_secs()) {
            info!("Restored login session");
            return Ok(restored);
        }

        sleep(Duration::from_secs(2));
        tab.wait_for_element(".header-login-entry")?.click()?;
        sleep(Duration::from_secs(1));
        let qr = tab.wait_for_element(r#"img[alt="登录二维码"]"#)?;
        let png = qr.capture_screenshot(Page::CaptureScreenshotFormatOption::Png)?;
        if let Some(parent) = cfg.qrcode_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&cfg.qrcode_path, png)?;
        info!(path = %cfg.qrcode_path.display(), "Login QR code saved");
        handle.block_on(notifier.send(&format!("qrcode saved in {}", cfg.qrcode_path.display())));

        let deadline = Instant::now() + Duration::from_secs(cfg.login_timeout_secs);
        while Instant::now() < deadline {
            let current = current_session(tab)?;
            if current.is_logged_in(now_epoch_secs()) {
                info!("Logged in");
                return Ok(current);
            }
            sleep(Duration::from_millis(500));
        }
        warn!(timeout_secs = cfg.login_timeout_secs, "Login timed out");
        Err("login timed out".into())
    }

    fn click_text(tab: &Tab, text: &str) -> Result<(), BoxError> {
        tab.wait_for_xpath(&format!(r#"//*[normalize-space(text())="{text}"]"#))?
            .click()?;
        Ok(())
    }

    fn upload_one(cfg: &UploadConfig, tab: &Arc<Tab>, entry: &UploadEntry) -> Result<(), BoxError> {
        let video = std::fs::canonicalize(&entry.video_path)?;
        tab.navigate_to(&cfg.upload_url)?.wait_until_navigated()?;
        sleep(Duration::from_secs(2));

        let input = tab.wait_for_element(r#".bcc-upload-wrapper input[type="file"]"#)?;
        tab.call_method(DOM::SetFileInputFiles {
            files: vec![video.display().to_string()],
            node_id: Some(input.node_id),
            backend_node_id: None,
            object_id: None,
        })?;
        sleep(Duration::from_secs(10));

        tab.wait_for_element(r#"input[placeholder="请输入稿件标题"]"#)?
            .click()?;
        tab.type_str(&entry.title)?;

        click_text(tab, "更换封面")?;
        sleep(Duration::from_secs(1));
        click_text(tab, "完成")?;
        sleep(Duration::from_secs(3));

        tab.wait_for_element(".select-controller")?.click()?;
        tab.wait_for_xpath(&format!(r#"//*[@title="{}"]"#, cfg.category))?
            .click()?;

        tab.wait_for_element(r#"input[placeholder="按回车键Enter创建标签"]"#)?
            .click()?;
        for _ in 0..5 {
            tab.press_key("Backspace")?;
        }
        for tag in &entry.tags {
            tab.type_str(tag)?;
            tab.press_key("Enter")?;
            sleep(Duration::from_millis(100));
        }

        tab.wait_for_element(".ql-editor")?.click()?;
        tab.type_str(&entry.description)?;

        click_text(tab, "立即投稿")?;
        sleep(Duration::from_secs(5));
        Ok(())
    }
}
