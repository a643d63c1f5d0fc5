//! The `sweep` stage: remove day folders older than the retention window.

use chrono::NaiveDate;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Date encoded in a `YYYYMMDD` folder name.
pub fn folder_date(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(name, "%Y%m%d").ok()
}

/// Delete every `YYYYMMDD` folder under `news_dir` dated more than
/// `retention_days` before `today`. Other entries are left alone.
///
/// Returns the number of folders removed.
#[instrument(level = "info", fields(news_dir = %news_dir.display()))]
pub async fn sweep(news_dir: &Path, today: NaiveDate, retention_days: i64) -> Result<usize, Box<dyn Error>> {
    if !news_dir.exists() {
        info!("Nothing to sweep");
        return Ok(0);
    }
    let mut removed = 0;
    let mut entries = fs::read_dir(news_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(date) = name.to_str().and_then(folder_date) else {
            continue;
        };
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let age = (today - date).num_days();
        if age <= retention_days {
            continue;
        }
        match fs::remove_dir_all(entry.path()).await {
            Ok(()) => {
                info!(folder = %entry.path().display(), age, "Removed expired day folder");
                removed += 1;
            }
            Err(e) => warn!(folder = %entry.path().display(), error = %e, "Failed to remove day folder"),
        }
    }
    info!(removed, "Sweep finished");
    Ok(removed)
}
