//! Per-day bookkeeping written after an edition video is produced:
//! the `all.json` digest and the upload manifest.

use crate::models::{Article, DailyDigest, UploadEntry, UploadManifest};
use crate::outputs::json::{read_json_or_default, write_json};
use std::error::Error;
use std::path::Path;
use tracing::{info, instrument};

/// Fold one edition into a day's digest.
///
/// Topic lines are flattened onto one line with `|`. The first edition
/// starts `topic` with `{day}|`; later ones append `###{day} |…`. Every
/// article URL is recorded; titles are the source hint followed by the
/// visible titles.
///
/// An edition whose URLs are all recorded already (a `--rewrite` re-run)
/// leaves the digest untouched. Returns whether anything was added.
pub fn extend_digest(
    digest: &mut DailyDigest,
    day: &str,
    topics: &str,
    hint: &str,
    articles: &[Article],
) -> bool {
    if is_recorded(digest, articles) {
        return false;
    }
    let flat = topics.replace('\n', "|");
    if digest.topic.is_empty() {
        digest.topic = format!("{day}|{flat}");
    } else {
        digest.topic.push_str(&format!("###{day} |{flat}"));
    }
    digest
        .urls
        .extend(articles.iter().map(|a| a.canonical_url.clone()));
    digest.titles.push(hint.to_string());
    digest.titles.extend(
        articles
            .iter()
            .filter(|a| a.visible)
            .map(|a| a.display_title().to_string()),
    );
    true
}

fn is_recorded(digest: &DailyDigest, articles: &[Article]) -> bool {
    !articles.is_empty()
        && articles
            .iter()
            .all(|a| digest.urls.contains(&a.canonical_url))
}

#[instrument(level = "info", skip(topics, hint, articles), fields(path = %path.display()))]
pub async fn append_digest(
    path: &Path,
    day: &str,
    topics: &str,
    hint: &str,
    articles: &[Article],
) -> Result<(), Box<dyn Error>> {
    let mut digest: DailyDigest = read_json_or_default(path).await?;
    if !extend_digest(&mut digest, day, topics, hint, articles) {
        info!("Edition already in daily digest; unchanged");
        return Ok(());
    }
    write_json(path, &digest).await?;
    info!(urls = digest.urls.len(), "Updated daily digest");
    Ok(())
}

/// Record a finished edition under its run-slot, replacing any previous entry.
///
/// A re-render of a video already submitted keeps its `uploaded` mark, so
/// the same edition is never posted twice.
#[instrument(level = "info", skip(entry), fields(path = %path.display()))]
pub async fn record_upload(path: &Path, times: u32, mut entry: UploadEntry) -> Result<(), Box<dyn Error>> {
    let mut manifest: UploadManifest = read_json_or_default(path).await?;
    let key = times.to_string();
    if let Some(previous) = manifest.get(&key) {
        entry.uploaded |= previous.uploaded && previous.video_path == entry.video_path;
    }
    manifest.insert(key, entry);
    write_json(path, &manifest).await?;
    info!(editions = manifest.len(), "Updated upload manifest");
    Ok(())
}

pub async fn load_manifest(path: &Path) -> Result<UploadManifest, Box<dyn Error>> {
    read_json_or_default(path).await
}

/// Entries not yet submitted.
pub fn pending_uploads(manifest: UploadManifest) -> UploadManifest {
    manifest.into_iter().filter(|(_, e)| !e.uploaded).collect()
}

/// Mark the entry under `key` as submitted. Returns whether it was found.
#[instrument(level = "info", fields(path = %path.display()))]
pub async fn mark_uploaded(path: &Path, key: &str) -> Result<bool, Box<dyn Error>> {
    let mut manifest: UploadManifest = read_json_or_default(path).await?;
    let Some(entry) = manifest.get_mut(key) else {
        return Ok(false);
    };
    entry.uploaded = true;
    write_json(path, &manifest).await?;
    info!("Marked edition uploaded");
    Ok(true)
}
