//! JSON persistence for article batches and bookkeeping files.
//!
//! Everything is written pretty-printed with non-ASCII text kept as-is, so
//! reading a file and writing it back yields the same bytes.

use crate::models::Article;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

/// Serialize `value` to `path`, creating parent directories as needed.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).await?;
    debug!("Wrote JSON");
    Ok(())
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let raw = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

/// Read `path` if it exists, otherwise `T::default()`.
pub async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, Box<dyn Error>> {
    if !fs::try_exists(path).await? {
        return Ok(T::default());
    }
    read_json(path).await
}

pub async fn write_batch(path: &Path, articles: &[Article]) -> Result<(), Box<dyn Error>> {
    write_json(path, articles).await
}

pub async fn read_batch(path: &Path) -> Result<Vec<Article>, Box<dyn Error>> {
    read_json(path).await
}
