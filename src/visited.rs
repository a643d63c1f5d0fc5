//! Month-scoped set of already-curated article URLs.
//!
//! Persisted as a JSON array at `{visited_dir}/{YYYYMM}_visited_urls.json`.
//! Writes are a union with whatever is on disk, so the set only grows.

use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Default)]
pub struct VisitedSet {
    urls: BTreeSet<String>,
}

impl VisitedSet {
    pub fn path_for(dir: &Path, year_month: &str) -> PathBuf {
        dir.join(format!("{year_month}_visited_urls.json"))
    }

    /// Load the month's set; a missing file is an empty set.
    #[instrument(level = "debug", skip(dir))]
    pub async fn load(dir: &Path, year_month: &str) -> Result<Self, Box<dyn Error>> {
        let path = Self::path_for(dir, year_month);
        if !fs::try_exists(&path).await? {
            debug!(path = %path.display(), "No visited set yet");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path).await?;
        let urls: BTreeSet<String> = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), count = urls.len(), "Loaded visited set");
        Ok(Self { urls })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Union `new_urls` into the persisted set for `year_month` and save it.
    ///
    /// Re-reads the file first so URLs written by another run since this
    /// process loaded its copy are kept. Returns the size of the saved set.
    #[instrument(level = "info", skip(dir, new_urls))]
    pub async fn union_and_save<I>(
        dir: &Path,
        year_month: &str,
        new_urls: I,
    ) -> Result<usize, Box<dyn Error>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut current = Self::load(dir, year_month).await?;
        let before = current.len();
        current.urls.extend(new_urls);

        fs::create_dir_all(dir).await?;
        let path = Self::path_for(dir, year_month);
        let json = serde_json::to_string_pretty(&current.urls)?;
        fs::write(&path, json).await?;
        info!(
            path = %path.display(),
            added = current.len() - before,
            total = current.len(),
            "Saved visited set"
        );
        Ok(current.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = VisitedSet::load(dir.path(), "202506").await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_union_keeps_existing_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = VisitedSet::path_for(dir.path(), "202506");
        std::fs::write(&path, r#"["http://x/a"]"#).unwrap();

        let total = VisitedSet::union_and_save(dir.path(), "202506", vec!["http://x/b".to_string()])
            .await
            .unwrap();
        assert_eq!(total, 2);

        let saved: Vec<String> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, vec!["http://x/a".to_string(), "http://x/b".to_string()]);

        let set = VisitedSet::load(dir.path(), "202506").await.unwrap();
        assert!(set.contains("http://x/a"));
        assert!(set.contains("http://x/b"));
    }

    #[tokio::test]
    async fn test_union_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        for _ in 0..2 {
            VisitedSet::union_and_save(dir.path(), "202507", vec!["http://x/a".to_string()])
                .await
                .unwrap();
        }
        let set = VisitedSet::load(dir.path(), "202507").await.unwrap();
        assert_eq!(set.len(), 1);
    }
}
