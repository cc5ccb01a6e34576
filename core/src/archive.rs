//! Durable history of finished decks.
//!
//! One JSON document per user holds the whole array of decks. Every mutation
//! rewrites the full array to a sibling temp file and renames it over the
//! original, so readers never observe a half-written file.

use async_trait::async_trait;
use chrono::Utc;
use slide_common::{ArchivedDeck, ChartRef, SlideDraft, SlideRecord};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("deck not found: {0}")]
    NotFound(String),
}

/// Where finished decks go. Failures are logged by the caller and never
/// surface to the user flow.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn archive(
        &self,
        topic: &str,
        markdown: &str,
        slides: &[SlideDraft],
        charts: &[ChartRef],
    ) -> Result<ArchivedDeck, ArchiveError>;
}

pub struct JsonDeckStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonDeckStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored deck, oldest first. A missing file is an empty history.
    pub async fn list(&self) -> Result<Vec<ArchivedDeck>, ArchiveError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: &str) -> Result<ArchivedDeck, ArchiveError> {
        self.list()
            .await?
            .into_iter()
            .find(|deck| deck.id == id)
            .ok_or_else(|| ArchiveError::NotFound(id.to_string()))
    }

    pub async fn delete(&self, id: &str) -> Result<(), ArchiveError> {
        let _guard = self.write_lock.lock().await;
        let mut decks = self.list().await?;
        let before = decks.len();
        decks.retain(|deck| deck.id != id);
        if decks.len() == before {
            return Err(ArchiveError::NotFound(id.to_string()));
        }
        self.write_all(&decks).await?;
        tracing::info!("Deleted deck {}", id);
        Ok(())
    }

    /// Replace a deck's markdown and slide records after an edit.
    pub async fn update(
        &self,
        id: &str,
        markdown: &str,
        slides: Vec<SlideRecord>,
    ) -> Result<ArchivedDeck, ArchiveError> {
        let _guard = self.write_lock.lock().await;
        let mut decks = self.list().await?;
        let deck = decks
            .iter_mut()
            .find(|deck| deck.id == id)
            .ok_or_else(|| ArchiveError::NotFound(id.to_string()))?;
        deck.markdown = markdown.to_string();
        if let Some(first) = slides.first() {
            deck.title = first.title.clone();
        }
        deck.slides = slides;
        let updated = deck.clone();
        self.write_all(&decks).await?;
        Ok(updated)
    }

    async fn write_all(&self, decks: &[ArchivedDeck]) -> Result<(), ArchiveError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(decks)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveSink for JsonDeckStore {
    async fn archive(
        &self,
        topic: &str,
        markdown: &str,
        slides: &[SlideDraft],
        charts: &[ChartRef],
    ) -> Result<ArchivedDeck, ArchiveError> {
        let deck = ArchivedDeck {
            id: Uuid::new_v4().to_string(),
            title: slides
                .first()
                .map(|s| s.title.clone())
                .unwrap_or_else(|| topic.to_string()),
            topic: topic.to_string(),
            markdown: markdown.to_string(),
            slides: slides.iter().map(SlideRecord::from).collect(),
            charts: charts.to_vec(),
            created_at: Utc::now(),
        };

        let _guard = self.write_lock.lock().await;
        let mut decks = self.list().await?;
        decks.push(deck.clone());
        self.write_all(&decks).await?;
        tracing::info!("Archived deck {} ({} slides)", deck.id, deck.slides.len());
        Ok(deck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn slides() -> Vec<SlideDraft> {
        vec![SlideDraft {
            id: "1".to_string(),
            title: "Opening".to_string(),
            content: "- hi".to_string(),
            highlight: None,
            visual_style: None,
            image_prompt: "p".to_string(),
            image_url: Some("u".to_string()),
        }]
    }

    #[tokio::test]
    async fn test_archive_list_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonDeckStore::new(temp_dir.path().join("decks/default.json"));
        assert!(store.list().await.unwrap().is_empty());

        let first = store.archive("Topic one", "# Opening", &slides(), &[]).await.unwrap();
        let second = store.archive("Topic two", "# Opening", &slides(), &[]).await.unwrap();
        assert_eq!(first.title, "Opening");
        assert_eq!(first.slides[0].image_url.as_deref(), Some("u"));

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].id, second.id);
        assert_eq!(store.get(&first.id).await.unwrap().topic, "Topic one");

        // Whole-array rewrite leaves no temp file behind.
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("decks"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_update() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonDeckStore::new(temp_dir.path().join("user.json"));
        let deck = store.archive("Topic", "# Opening", &slides(), &[]).await.unwrap();

        let mut records = deck.slides.clone();
        records[0].title = "Renamed".to_string();
        let updated = store.update(&deck.id, "# Renamed", records).await.unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(store.get(&deck.id).await.unwrap().markdown, "# Renamed");

        store.delete(&deck.id).await.unwrap();
        assert!(matches!(store.delete(&deck.id).await, Err(ArchiveError::NotFound(_))));
        assert!(matches!(store.get(&deck.id).await, Err(ArchiveError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("user.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonDeckStore::new(&path);
        assert!(matches!(store.list().await, Err(ArchiveError::Json(_))));
        assert!(store.archive("t", "m", &slides(), &[]).await.is_err());
    }
}
