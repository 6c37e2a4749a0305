//! In-memory request history and favorites
//!
//! History keeps the 50 most recent sends, newest first. Favorites are
//! presence-toggled `(url, method)` pairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tokio::sync::RwLock;
use uuid::Uuid;

const HISTORY_CAP: usize = 50;

/// One recorded send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub method: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// Capped history plus favorite toggles
#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: RwLock<VecDeque<HistoryItem>>,
    favorites: RwLock<HashSet<(String, String)>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a send; the oldest entry is evicted past the cap
    pub async fn record(&self, method: impl Into<String>, url: impl Into<String>) -> HistoryItem {
        let item = HistoryItem {
            id: Uuid::new_v4().to_string(),
            method: method.into(),
            url: url.into(),
            timestamp: Utc::now(),
        };

        let mut entries = self.entries.write().await;
        entries.push_front(item.clone());
        entries.truncate(HISTORY_CAP);
        item
    }

    /// All entries, newest first
    pub async fn items(&self) -> Vec<HistoryItem> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Number of recorded entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop all history entries
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Toggle a favorite; returns true when the pair is now a favorite
    pub async fn toggle_favorite(&self, url: impl Into<String>, method: impl Into<String>) -> bool {
        let pair = (url.into(), method.into());
        let mut favorites = self.favorites.write().await;
        if favorites.remove(&pair) {
            false
        } else {
            favorites.insert(pair);
            true
        }
    }

    /// Whether the pair is currently a favorite
    pub async fn is_favorite(&self, url: &str, method: &str) -> bool {
        self.favorites
            .read()
            .await
            .contains(&(url.to_string(), method.to_string()))
    }

    /// All favorite pairs
    pub async fn favorites(&self) -> Vec<(String, String)> {
        self.favorites.read().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cap_evicts_oldest() {
        let store = HistoryStore::new();
        for i in 0..60 {
            store.record("GET", format!("https://x.test/{}", i)).await;
        }

        let items = store.items().await;
        assert_eq!(items.len(), 50);
        // Newest first; the first 10 recorded URLs were evicted
        assert_eq!(items[0].url, "https://x.test/59");
        assert_eq!(items[49].url, "https://x.test/10");
    }

    #[tokio::test]
    async fn test_favorite_toggle_semantics() {
        let store = HistoryStore::new();
        assert!(store.toggle_favorite("https://x.test", "GET").await);
        assert!(store.is_favorite("https://x.test", "GET").await);

        // Toggling twice is a no-op, not a count
        assert!(!store.toggle_favorite("https://x.test", "GET").await);
        assert!(!store.is_favorite("https://x.test", "GET").await);
    }

    #[tokio::test]
    async fn test_method_distinguishes_favorites() {
        let store = HistoryStore::new();
        store.toggle_favorite("https://x.test", "GET").await;
        assert!(!store.is_favorite("https://x.test", "POST").await);
    }
}
