//! Named cache generations: request URL → response snapshot.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;
use tracing::debug;

use super::fetch::AssetResponse;

/// All cache generations. Shared by every generation's manager; each
/// manager only writes its own generation.
#[derive(Debug, Default)]
pub struct CacheStorage {
    generations: RwLock<BTreeMap<String, HashMap<String, AssetResponse>>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all existing generations, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.generations.read().await.keys().cloned().collect()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.generations.read().await.contains_key(name)
    }

    /// Create `name` if it does not exist yet.
    pub async fn open(&self, name: &str) {
        self.generations
            .write()
            .await
            .entry(name.to_string())
            .or_default();
    }

    /// Delete a generation. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> bool {
        let removed = self.generations.write().await.remove(name).is_some();
        if removed {
            debug!(generation = name, "Cache generation deleted");
        }
        removed
    }

    pub async fn lookup(&self, name: &str, url: &str) -> Option<AssetResponse> {
        self.generations
            .read()
            .await
            .get(name)
            .and_then(|entries| entries.get(url))
            .cloned()
    }

    /// Store one entry, replacing any previous response for `url`.
    ///
    /// Writes into a generation that no longer exists are dropped, so a late
    /// refresh cannot bring a deleted generation back.
    pub async fn put(&self, name: &str, url: &str, response: AssetResponse) -> bool {
        match self.generations.write().await.get_mut(name) {
            Some(entries) => {
                entries.insert(url.to_string(), response);
                true
            }
            None => {
                debug!(generation = name, url, "Dropped write into missing generation");
                false
            }
        }
    }

    /// Create `name` if needed and store all `entries` under one lock.
    pub async fn put_all(&self, name: &str, entries: Vec<(String, AssetResponse)>) {
        let mut generations = self.generations.write().await;
        let generation = generations.entry(name.to_string()).or_default();
        generation.extend(entries);
    }

    pub async fn entry_count(&self, name: &str) -> usize {
        self.generations
            .read()
            .await
            .get(name)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        let storage = CacheStorage::new();
        storage.open("v1").await;
        assert!(storage.put("v1", "/a", AssetResponse::ok("old")).await);
        assert!(storage.put("v1", "/a", AssetResponse::ok("new")).await);
        assert_eq!(storage.lookup("v1", "/a").await.unwrap().text(), "new");
        assert_eq!(storage.entry_count("v1").await, 1);
    }

    #[tokio::test]
    async fn put_into_deleted_generation_is_dropped() {
        let storage = CacheStorage::new();
        storage.put_all("v1", vec![("/a".into(), AssetResponse::ok("a"))]).await;
        assert!(storage.delete("v1").await);
        assert!(!storage.put("v1", "/a", AssetResponse::ok("late")).await);
        assert!(!storage.has("v1").await);
        assert!(!storage.delete("v1").await);
    }

    #[tokio::test]
    async fn keys_lists_generations() {
        let storage = CacheStorage::new();
        storage.open("v2").await;
        storage.open("v1").await;
        storage.open("v1").await;
        assert_eq!(storage.keys().await, vec!["v1".to_string(), "v2".to_string()]);
        assert!(storage.lookup("v1", "/missing").await.is_none());
        assert!(storage.lookup("v9", "/missing").await.is_none());
    }
}
