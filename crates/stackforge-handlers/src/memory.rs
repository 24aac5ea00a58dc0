//! In-process backends for local runs and tests

use crate::backend::{MetadataCache, Notifier, ObjectStore, ObjectSummary, StoredObject};
use crate::error::{HandlerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                body,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredObject> {
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| HandlerError::Store(format!("no such key '{}'", key)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ObjectSummary>> {
        Ok(self
            .objects
            .lock()
            .await
            .iter()
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                size: object.body.len() as i64,
            })
            .collect())
    }
}

#[derive(Default)]
struct CacheData {
    values: HashMap<String, (String, Instant)>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// Expiring string values plus hashes, like the subset of Redis the handlers use
#[derive(Default)]
pub struct MemoryCache {
    data: Mutex<CacheData>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of a live value
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let data = self.data.lock().await;
        let (_, expires) = data.values.get(key)?;
        expires.checked_duration_since(Instant::now())
    }
}

#[async_trait]
impl MetadataCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut data = self.data.lock().await;
        let live = data
            .values
            .get(key)
            .map(|(value, expires)| (*expires > Instant::now()).then(|| value.clone()));

        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                data.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.data
            .lock()
            .await
            .values
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut data = self.data.lock().await;
        data.values.remove(key);
        data.hashes.remove(key);
        Ok(())
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut data = self.data.lock().await;
        let hash = data.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .data
            .lock()
            .await
            .hashes
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

/// Records every published notification
#[derive(Default)]
pub struct MemoryNotifier {
    published: Mutex<Vec<(String, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<(String, String)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<()> {
        self.published
            .lock()
            .await
            .push((subject.to_string(), message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_values_expire() {
        let cache = MemoryCache::new();
        cache
            .set_ex("file_metadata", "[]", Duration::from_secs(300))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("file_metadata").await.unwrap().as_deref(), Some("[]"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("file_metadata").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_removes_hashes() {
        let cache = MemoryCache::new();
        cache
            .hset("file:a.txt", &[("lines", "3".to_string())])
            .await
            .unwrap();
        assert_eq!(cache.hgetall("file:a.txt").await.unwrap()["lines"], "3");

        cache.delete("file:a.txt").await.unwrap();
        assert!(cache.hgetall("file:a.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_object_store_lists_sizes() {
        let store = MemoryObjectStore::new("demo-data");
        store.put("b.txt", b"hello".to_vec()).await.unwrap();
        store.put("a.txt", Vec::new()).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].key, "a.txt");
        assert_eq!(listed[1].size, 5);
        assert!(store.get("missing").await.is_err());
    }
}
