//! Backends the handlers are written against

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub last_modified: DateTime<Utc>,
}

/// Object storage bound to a single bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<StoredObject>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<ObjectSummary>>;
}

/// Key-value cache holding the list cache and per-object metadata hashes
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()>;

    /// Empty when the hash does not exist
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> Result<()>;
}
