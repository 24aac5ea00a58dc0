//! The four file operations: list, generate, delete, process
//!
//! Every operation that changes the set of files or their metadata drops the
//! list cache (`file_metadata`), so a following list never serves the old set.

use crate::backend::{MetadataCache, Notifier, ObjectStore};
use crate::error::Result;
use crate::event::{ApiRequest, S3Event};
use crate::response::Response;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const LIST_CACHE_KEY: &str = "file_metadata";
pub const LIST_CACHE_TTL: Duration = Duration::from_secs(300);

pub fn metadata_key(name: &str) -> String {
    format!("file:{}", name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub lines: u64,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub name: String,
    pub lines: u32,
}

/// `Line i: ` followed by 20 random uppercase letters, one per line
pub fn generate_content<R: Rng>(rng: &mut R, lines: u32) -> String {
    (1..=lines)
        .map(|i| {
            let letters: String = (0..20).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();
            format!("Line {}: {}", i, letters)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `file_<YYYYmmdd_HHMMSS>_<8 hex>.txt`
pub fn file_name<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> String {
    format!(
        "file_{}_{:08x}.txt",
        now.format("%Y%m%d_%H%M%S"),
        rng.r#gen::<u32>()
    )
}

/// Newline-separated segments, so content without a trailing newline counts every line
pub fn count_lines(content: &str) -> usize {
    content.split('\n').count()
}

pub struct FileHandlers {
    store: Arc<dyn ObjectStore>,
    cache: Arc<dyn MetadataCache>,
    notifier: Arc<dyn Notifier>,
}

impl FileHandlers {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache: Arc<dyn MetadataCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
        }
    }

    /// Read-through listing of every object that has a metadata hash
    pub async fn list(&self) -> Result<Response> {
        if let Some(cached) = self.cache.get(LIST_CACHE_KEY).await? {
            tracing::debug!("List served from cache");
            return Ok(Response::raw(cached));
        }

        let mut files = Vec::new();
        for object in self.store.list().await? {
            let metadata = self.cache.hgetall(&metadata_key(&object.key)).await?;
            if metadata.is_empty() {
                continue;
            }
            files.push(FileEntry {
                lines: metadata
                    .get("lines")
                    .and_then(|lines| lines.parse().ok())
                    .unwrap_or(0),
                name: object.key,
                size: object.size,
            });
        }

        let body = serde_json::to_string(&files)?;
        self.cache
            .set_ex(LIST_CACHE_KEY, &body, LIST_CACHE_TTL)
            .await?;
        tracing::debug!("Listed {} files from {}", files.len(), self.store.bucket());
        Ok(Response::raw(body))
    }

    pub async fn generate(&self) -> Result<Response> {
        let now = Utc::now();
        let (name, lines, content) = {
            let mut rng = rand::thread_rng();
            let lines = rng.gen_range(10..=99);
            (file_name(&mut rng, now), lines, generate_content(&mut rng, lines))
        };

        self.store.put(&name, content.into_bytes()).await?;
        self.cache
            .hset(
                &metadata_key(&name),
                &[
                    ("lines", lines.to_string()),
                    ("created_at", now.format("%Y%m%d_%H%M%S").to_string()),
                ],
            )
            .await?;
        self.cache.delete(LIST_CACHE_KEY).await?;

        tracing::info!("Generated {} with {} lines", name, lines);
        Response::ok(&GeneratedFile { name, lines })
    }

    pub async fn delete(&self, request: &ApiRequest) -> Result<Response> {
        let name = request.path_parameter("filename")?;
        let bucket = self.store.bucket();

        self.store.delete(name).await?;
        self.cache.delete(&metadata_key(name)).await?;
        self.cache.delete(LIST_CACHE_KEY).await?;
        self.notifier
            .publish(
                "File Deleted",
                &format!("File {} was deleted from bucket {}", name, bucket),
            )
            .await?;

        tracing::info!("Deleted {} from {}", name, bucket);
        Response::ok(&json!({ "message": format!("File {} deleted", name) }))
    }

    /// Recount an uploaded object's lines and rewrite its metadata
    pub async fn process(&self, event: &S3Event) -> Result<Response> {
        let (bucket, key) = event.first_object()?;
        if bucket != self.store.bucket() {
            tracing::warn!(
                "Event for bucket {} handled against {}",
                bucket,
                self.store.bucket()
            );
        }

        let object = self.store.get(key).await?;
        let lines = count_lines(&String::from_utf8_lossy(&object.body));

        self.cache
            .hset(
                &metadata_key(key),
                &[
                    ("lines", lines.to_string()),
                    (
                        "processed_at",
                        object.last_modified.format("%Y-%m-%d %H:%M:%S").to_string(),
                    ),
                ],
            )
            .await?;
        self.cache.delete(LIST_CACHE_KEY).await?;

        tracing::info!("Processed {} ({} lines)", key, lines);
        Response::ok(&json!({ "file": key, "lines": lines }))
    }
}
