use serde_json::{Value, json};
use stackforge_handlers::{FileHandlers, MemoryCache, MemoryNotifier, MemoryObjectStore};
use std::sync::Arc;

pub const BUCKET: &str = "demo-data";

/// Handlers wired to in-memory backends, with the backends kept for inspection
pub struct TestBackends {
    pub store: Arc<MemoryObjectStore>,
    pub cache: Arc<MemoryCache>,
    pub notifier: Arc<MemoryNotifier>,
    pub handlers: FileHandlers,
}

impl TestBackends {
    pub fn new() -> Self {
        let store = Arc::new(MemoryObjectStore::new(BUCKET));
        let cache = Arc::new(MemoryCache::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let handlers = FileHandlers::new(store.clone(), cache.clone(), notifier.clone());

        Self {
            store,
            cache,
            notifier,
            handlers,
        }
    }
}

pub fn delete_request(filename: &str) -> Value {
    json!({
        "httpMethod": "DELETE",
        "path": format!("/files/{}", filename),
        "pathParameters": { "filename": filename }
    })
}

pub fn object_created(key: &str) -> Value {
    json!({
        "Records": [{
            "eventSource": "aws:s3",
            "eventName": "ObjectCreated:Put",
            "s3": {
                "bucket": { "name": BUCKET },
                "object": { "key": key }
            }
        }]
    })
}

pub fn names(listing: &Value) -> Vec<String> {
    listing
        .as_array()
        .map(|files| {
            files
                .iter()
                .filter_map(|file| file["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
