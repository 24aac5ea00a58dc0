//! File request handlers for a provisioned StackForge topology
//!
//! The handlers only need three values from the topology: the cache
//! endpoint, the data bucket and the notification topic ARN. They are
//! written against the [`ObjectStore`], [`MetadataCache`] and [`Notifier`]
//! traits, with S3/SNS and Redis implementations for the deployed functions
//! and in-memory ones for local runs.

pub mod aws;
pub mod backend;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod files;
pub mod memory;
pub mod redis_cache;
pub mod response;
pub mod runtime;

pub use backend::{MetadataCache, Notifier, ObjectStore, ObjectSummary, StoredObject};
pub use dispatch::HandlerKind;
pub use error::{HandlerError, Result};
pub use event::{ApiRequest, S3Event};
pub use files::{FileEntry, FileHandlers, GeneratedFile, LIST_CACHE_KEY, LIST_CACHE_TTL};
pub use memory::{MemoryCache, MemoryNotifier, MemoryObjectStore};
pub use response::Response;
pub use runtime::{HandlerEnv, RuntimeClient};
