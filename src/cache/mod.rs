// SPDX-License-Identifier: MPL-2.0

mod db;
mod feeds;
mod memory;
mod schema;

pub use db::CacheDb;
pub use feeds::{CachedFeedSnapshot, FeedSnapshotCache};
pub use memory::MemoryCache;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database path error: {0}")]
    Path(String),
    #[error("cache worker failed: {0}")]
    Worker(String),
}

/// Durable string-keyed store on the device. No querying, no expiry.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}
