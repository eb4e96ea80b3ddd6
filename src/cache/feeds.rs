// SPDX-License-Identifier: MPL-2.0

use crate::cache::{CacheDb, CacheError, LocalCache};
use crate::config::FEED_SNAPSHOT_KEY;
use crate::feed::Post;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// The last successfully fetched first page, kept for offline display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFeedSnapshot {
    /// User the page was fetched for
    pub owner_id: String,
    /// Unix seconds
    pub saved_at: i64,
    pub posts: Vec<Post>,
}

impl CachedFeedSnapshot {
    pub fn is_fresh(&self, max_age: Duration, now: i64) -> bool {
        now.saturating_sub(self.saved_at) <= max_age.as_secs() as i64
    }
}

/// Cache operations for the feed snapshot
pub struct FeedSnapshotCache<'a> {
    cache: &'a dyn LocalCache,
}

impl<'a> FeedSnapshotCache<'a> {
    pub fn new(cache: &'a dyn LocalCache) -> Self {
        Self { cache }
    }

    /// Replace the snapshot with `posts`
    pub async fn store(&self, owner_id: &str, posts: &[Post]) -> Result<(), CacheError> {
        let snapshot = CachedFeedSnapshot {
            owner_id: owner_id.to_string(),
            saved_at: CacheDb::now(),
            posts: posts.to_vec(),
        };
        let json = serde_json::to_string(&snapshot)?;
        self.cache.set(FEED_SNAPSHOT_KEY, &json).await
    }

    /// Snapshot saved for `owner_id`. A snapshot left by another user, or
    /// one that no longer parses, counts as missing.
    pub async fn load(&self, owner_id: &str) -> Result<Option<CachedFeedSnapshot>, CacheError> {
        let Some(json) = self.cache.get(FEED_SNAPSHOT_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<CachedFeedSnapshot>(&json) {
            Ok(snapshot) if snapshot.owner_id == owner_id => Ok(Some(snapshot)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("ignoring unreadable feed snapshot: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.cache.remove(FEED_SNAPSHOT_KEY).await
    }

    /// Like [`load`](Self::load), but a snapshot older than `max_age` counts
    /// as missing too
    pub async fn load_fresh(
        &self,
        owner_id: &str,
        max_age: Duration,
    ) -> Result<Option<CachedFeedSnapshot>, CacheError> {
        let now = CacheDb::now();
        Ok(self.load(owner_id).await?.filter(|snapshot| {
            let fresh = snapshot.is_fresh(max_age, now);
            if !fresh {
                info!(saved_at = snapshot.saved_at, "feed snapshot too old to show");
            }
            fresh
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::feed::PostBody;
    use crate::remote::Timestamp;

    fn post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            creator_id: "u2".to_string(),
            creator_phone_last_nine: "771234567".to_string(),
            created_at: Timestamp(100),
            like_count: 3,
            liked: true,
            star_count: 0,
            starred: false,
            body: PostBody::Text {
                text: "hello".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn stores_and_loads_for_owner() {
        let cache = MemoryCache::new();
        let snapshots = FeedSnapshotCache::new(&cache);

        snapshots.store("u1", &[post("a"), post("b")]).await.unwrap();
        let loaded = snapshots.load("u1").await.unwrap().unwrap();

        assert_eq!(loaded.owner_id, "u1");
        assert_eq!(loaded.posts, vec![post("a"), post("b")]);
        assert!(
            snapshots
                .load_fresh("u1", Duration::from_secs(60))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn other_owner_sees_nothing() {
        let cache = MemoryCache::new();
        let snapshots = FeedSnapshotCache::new(&cache);
        snapshots.store("u1", &[post("a")]).await.unwrap();

        assert!(snapshots.load("u2").await.unwrap().is_none());
        assert!(
            snapshots
                .load_fresh("u2", Duration::from_secs(60))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_ignored() {
        let cache = MemoryCache::new();
        cache.set(FEED_SNAPSHOT_KEY, "{not json").await.unwrap();

        let snapshots = FeedSnapshotCache::new(&cache);
        assert!(snapshots.load("u1").await.unwrap().is_none());

        snapshots.clear().await.unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn freshness_uses_saved_time() {
        let snapshot = CachedFeedSnapshot {
            owner_id: "u1".to_string(),
            saved_at: 1_000,
            posts: Vec::new(),
        };
        assert!(snapshot.is_fresh(Duration::from_secs(100), 1_100));
        assert!(!snapshot.is_fresh(Duration::from_secs(100), 1_101));
    }

    #[tokio::test]
    async fn stale_snapshot_is_not_fresh() {
        let cache = MemoryCache::new();
        let stale = CachedFeedSnapshot {
            owner_id: "u1".to_string(),
            saved_at: CacheDb::now() - 3_600,
            posts: vec![post("a")],
        };
        cache
            .set(FEED_SNAPSHOT_KEY, &serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();

        let snapshots = FeedSnapshotCache::new(&cache);
        assert!(snapshots.load("u1").await.unwrap().is_some());
        assert!(
            snapshots
                .load_fresh("u1", Duration::from_secs(60))
                .await
                .unwrap()
                .is_none()
        );
    }
}
