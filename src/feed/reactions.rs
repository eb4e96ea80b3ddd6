// SPDX-License-Identifier: MPL-2.0

use crate::config::POSTS_COLLECTION;
use crate::error::SyncError;
use crate::feed::{FeedPager, Post};
use crate::remote::{FieldUpdate, Fields, RemoteError, with_timeout};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Star,
}

impl Reaction {
    fn count_field(self) -> &'static str {
        match self {
            Self::Like => "likeCount",
            Self::Star => "starCount",
        }
    }

    fn members_field(self) -> &'static str {
        match self {
            Self::Like => "likedBy",
            Self::Star => "starredBy",
        }
    }

    /// The viewer's state for this reaction in a stored post
    fn stored_state(self, fields: &Fields, viewer_id: &str) -> ReactionState {
        let active = fields
            .get(self.members_field())
            .and_then(Value::as_array)
            .is_some_and(|members| members.iter().any(|m| m.as_str() == Some(viewer_id)));
        let count = fields
            .get(self.count_field())
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        ReactionState { active, count }
    }

    /// Transforms that move the viewer in or out and keep the counter in step
    fn updates(self, viewer_id: &str, active: bool) -> [FieldUpdate; 2] {
        let viewer = Value::from(viewer_id);
        let members = self.members_field().to_string();
        [
            FieldUpdate::Increment {
                field: self.count_field().to_string(),
                delta: if active { 1 } else { -1 },
            },
            if active {
                FieldUpdate::ArrayUnion {
                    field: members,
                    value: viewer,
                }
            } else {
                FieldUpdate::ArrayRemove {
                    field: members,
                    value: viewer,
                }
            },
        ]
    }
}

/// The viewer's side of one reaction on one post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionState {
    pub active: bool,
    pub count: u32,
}

impl ReactionState {
    fn toggled(self) -> Self {
        if self.active {
            Self {
                active: false,
                count: self.count.saturating_sub(1),
            }
        } else {
            Self {
                active: true,
                count: self.count.saturating_add(1),
            }
        }
    }
}

impl Post {
    pub fn reaction(&self, reaction: Reaction) -> ReactionState {
        match reaction {
            Reaction::Like => ReactionState {
                active: self.liked,
                count: self.like_count,
            },
            Reaction::Star => ReactionState {
                active: self.starred,
                count: self.star_count,
            },
        }
    }

    /// Overwrite one reaction, leaving every other field alone
    pub fn set_reaction(&mut self, reaction: Reaction, state: ReactionState) {
        match reaction {
            Reaction::Like => {
                self.liked = state.active;
                self.like_count = state.count;
            }
            Reaction::Star => {
                self.starred = state.active;
                self.star_count = state.count;
            }
        }
    }
}

impl FeedPager {
    /// Flip a reaction on a post in the list.
    ///
    /// The list changes immediately. The store write is a transaction against
    /// the stored membership, and the list then takes the committed count.
    /// If the store rejects the write, only the toggled reaction is put back.
    /// Returns whether the reaction is now on.
    pub async fn toggle_reaction(
        &self,
        post_id: &str,
        reaction: Reaction,
    ) -> Result<bool, SyncError> {
        let session = self.session().require()?;

        let (before, after) = self
            .with_post_mut(post_id, |post| {
                let before = post.reaction(reaction);
                let after = before.toggled();
                post.set_reaction(reaction, after);
                (before, after)
            })
            .ok_or_else(|| SyncError::InvalidData(format!("post {post_id} is not in the feed")))?;

        let viewer_id = session.user_id;
        let apply = |existing: Option<&Fields>| -> Result<Fields, RemoteError> {
            let Some(existing) = existing else {
                return Err(RemoteError::NotFound {
                    collection: POSTS_COLLECTION.to_string(),
                    id: post_id.to_string(),
                });
            };
            let mut fields = existing.clone();
            // The on-screen flag may be stale; only move the counter when
            // the stored membership actually changes
            if reaction.stored_state(&fields, &viewer_id).active != after.active {
                for update in reaction.updates(&viewer_id, after.active) {
                    update.apply(&mut fields);
                }
            }
            Ok(fields)
        };

        let result = with_timeout(
            self.remote_timeout(),
            self.store().transact(POSTS_COLLECTION, post_id, &apply),
        )
        .await;

        match result {
            Ok(committed) => {
                let stored = reaction.stored_state(&committed, &viewer_id);
                self.with_post_mut(post_id, |post| post.set_reaction(reaction, stored));
                debug!(
                    post_id,
                    ?reaction,
                    active = stored.active,
                    count = stored.count,
                    "reaction saved"
                );
                Ok(stored.active)
            }
            Err(e) => {
                warn!(post_id, ?reaction, "reaction failed, rolling back: {}", e);
                self.with_post_mut(post_id, |post| post.set_reaction(reaction, before));
                Err(e.into())
            }
        }
    }

    pub async fn toggle_like(&self, post_id: &str) -> Result<bool, SyncError> {
        self.toggle_reaction(post_id, Reaction::Like).await
    }

    pub async fn toggle_star(&self, post_id: &str) -> Result<bool, SyncError> {
        self.toggle_reaction(post_id, Reaction::Star).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::CONTACT_SETS_COLLECTION;
    use crate::contacts::ContactSet;
    use crate::remote::{MemoryStore, RemoteStore};
    use crate::state::{Session, SessionManager};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryStore>, FeedPager) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let session = Arc::new(SessionManager::new(cache.clone()));
        session
            .sign_in(Session::new("viewer", "+967700000001"))
            .await
            .unwrap();

        let set = ContactSet::from_raw("viewer", ["771234567"]);
        store.insert(CONTACT_SETS_COLLECTION, "viewer", set.to_fields().unwrap());
        let fields = match json!({
            "creatorId": "u2",
            "creatorPhoneLastNine": "771234567",
            "createdAt": 100,
            "likeCount": 4,
            "likedBy": ["u3", "u4", "u5", "u6"],
            "starCount": 1,
            "starredBy": ["u3"],
            "postType": "text",
            "text": "hello",
        }) {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        store.insert(POSTS_COLLECTION, "p1", fields);

        let pager = FeedPager::new(store.clone(), cache, session);
        pager.mount().await;
        (store, pager)
    }

    #[tokio::test]
    async fn like_then_unlike_updates_store() {
        let (store, pager) = setup().await;

        assert!(pager.toggle_like("p1").await.unwrap());
        let post = &pager.posts()[0];
        assert!(post.liked);
        assert_eq!(post.like_count, 5);

        let doc = store.document(POSTS_COLLECTION, "p1").unwrap();
        assert_eq!(doc.get("likeCount"), Some(&json!(5)));
        assert_eq!(
            doc.get("likedBy"),
            Some(&json!(["u3", "u4", "u5", "u6", "viewer"]))
        );

        assert!(!pager.toggle_like("p1").await.unwrap());
        let doc = store.document(POSTS_COLLECTION, "p1").unwrap();
        assert_eq!(doc.get("likeCount"), Some(&json!(4)));
        assert_eq!(doc.get("likedBy"), Some(&json!(["u3", "u4", "u5", "u6"])));
    }

    #[tokio::test]
    async fn failed_like_restores_previous_state() {
        let (store, pager) = setup().await;
        let before = pager.posts()[0].clone();

        store.fail_next(1);
        let err = pager.toggle_like("p1").await.unwrap_err();

        assert!(matches!(err, SyncError::RemoteUnavailable(_)));
        assert_eq!(pager.posts()[0], before);
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_leaves_other_reaction_alone() {
        let (store, pager) = setup().await;
        store.set_latency(Some(Duration::from_millis(50)));
        store.fail_next(1);

        let concurrent_star = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            pager.with_post_mut("p1", |post| {
                post.set_reaction(
                    Reaction::Star,
                    ReactionState {
                        active: true,
                        count: 7,
                    },
                )
            });
        };
        let (result, ()) = tokio::join!(pager.toggle_like("p1"), concurrent_star);

        assert!(result.is_err());
        let post = &pager.posts()[0];
        assert_eq!(
            post.reaction(Reaction::Like),
            ReactionState {
                active: false,
                count: 4
            }
        );
        assert_eq!(
            post.reaction(Reaction::Star),
            ReactionState {
                active: true,
                count: 7
            }
        );
    }

    #[tokio::test]
    async fn stale_flag_does_not_double_count() {
        let (store, pager) = setup().await;
        // Liked from another device after the page was loaded
        store
            .update(
                POSTS_COLLECTION,
                "p1",
                &Reaction::Like.updates("viewer", true),
            )
            .await
            .unwrap();
        assert!(!pager.posts()[0].liked);

        assert!(pager.toggle_like("p1").await.unwrap());

        let doc = store.document(POSTS_COLLECTION, "p1").unwrap();
        assert_eq!(doc.get("likeCount"), Some(&json!(5)));
        assert_eq!(
            doc.get("likedBy"),
            Some(&json!(["u3", "u4", "u5", "u6", "viewer"]))
        );
        assert_eq!(
            pager.posts()[0].reaction(Reaction::Like),
            ReactionState {
                active: true,
                count: 5
            }
        );
    }

    #[tokio::test]
    async fn deleted_post_rolls_back() {
        let (store, pager) = setup().await;
        let before = pager.posts()[0].clone();
        store.remove(POSTS_COLLECTION, "p1");

        let err = pager.toggle_star("p1").await.unwrap_err();

        assert!(matches!(err, SyncError::RemoteUnavailable(_)));
        assert_eq!(pager.posts()[0], before);
        assert!(store.document(POSTS_COLLECTION, "p1").is_none());
    }

    #[tokio::test]
    async fn unknown_post_is_rejected_without_remote_call() {
        let (store, pager) = setup().await;
        store.set_offline(true);

        let err = pager.toggle_star("missing").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidData(_)));
    }
}
