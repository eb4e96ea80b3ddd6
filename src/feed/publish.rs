// SPDX-License-Identifier: MPL-2.0

use crate::config::{DEFAULT_REMOTE_TIMEOUT, POSTS_COLLECTION};
use crate::error::SyncError;
use crate::feed::post::FIELD_CREATED_AT;
use crate::feed::{Post, PostBody, PostRecord};
use crate::format::last_nine_digits;
use crate::remote::{RemoteStore, Timestamp, to_fields, with_timeout};
use crate::state::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Writes new posts for the signed-in user
pub struct PostPublisher {
    store: Arc<dyn RemoteStore>,
    session: Arc<SessionManager>,
    remote_timeout: Duration,
}

impl PostPublisher {
    pub fn new(store: Arc<dyn RemoteStore>, session: Arc<SessionManager>) -> Self {
        Self {
            store,
            session,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Publish a post. The author's phone suffix is written alongside so
    /// contacts can find it; the creation time comes from the store.
    pub async fn publish(&self, body: PostBody) -> Result<Post, SyncError> {
        let session = self.session.require()?;
        let last_nine = last_nine_digits(&session.phone_number);
        if last_nine.is_empty() {
            return Err(SyncError::InvalidData(
                "signed-in user has no phone number".to_string(),
            ));
        }

        let record = PostRecord {
            creator_id: session.user_id.clone(),
            creator_phone_last_nine: last_nine,
            created_at: Timestamp::default(),
            like_count: 0,
            liked_by: Vec::new(),
            star_count: 0,
            starred_by: Vec::new(),
            body,
        };
        let mut fields = to_fields(&record).map_err(|e| SyncError::InvalidData(e.to_string()))?;
        fields.remove(FIELD_CREATED_AT);

        let doc = with_timeout(
            self.remote_timeout,
            self.store.create(POSTS_COLLECTION, fields, FIELD_CREATED_AT),
        )
        .await?;

        let post = Post::from_document(&doc, &session.user_id)
            .map_err(|e| SyncError::InvalidData(e.to_string()))?;
        info!(post_id = %post.id, post_type = post.body.post_type(), "post published");
        Ok(post)
    }
}
