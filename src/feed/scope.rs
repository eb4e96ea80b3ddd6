// SPDX-License-Identifier: MPL-2.0

//! Which posts a viewer may see, and how to ask the store for them.
//!
//! The store cannot OR across different fields, and caps the size of an
//! `In` list. A page is therefore fetched as several queries (one per chunk
//! of contact suffixes, one for the viewer's own posts) that are merged
//! like two overlapping pages.

use crate::config::{CONTACT_SETS_COLLECTION, MAX_IN_VALUES, POSTS_COLLECTION};
use crate::contacts::ContactSet;
use crate::feed::merge::merge_branches;
use crate::feed::post::{FIELD_CREATED_AT, FIELD_CREATOR_ID, FIELD_CREATOR_LAST_NINE};
use crate::feed::Post;
use crate::format::is_in_scope;
use crate::remote::{Direction, Document, PageCursor, Query, RemoteError, RemoteStore};
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// The set of authors visible to one viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedScope {
    pub viewer_id: String,
    suffixes: HashSet<String>,
}

impl FeedScope {
    pub fn new(viewer_id: impl Into<String>, contacts: &ContactSet) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            suffixes: contacts.suffixes(),
        }
    }

    /// Read the viewer's current contact set. A user who never synced
    /// contacts gets a scope holding only their own posts.
    pub async fn resolve(store: &dyn RemoteStore, viewer_id: &str) -> Result<Self, RemoteError> {
        let contacts = store
            .get(CONTACT_SETS_COLLECTION, viewer_id)
            .await?
            .map(|doc| ContactSet::from_document(&doc))
            .unwrap_or_else(|| ContactSet::new(viewer_id));
        Ok(Self::new(viewer_id, &contacts))
    }

    pub fn is_self_only(&self) -> bool {
        self.suffixes.is_empty()
    }

    pub fn contains(&self, post: &Post) -> bool {
        is_in_scope(
            &post.creator_id,
            &post.creator_phone_last_nine,
            &self.viewer_id,
            &self.suffixes,
        )
    }

    /// Queries covering one page of this scope, newest first
    pub fn queries(&self, page_size: usize, cursor: Option<&PageCursor>) -> Vec<Query> {
        let base = || {
            Query::new()
                .order_by(FIELD_CREATED_AT, Direction::Descending)
                .limit(page_size)
                .start_after(cursor.cloned())
        };

        let mut suffixes: Vec<&String> = self.suffixes.iter().collect();
        suffixes.sort();

        let mut queries: Vec<Query> = suffixes
            .chunks(MAX_IN_VALUES)
            .map(|chunk| base().where_in(FIELD_CREATOR_LAST_NINE, chunk.iter().map(|s| s.as_str())))
            .collect();
        queries.push(base().where_eq(FIELD_CREATOR_ID, self.viewer_id.as_str()));
        queries
    }

    /// Decode a returned document, dropping it if it cannot be read or was
    /// written by someone outside the scope
    fn visible_post(&self, doc: &Document) -> Option<Post> {
        match Post::from_document(doc, &self.viewer_id) {
            Ok(post) if self.contains(&post) => Some(post),
            Ok(post) => {
                warn!(
                    doc_id = %doc.id,
                    creator = %post.creator_id,
                    "dropping post outside the viewer's contacts"
                );
                None
            }
            Err(e) => {
                warn!(doc_id = %doc.id, error = %e, "skipping unreadable post");
                None
            }
        }
    }
}

/// One page of the feed
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub posts: Vec<Post>,
    /// Where the next page starts; `None` once exhausted
    pub next_cursor: Option<PageCursor>,
    /// Fewer posts than a full page remain
    pub exhausted: bool,
}

fn document_cursor(doc: &Document) -> PageCursor {
    let order_value = doc.get(FIELD_CREATED_AT).cloned().unwrap_or(Value::Null);
    PageCursor::new(doc.id.clone(), order_value)
}

/// Fetch one page for a scope, resuming after `cursor` when given.
///
/// Paging works on the raw documents, so a record that is skipped still
/// moves the cursor past it. A page may therefore hold fewer posts than
/// `page_size` without being exhausted.
pub async fn fetch_page(
    store: &dyn RemoteStore,
    scope: &FeedScope,
    page_size: usize,
    cursor: Option<&PageCursor>,
) -> Result<FetchedPage, RemoteError> {
    let queries = scope.queries(page_size, cursor);
    let branches = try_join_all(
        queries
            .iter()
            .map(|query| store.query(POSTS_COLLECTION, query)),
    )
    .await?;

    let full_branch = branches.iter().any(|docs| docs.len() >= page_size);
    let mut docs = merge_branches(branches);
    let exhausted = !full_branch && docs.len() <= page_size;
    docs.truncate(page_size);

    let next_cursor = if exhausted {
        None
    } else {
        docs.last().map(document_cursor)
    };
    let posts: Vec<Post> = docs.iter().filter_map(|doc| scope.visible_post(doc)).collect();

    debug!(
        viewer = %scope.viewer_id,
        self_only = scope.is_self_only(),
        queries = queries.len(),
        fetched = docs.len(),
        shown = posts.len(),
        exhausted,
        "fetched feed page"
    );

    Ok(FetchedPage {
        posts,
        next_cursor,
        exhausted,
    })
}
