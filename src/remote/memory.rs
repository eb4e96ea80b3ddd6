// SPDX-License-Identifier: MPL-2.0

use crate::config::MAX_IN_VALUES;
use crate::remote::store::{RemoteError, RemoteStore, TransactFn};
use crate::remote::types::{
    Direction, Document, FieldUpdate, Fields, Filter, Query, compare_values,
};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

#[derive(Default)]
struct Collections {
    docs: HashMap<String, BTreeMap<String, Fields>>,
    clock: i64,
    next_id: u64,
}

impl Collections {
    fn collection(&mut self, name: &str) -> &mut BTreeMap<String, Fields> {
        self.docs.entry(name.to_string()).or_default()
    }

    /// Strictly increasing, never behind wall-clock time
    fn tick(&mut self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        self.clock = (self.clock + 1).max(wall);
        self.clock
    }
}

/// In-process document store with the same semantics as the backend.
///
/// Used by tests and local development. Failures and latency can be
/// injected to exercise the recovery paths of the reconciler and the pager.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
    offline: AtomicBool,
    signed_out: AtomicBool,
    fail_next: AtomicUsize,
    queries: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a document directly, bypassing failure injection
    pub fn insert(&self, collection: &str, id: &str, fields: Fields) {
        self.lock().collection(collection).insert(id.to_string(), fields);
    }

    /// Delete a document directly, as another client would
    pub fn remove(&self, collection: &str, id: &str) {
        self.lock().collection(collection).remove(id);
    }

    /// Read a document directly, bypassing failure injection
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        let mut inner = self.lock();
        inner
            .collection(collection)
            .get(id)
            .map(|fields| Document::new(id, fields.clone()))
    }

    /// Every call fails with `Unavailable` while offline
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// Every call fails with `Unauthenticated` while signed out
    pub fn set_signed_out(&self, signed_out: bool) {
        self.signed_out.store(signed_out, AtomicOrdering::SeqCst);
    }

    /// Fail the next `count` calls with `Unavailable`
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, AtomicOrdering::SeqCst);
    }

    /// Delay every call, so concurrent callers overlap
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Number of queries issued so far
    pub fn query_count(&self) -> usize {
        self.queries.load(AtomicOrdering::SeqCst)
    }

    async fn begin_call(&self, op: &str) -> Result<(), RemoteError> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        trace!(op, "memory store call");

        if self.signed_out.load(AtomicOrdering::SeqCst) {
            return Err(RemoteError::Unauthenticated);
        }
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(RemoteError::Unavailable("store is offline".to_string()));
        }
        let consumed = self
            .fail_next
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok();
        if consumed {
            return Err(RemoteError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn validate(query: &Query) -> Result<(), RemoteError> {
        for filter in &query.filters {
            if let Filter::In { field, values } = filter {
                if values.is_empty() {
                    return Err(RemoteError::InvalidQuery(format!(
                        "empty value list for '{field}'"
                    )));
                }
                if values.len() > MAX_IN_VALUES {
                    return Err(RemoteError::InvalidQuery(format!(
                        "'{field}' lists {} values, at most {MAX_IN_VALUES} allowed",
                        values.len()
                    )));
                }
            }
        }
        if query.start_after.is_some() && query.order_by.is_none() {
            return Err(RemoteError::InvalidQuery(
                "start_after requires order_by".to_string(),
            ));
        }
        Ok(())
    }
}

fn order_key_cmp(
    a_value: &Value,
    a_id: &str,
    b_value: &Value,
    b_id: &str,
    direction: Direction,
) -> Ordering {
    let natural = compare_values(a_value, b_value).then_with(|| a_id.cmp(b_id));
    match direction {
        Direction::Ascending => natural,
        Direction::Descending => natural.reverse(),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError> {
        self.begin_call("get").await?;
        Ok(self.document(collection, id))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, RemoteError> {
        self.begin_call("query").await?;
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        Self::validate(query)?;

        let mut inner = self.lock();
        let mut matched: Vec<Document> = inner
            .collection(collection)
            .iter()
            .filter(|(_, fields)| query.filters.iter().all(|f| f.matches(fields)))
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect();
        drop(inner);

        if let Some(order) = &query.order_by {
            let null = Value::Null;
            matched.sort_by(|a, b| {
                order_key_cmp(
                    a.get(&order.field).unwrap_or(&null),
                    &a.id,
                    b.get(&order.field).unwrap_or(&null),
                    &b.id,
                    order.direction,
                )
            });

            if let Some(cursor) = &query.start_after {
                matched.retain(|doc| {
                    order_key_cmp(
                        doc.get(&order.field).unwrap_or(&null),
                        &doc.id,
                        cursor.order_value(),
                        cursor.doc_id(),
                        order.direction,
                    ) == Ordering::Greater
                });
            }
        }

        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        Ok(matched)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> Result<(), RemoteError> {
        self.begin_call("set").await?;

        let mut inner = self.lock();
        let docs = inner.collection(collection);
        if merge && let Some(existing) = docs.get_mut(id) {
            existing.extend(fields);
        } else {
            docs.insert(id.to_string(), fields);
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: &[FieldUpdate],
    ) -> Result<(), RemoteError> {
        self.begin_call("update").await?;

        let mut inner = self.lock();
        let doc = inner
            .collection(collection)
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        for update in updates {
            update.apply(doc);
        }
        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        mut fields: Fields,
        timestamp_field: &str,
    ) -> Result<Document, RemoteError> {
        self.begin_call("create").await?;

        let mut inner = self.lock();
        let stamp = inner.tick();
        inner.next_id += 1;
        let id = format!("{collection}-{:06}", inner.next_id);

        fields.insert(timestamp_field.to_string(), Value::from(stamp));
        inner.collection(collection).insert(id.clone(), fields.clone());

        Ok(Document::new(id, fields))
    }

    async fn transact(
        &self,
        collection: &str,
        id: &str,
        apply: &TransactFn,
    ) -> Result<Fields, RemoteError> {
        self.begin_call("transact").await?;

        // The lock is held across read and write, so the body sees no
        // interleaved writer.
        let mut inner = self.lock();
        let docs = inner.collection(collection);
        let next = apply(docs.get(id))?;
        docs.insert(id.to_string(), next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::types::PageCursor;
    use serde_json::json;

    fn post(created_at: i64, creator: &str) -> Fields {
        match json!({ "createdAt": created_at, "creatorId": creator }) {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[tokio::test]
    async fn query_orders_limits_and_resumes_after_cursor() {
        let store = MemoryStore::new();
        for (id, at) in [("a", 100), ("b", 300), ("c", 200), ("d", 200)] {
            store.insert("posts", id, post(at, "u1"));
        }

        let first = Query::new()
            .where_eq("creatorId", "u1")
            .order_by("createdAt", Direction::Descending)
            .limit(2);
        let page = store.query("posts", &first).await.unwrap();
        let ids: Vec<_> = page.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["b", "d"]);

        let last = page.last().unwrap();
        let cursor = PageCursor::new(last.id.clone(), last.get("createdAt").cloned().unwrap());
        let next = store
            .query("posts", &first.clone().start_after(Some(cursor)))
            .await
            .unwrap();
        let ids: Vec<_> = next.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["c", "a"]);
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn oversized_in_filter_is_rejected() {
        let store = MemoryStore::new();
        let values: Vec<String> = (0..=MAX_IN_VALUES).map(|i| i.to_string()).collect();
        let query = Query::new().where_in("creatorPhoneLastNine", values);

        let err = store.query("posts", &query).await.unwrap_err();
        assert!(matches!(err, RemoteError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = MemoryStore::new();
        store.fail_next(1);

        assert!(matches!(
            store.get("posts", "x").await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(store.get("posts", "x").await.unwrap().is_none());

        store.set_signed_out(true);
        assert!(matches!(
            store.get("posts", "x").await,
            Err(RemoteError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn create_assigns_monotonic_timestamps() {
        let store = MemoryStore::new();
        let a = store.create("posts", Fields::new(), "createdAt").await.unwrap();
        let b = store.create("posts", Fields::new(), "createdAt").await.unwrap();

        let at = |d: &Document| d.get("createdAt").and_then(Value::as_i64).unwrap();
        assert!(at(&b) > at(&a));
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn set_with_merge_keeps_unlisted_fields() {
        let store = MemoryStore::new();
        store.insert("users", "u1", post(1, "u1"));

        let mut patch = Fields::new();
        patch.insert("name".into(), json!("Ana"));
        store.set("users", "u1", patch.clone(), true).await.unwrap();
        let merged = store.document("users", "u1").unwrap();
        assert_eq!(merged.get("creatorId"), Some(&json!("u1")));
        assert_eq!(merged.get("name"), Some(&json!("Ana")));

        store.set("users", "u1", patch, false).await.unwrap();
        assert!(store.document("users", "u1").unwrap().get("creatorId").is_none());
    }

    #[tokio::test]
    async fn update_on_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(
                "posts",
                "missing",
                &[FieldUpdate::Increment {
                    field: "likeCount".into(),
                    delta: 1,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }
}
