// SPDX-License-Identifier: MPL-2.0

use crate::cache::LocalCache;
use crate::config::{CONTACT_SETS_COLLECTION, CONTACTS_SNAPSHOT_KEY, DEFAULT_REMOTE_TIMEOUT, RECONCILE_TASK_ID};
use crate::contacts::{ContactDirectory, ContactSet, Permission};
use crate::error::SyncError;
use crate::remote::{Fields, RemoteError, RemoteStore, with_timeout};
use crate::scheduler::{BackgroundScheduler, SchedulerError, TaskCallback, TaskResult};
use crate::state::{Session, SessionManager};
use futures::FutureExt;
use std::iter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Device contacts match the last synced snapshot; nothing was written
    NoChange,
    /// The backend set was merged; `total` is its size afterwards
    Synced { total: usize },
}

/// Keeps the backend contact set a superset of the device address book.
///
/// Safe to run from several triggers at once (background tick, app resume):
/// the backend write is a transactional union, so no run can drop numbers
/// another run added.
pub struct ContactReconciler {
    directory: Arc<dyn ContactDirectory>,
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn LocalCache>,
    session: Arc<SessionManager>,
    remote_timeout: Duration,
}

impl ContactReconciler {
    pub fn new(
        directory: Arc<dyn ContactDirectory>,
        store: Arc<dyn RemoteStore>,
        cache: Arc<dyn LocalCache>,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            directory,
            store,
            cache,
            session,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Sync device contacts into the backend contact set.
    ///
    /// Permission refusal is returned as-is and never retried here; remote
    /// failures are left for the next scheduled run.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome, SyncError> {
        let session = self.session.require()?;
        debug!(user_id = %session.user_id, "reconciling contacts");

        let local = self.collect_local(&session).await?;
        let serialized =
            serde_json::to_string(&local).map_err(|e| SyncError::InvalidData(e.to_string()))?;

        let previous = self.cache.get(CONTACTS_SNAPSHOT_KEY).await?;
        if previous.as_deref() == Some(serialized.as_str()) {
            debug!(numbers = local.len(), "contacts unchanged since last sync");
            return Ok(ReconcileOutcome::NoChange);
        }

        self.cache.set(CONTACTS_SNAPSHOT_KEY, &serialized).await?;

        match self.merge_remote(&local).await {
            Ok(total) => {
                info!(user_id = %session.user_id, local = local.len(), total, "contacts synced");
                Ok(ReconcileOutcome::Synced { total })
            }
            Err(err) => {
                // Put the old snapshot back so the next run retries the merge
                self.restore_snapshot(previous.as_deref()).await;
                warn!(user_id = %session.user_id, error = %err, "contact merge failed");
                Err(err)
            }
        }
    }

    /// Scheduler entry point
    pub async fn run_scheduled(&self) -> TaskResult {
        match self.reconcile().await {
            Ok(ReconcileOutcome::Synced { .. }) => TaskResult::NewData,
            Ok(ReconcileOutcome::NoChange) => TaskResult::NoData,
            Err(err) if err.is_recoverable() => {
                info!(error = %err, "scheduled contact sync failed, will retry next run");
                TaskResult::Failed
            }
            Err(err) => {
                warn!(error = %err, "scheduled contact sync failed");
                TaskResult::Failed
            }
        }
    }

    pub fn task(self: &Arc<Self>) -> TaskCallback {
        let reconciler = Arc::clone(self);
        Arc::new(move || {
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.run_scheduled().await }.boxed()
        })
    }

    pub fn register(
        self: &Arc<Self>,
        scheduler: &dyn BackgroundScheduler,
        interval: Duration,
    ) -> Result<(), SchedulerError> {
        scheduler.register(RECONCILE_TASK_ID, interval, self.task())
    }

    async fn collect_local(&self, session: &Session) -> Result<ContactSet, SyncError> {
        if self.directory.request_permission().await == Permission::Denied {
            return Err(SyncError::PermissionDenied);
        }

        let contacts = self.directory.list_contacts().await?;
        let numbers = contacts
            .iter()
            .flat_map(|c| c.phone_numbers.iter().map(String::as_str))
            // The viewer always matches their own posts
            .chain(iter::once(session.phone_number.as_str()));

        Ok(ContactSet::from_raw(&session.user_id, numbers))
    }

    async fn merge_remote(&self, local: &ContactSet) -> Result<usize, SyncError> {
        let incoming = local.clone();
        let apply = move |existing: Option<&Fields>| -> Result<Fields, RemoteError> {
            match existing {
                Some(fields) => {
                    let mut merged = fields.clone();
                    incoming.merge_into(&mut merged);
                    Ok(merged)
                }
                None => Ok(incoming.to_fields()?),
            }
        };

        let committed = with_timeout(
            self.remote_timeout,
            self.store
                .transact(CONTACT_SETS_COLLECTION, &local.owner_id, &apply),
        )
        .await?;

        Ok(ContactSet::from_fields(&local.owner_id, &committed).len())
    }

    async fn restore_snapshot(&self, previous: Option<&str>) {
        let restored = match previous {
            Some(snapshot) => self.cache.set(CONTACTS_SNAPSHOT_KEY, snapshot).await,
            None => self.cache.remove(CONTACTS_SNAPSHOT_KEY).await,
        };
        if let Err(e) = restored {
            warn!("failed to restore contacts snapshot: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::contacts::{ContactRecord, MockContactDirectory, StaticDirectory};
    use crate::remote::MemoryStore;
    use std::collections::BTreeSet;

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<MemoryCache>,
        session: Arc<SessionManager>,
    }

    impl Fixture {
        async fn new() -> Self {
            let cache = Arc::new(MemoryCache::new());
            let session = Arc::new(SessionManager::new(cache.clone()));
            session
                .sign_in(Session::new("u1", "+967 700 000 001"))
                .await
                .unwrap();
            Self {
                store: Arc::new(MemoryStore::new()),
                cache,
                session,
            }
        }

        fn reconciler(&self, directory: Arc<dyn ContactDirectory>) -> ContactReconciler {
            ContactReconciler::new(
                directory,
                self.store.clone(),
                self.cache.clone(),
                self.session.clone(),
            )
        }

        fn remote_numbers(&self) -> BTreeSet<String> {
            self.store
                .document(CONTACT_SETS_COLLECTION, "u1")
                .map(|doc| ContactSet::from_document(&doc).phone_numbers)
                .unwrap_or_default()
        }
    }

    fn directory(numbers: &[&str]) -> Arc<dyn ContactDirectory> {
        Arc::new(StaticDirectory::new(vec![ContactRecord::with_numbers(
            numbers.iter().copied(),
        )]))
    }

    fn set_of(numbers: &[&str]) -> BTreeSet<String> {
        numbers.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn first_sync_writes_contacts_and_self() {
        let fx = Fixture::new().await;
        let reconciler = fx.reconciler(directory(&["771 234 567", "771234567"]));

        let outcome = reconciler.reconcile().await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Synced { total: 2 });
        assert_eq!(fx.remote_numbers(), set_of(&["+967700000001", "771234567"]));
    }

    #[tokio::test]
    async fn unchanged_contacts_skip_the_remote_write() {
        let fx = Fixture::new().await;
        let reconciler = fx.reconciler(directory(&["771234567"]));
        reconciler.reconcile().await.unwrap();

        // Any remote call would now fail
        fx.store.set_offline(true);
        assert_eq!(reconciler.reconcile().await.unwrap(), ReconcileOutcome::NoChange);
    }

    #[tokio::test]
    async fn empty_address_book_still_syncs_own_number() {
        let fx = Fixture::new().await;
        let reconciler = fx.reconciler(Arc::new(StaticDirectory::new(Vec::new())));

        assert_eq!(
            reconciler.reconcile().await.unwrap(),
            ReconcileOutcome::Synced { total: 1 }
        );
        assert_eq!(fx.remote_numbers(), set_of(&["+967700000001"]));
    }

    #[tokio::test]
    async fn removed_contacts_stay_known() {
        let fx = Fixture::new().await;
        fx.reconciler(directory(&["111111111", "222222222"]))
            .reconcile()
            .await
            .unwrap();

        fx.reconciler(directory(&["222222222"]))
            .reconcile()
            .await
            .unwrap();

        assert_eq!(
            fx.remote_numbers(),
            set_of(&["+967700000001", "111111111", "222222222"])
        );
    }

    #[tokio::test]
    async fn merge_keeps_fields_written_by_other_clients() {
        let fx = Fixture::new().await;
        let existing = match serde_json::json!({
            "ownerId": "u1",
            "phoneNumbers": ["111111111", 7],
            "source": "web",
        }) {
            serde_json::Value::Object(map) => map,
            _ => Fields::new(),
        };
        fx.store.insert(CONTACT_SETS_COLLECTION, "u1", existing);

        fx.reconciler(directory(&["222222222"]))
            .reconcile()
            .await
            .unwrap();

        let doc = fx.store.document(CONTACT_SETS_COLLECTION, "u1").unwrap();
        assert_eq!(doc.get("source"), Some(&serde_json::json!("web")));
        assert_eq!(
            doc.get("phoneNumbers"),
            Some(&serde_json::json!([
                "111111111",
                7,
                "+967700000001",
                "222222222"
            ]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_runs_keep_the_union() {
        let fx = Fixture::new().await;
        fx.store.set_latency(Some(Duration::from_millis(50)));

        // Two triggers with different views of the address book and their
        // own local snapshots (background process vs. foreground app)
        let background = ContactReconciler::new(
            directory(&["111111111", "333333333"]),
            fx.store.clone(),
            Arc::new(MemoryCache::new()),
            fx.session.clone(),
        );
        let foreground = ContactReconciler::new(
            directory(&["222222222", "333333333"]),
            fx.store.clone(),
            Arc::new(MemoryCache::new()),
            fx.session.clone(),
        );

        let (a, b) = tokio::join!(background.reconcile(), foreground.reconcile());
        a.unwrap();
        b.unwrap();

        assert_eq!(
            fx.remote_numbers(),
            set_of(&["+967700000001", "111111111", "222222222", "333333333"])
        );
    }

    #[tokio::test]
    async fn permission_denied_is_surfaced_without_listing() {
        let fx = Fixture::new().await;
        let mut mock = MockContactDirectory::new();
        mock.expect_request_permission()
            .times(1)
            .returning(|| Permission::Denied);
        mock.expect_list_contacts().never();

        let err = fx.reconciler(Arc::new(mock)).reconcile().await.unwrap_err();

        assert!(matches!(err, SyncError::PermissionDenied));
        assert!(fx.store.document(CONTACT_SETS_COLLECTION, "u1").is_none());
    }

    #[tokio::test]
    async fn signed_out_user_is_unauthenticated() {
        let fx = Fixture::new().await;
        fx.session.sign_out().await.unwrap();

        let err = fx
            .reconciler(directory(&["771234567"]))
            .reconcile()
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Unauthenticated));
    }

    #[tokio::test]
    async fn remote_failure_is_retried_on_next_run() {
        let fx = Fixture::new().await;
        let reconciler = fx.reconciler(directory(&["771234567"]));

        fx.store.fail_next(1);
        let err = reconciler.reconcile().await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable(_)));
        assert_eq!(fx.cache.get(CONTACTS_SNAPSHOT_KEY).await.unwrap(), None);

        assert_eq!(
            reconciler.reconcile().await.unwrap(),
            ReconcileOutcome::Synced { total: 2 }
        );
    }

    #[tokio::test]
    async fn scheduled_run_recovers_after_remote_failure() {
        let fx = Fixture::new().await;
        let reconciler = Arc::new(fx.reconciler(directory(&["771234567"])));
        let task = reconciler.task();

        fx.store.fail_next(1);
        assert_eq!(task().await, TaskResult::Failed);
        assert_eq!(task().await, TaskResult::NewData);
    }

    #[tokio::test]
    async fn scheduled_run_reports_task_results() {
        let fx = Fixture::new().await;
        let reconciler = Arc::new(fx.reconciler(directory(&["771234567"])));
        let task = reconciler.task();

        assert_eq!(task().await, TaskResult::NewData);
        assert_eq!(task().await, TaskResult::NoData);

        fx.session.sign_out().await.unwrap();
        assert_eq!(task().await, TaskResult::Failed);
    }

    #[tokio::test]
    async fn snapshot_of_another_user_does_not_short_circuit() {
        let fx = Fixture::new().await;
        let other = ContactSet::from_raw("someone-else", ["+967700000001", "771234567"]);
        fx.cache
            .set(CONTACTS_SNAPSHOT_KEY, &serde_json::to_string(&other).unwrap())
            .await
            .unwrap();

        let outcome = fx
            .reconciler(directory(&["771234567"]))
            .reconcile()
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Synced { total: 2 });
    }
}
