// SPDX-License-Identifier: MPL-2.0

//! Wires the engine's components together for an app shell.
//!
//! The shell owns the platform pieces (contact directory, backend store,
//! local cache, background scheduler) and hands them in once. Everything
//! else goes through [`SyncEngine`].

use crate::cache::{FeedSnapshotCache, LocalCache};
use crate::config::{APP_NAME, AUTO_REFRESH_TASK_ID, CONTACTS_SNAPSHOT_KEY, RECONCILE_TASK_ID};
use crate::contacts::{ContactDirectory, ContactReconciler, ReconcileOutcome};
use crate::error::SyncError;
use crate::feed::{FeedPager, Post, PostBody, PostPublisher};
use crate::remote::RemoteStore;
use crate::scheduler::{BackgroundScheduler, SchedulerError};
use crate::state::{EngineSettings, Session, SessionManager};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

pub struct SyncEngine {
    settings: EngineSettings,
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn LocalCache>,
    session: Arc<SessionManager>,
    reconciler: Arc<ContactReconciler>,
    scheduler: Arc<dyn BackgroundScheduler>,
    /// Pager of the feed view currently on screen
    feed: Mutex<Option<Arc<FeedPager>>>,
}

impl SyncEngine {
    pub fn new(
        settings: EngineSettings,
        directory: Arc<dyn ContactDirectory>,
        store: Arc<dyn RemoteStore>,
        cache: Arc<dyn LocalCache>,
        scheduler: Arc<dyn BackgroundScheduler>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(cache.clone()));
        let reconciler = Arc::new(
            ContactReconciler::new(directory, store.clone(), cache.clone(), session.clone())
                .with_remote_timeout(settings.remote_timeout()),
        );

        Self {
            settings,
            store,
            cache,
            session,
            reconciler,
            scheduler,
            feed: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Restore the stored session and, if there is one, start background
    /// contact sync.
    pub async fn start(&self) -> Result<Option<Session>, SyncError> {
        info!("{} sync engine starting", APP_NAME);
        let session = self.session.restore().await?;
        if session.is_some() {
            self.schedule_reconcile();
        }
        Ok(session)
    }

    pub async fn sign_in(&self, session: Session) -> Result<(), SyncError> {
        self.session.sign_in(session).await?;
        self.schedule_reconcile();
        Ok(())
    }

    /// Stop all background work and forget everything saved for this user
    pub async fn sign_out(&self) -> Result<(), SyncError> {
        self.close_feed();
        self.scheduler.cancel(RECONCILE_TASK_ID);

        FeedSnapshotCache::new(self.cache.as_ref()).clear().await?;
        self.cache.remove(CONTACTS_SNAPSHOT_KEY).await?;
        self.session.sign_out().await?;
        Ok(())
    }

    /// The app came to the foreground
    pub async fn on_resume(&self) -> Result<ReconcileOutcome, SyncError> {
        self.reconciler.reconcile().await
    }

    pub fn reconciler(&self) -> &Arc<ContactReconciler> {
        &self.reconciler
    }

    /// Create the pager for a feed view that is about to appear. A view that
    /// was already open is closed first.
    pub fn open_feed(&self) -> Result<Arc<FeedPager>, SchedulerError> {
        self.close_feed();

        let pager = Arc::new(
            FeedPager::new(self.store.clone(), self.cache.clone(), self.session.clone())
                .with_page_size(self.settings.page_size)
                .with_remote_timeout(self.settings.remote_timeout())
                .with_snapshot_max_age(self.settings.snapshot_max_age()),
        );
        pager.register_auto_refresh(
            self.scheduler.as_ref(),
            self.settings.auto_refresh_interval(),
        )?;

        *self.feed.lock().unwrap_or_else(PoisonError::into_inner) = Some(pager.clone());
        Ok(pager)
    }

    /// The feed view went away
    pub fn close_feed(&self) {
        let pager = self.feed.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pager) = pager {
            pager.unmount();
            self.scheduler.cancel(AUTO_REFRESH_TASK_ID);
        }
    }

    pub fn feed(&self) -> Option<Arc<FeedPager>> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Publish a post and show it at the top of the open feed
    pub async fn publish(&self, body: PostBody) -> Result<Post, SyncError> {
        let post = PostPublisher::new(self.store.clone(), self.session.clone())
            .with_remote_timeout(self.settings.remote_timeout())
            .publish(body)
            .await?;

        if let Some(pager) = self.feed() {
            pager.show_published(post.clone());
        }
        Ok(post)
    }

    /// Background sync is best effort; `on_resume` still reconciles without it
    fn schedule_reconcile(&self) {
        if let Err(e) = self
            .reconciler
            .register(self.scheduler.as_ref(), self.settings.reconcile_interval())
        {
            warn!("could not schedule contact sync: {}", e);
        }
    }
}
