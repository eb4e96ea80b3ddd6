// SPDX-License-Identifier: MPL-2.0

use crate::cache::{FeedSnapshotCache, LocalCache};
use crate::config::{
    AUTO_REFRESH_TASK_ID, DEFAULT_PAGE_SIZE, DEFAULT_REMOTE_TIMEOUT, MAX_PAGE_SIZE, SNAPSHOT_MAX_AGE,
};
use crate::error::SyncError;
use crate::feed::merge::{append_page, dedup_by_id};
use crate::feed::scope::{FeedScope, FetchedPage, fetch_page};
use crate::feed::Post;
use crate::remote::{PageCursor, RemoteStore, with_timeout};
use crate::scheduler::{BackgroundScheduler, SchedulerError, TaskCallback, TaskResult};
use crate::state::SessionManager;
use futures::FutureExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of one mounted feed view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerState {
    Idle,
    /// First load after mount; the view shows a full-screen spinner
    Loading,
    /// User-triggered reload of the first page
    Refreshing,
    LoadingMore,
    /// The last fetch returned less than a full page
    Exhausted,
    /// The first page could not be loaded
    Error,
}

/// Non-blocking message for the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedNotice {
    /// The remote failed and the saved feed is shown instead
    ShowingSaved { reason: String },
    /// The remote failed and nothing was saved; offer a retry
    RetryAvailable { reason: String },
    LoadMoreFailed { reason: String },
    BackgroundRefreshFailed { reason: String },
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// The page was applied to the list
    Loaded { count: usize, exhausted: bool },
    /// Another fetch is running, the view is gone, or nothing is left to load
    Skipped,
    /// The view was unmounted while the fetch was in flight
    Discarded,
    /// The remote failed and the saved snapshot is shown
    ServedSnapshot(SyncError),
    Failed(SyncError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    Initial,
    Refresh,
    More,
    Background,
}

impl FetchMode {
    fn is_first_page(self) -> bool {
        !matches!(self, Self::More)
    }
}

struct PagerInner {
    state: PagerState,
    in_flight: Option<FetchMode>,
    posts: Vec<Post>,
    cursor: Option<PageCursor>,
    notice: Option<FeedNotice>,
    epoch: u64,
    mounted: bool,
}

/// Paginated, contact-scoped feed for one mounted view.
///
/// At most one fetch runs at a time. Triggers that arrive while a fetch is
/// in flight are dropped, not queued.
pub struct FeedPager {
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn LocalCache>,
    session: Arc<SessionManager>,
    page_size: usize,
    remote_timeout: Duration,
    /// Saved pages older than this are not shown as a fallback
    snapshot_max_age: Duration,
    inner: Mutex<PagerInner>,
}

impl FeedPager {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<dyn LocalCache>,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            store,
            cache,
            session,
            page_size: DEFAULT_PAGE_SIZE,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            snapshot_max_age: SNAPSHOT_MAX_AGE,
            inner: Mutex::new(PagerInner {
                state: PagerState::Idle,
                in_flight: None,
                posts: Vec::new(),
                cursor: None,
                notice: None,
                epoch: 0,
                mounted: true,
            }),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_snapshot_max_age(mut self, max_age: Duration) -> Self {
        self.snapshot_max_age = max_age;
        self
    }

    fn lock(&self) -> MutexGuard<'_, PagerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Edit the on-screen copy of a post. `None` if it is not in the list.
    pub(super) fn with_post_mut<R>(&self, post_id: &str, f: impl FnOnce(&mut Post) -> R) -> Option<R> {
        let mut inner = self.lock();
        inner.posts.iter_mut().find(|p| p.id == post_id).map(f)
    }

    pub(super) fn session(&self) -> &SessionManager {
        &self.session
    }

    pub(super) fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    pub(super) fn remote_timeout(&self) -> Duration {
        self.remote_timeout
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn state(&self) -> PagerState {
        self.lock().state
    }

    pub fn posts(&self) -> Vec<Post> {
        self.lock().posts.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().posts.is_empty()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    pub fn notice(&self) -> Option<FeedNotice> {
        self.lock().notice.clone()
    }

    pub fn dismiss_notice(&self) {
        self.lock().notice = None;
    }

    /// First load when the view appears
    pub async fn mount(&self) -> FetchOutcome {
        self.fetch_page(None, false).await
    }

    /// Pull-to-refresh
    pub async fn refresh(&self) -> FetchOutcome {
        self.fetch_page(None, true).await
    }

    /// Next page after the current cursor. No-op once exhausted.
    pub async fn load_more(&self) -> FetchOutcome {
        let cursor = self.lock().cursor.clone();
        match cursor {
            Some(cursor) => self.fetch_page(Some(cursor), false).await,
            None => FetchOutcome::Skipped,
        }
    }

    /// Timer-driven reload. Keeps the current list on screen while it runs
    /// and never swaps to the saved snapshot on failure.
    pub async fn auto_refresh(&self) -> FetchOutcome {
        self.run(FetchMode::Background, None).await
    }

    /// Fetch a page. A refresh, or a fetch without cursor, loads the first
    /// page and replaces the list; otherwise the page after `cursor` is
    /// appended.
    pub async fn fetch_page(&self, cursor: Option<PageCursor>, is_refresh: bool) -> FetchOutcome {
        let mode = match (is_refresh, &cursor) {
            (true, _) => FetchMode::Refresh,
            (false, None) => FetchMode::Initial,
            (false, Some(_)) => FetchMode::More,
        };
        let cursor = if mode == FetchMode::More { cursor } else { None };
        self.run(mode, cursor).await
    }

    /// The view is gone. Results of in-flight fetches are dropped.
    pub fn unmount(&self) {
        let mut inner = self.lock();
        inner.mounted = false;
        inner.epoch += 1;
        inner.in_flight = None;
        inner.cursor = None;
        debug!("feed view unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.lock().mounted
    }

    /// Show a post the viewer just published at the top of the list
    pub fn show_published(&self, post: Post) {
        let mut inner = self.lock();
        let mut posts = Vec::with_capacity(inner.posts.len() + 1);
        posts.push(post);
        posts.append(&mut inner.posts);
        inner.posts = dedup_by_id(posts);
    }

    /// Callback for the in-view refresh timer. Holds the pager weakly, so a
    /// dropped view stops refreshing.
    pub fn auto_refresh_task(self: &Arc<Self>) -> TaskCallback {
        let pager = Arc::downgrade(self);
        Arc::new(move || {
            let pager = pager.clone();
            async move {
                let Some(pager) = pager.upgrade() else {
                    return TaskResult::NoData;
                };
                match pager.auto_refresh().await {
                    FetchOutcome::Loaded { .. } => TaskResult::NewData,
                    FetchOutcome::Skipped | FetchOutcome::Discarded => TaskResult::NoData,
                    FetchOutcome::ServedSnapshot(_) | FetchOutcome::Failed(_) => {
                        TaskResult::Failed
                    }
                }
            }
            .boxed()
        })
    }

    pub fn register_auto_refresh(
        self: &Arc<Self>,
        scheduler: &dyn BackgroundScheduler,
        interval: Duration,
    ) -> Result<(), SchedulerError> {
        scheduler.register(AUTO_REFRESH_TASK_ID, interval, self.auto_refresh_task())
    }

    async fn run(&self, mode: FetchMode, cursor: Option<PageCursor>) -> FetchOutcome {
        let Some(epoch) = self.begin(mode) else {
            debug!(?mode, "feed fetch skipped");
            return FetchOutcome::Skipped;
        };

        let result = self.fetch_remote(cursor.as_ref()).await;

        match result {
            Ok((owner_id, page)) => self.apply_page(mode, epoch, &owner_id, page).await,
            Err(err) => self.apply_failure(mode, epoch, err).await,
        }
    }

    /// Claim the pager for one fetch. Returns the epoch the result must match.
    fn begin(&self, mode: FetchMode) -> Option<u64> {
        let mut inner = self.lock();
        if !inner.mounted || inner.in_flight.is_some() {
            return None;
        }
        if mode == FetchMode::More && inner.state == PagerState::Exhausted {
            return None;
        }

        inner.in_flight = Some(mode);
        match mode {
            FetchMode::Initial => inner.state = PagerState::Loading,
            FetchMode::Refresh => inner.state = PagerState::Refreshing,
            FetchMode::More => inner.state = PagerState::LoadingMore,
            FetchMode::Background => {}
        }
        Some(inner.epoch)
    }

    async fn fetch_remote(
        &self,
        cursor: Option<&PageCursor>,
    ) -> Result<(String, FetchedPage), SyncError> {
        let session = self.session.require()?;
        let store = self.store.as_ref();

        let scope = with_timeout(
            self.remote_timeout,
            FeedScope::resolve(store, &session.user_id),
        )
        .await?;
        let page = with_timeout(
            self.remote_timeout,
            fetch_page(store, &scope, self.page_size, cursor),
        )
        .await?;

        Ok((session.user_id, page))
    }

    async fn apply_page(
        &self,
        mode: FetchMode,
        epoch: u64,
        owner_id: &str,
        page: FetchedPage,
    ) -> FetchOutcome {
        let (count, snapshot) = {
            let mut inner = self.lock();
            if !inner.mounted || inner.epoch != epoch {
                return FetchOutcome::Discarded;
            }

            inner.in_flight = None;
            inner.posts = if mode.is_first_page() {
                dedup_by_id(page.posts)
            } else {
                append_page(&inner.posts, page.posts)
            };
            inner.cursor = page.next_cursor;
            inner.state = if page.exhausted {
                PagerState::Exhausted
            } else {
                PagerState::Idle
            };
            inner.notice = None;

            (inner.posts.len(), mode.is_first_page().then(|| inner.posts.clone()))
        };

        info!(?mode, count, exhausted = page.exhausted, "feed page applied");

        if let Some(posts) = snapshot
            && let Err(e) = FeedSnapshotCache::new(self.cache.as_ref())
                .store(owner_id, &posts)
                .await
        {
            warn!("failed to save feed snapshot: {}", e);
        }

        FetchOutcome::Loaded {
            count,
            exhausted: page.exhausted,
        }
    }

    async fn apply_failure(&self, mode: FetchMode, epoch: u64, err: SyncError) -> FetchOutcome {
        warn!(?mode, error = %err, "feed fetch failed");

        // Only an explicit first-page load may swap to the saved feed
        let snapshot = match mode {
            FetchMode::Initial | FetchMode::Refresh => self.load_snapshot().await,
            FetchMode::More | FetchMode::Background => None,
        };

        let mut inner = self.lock();
        if !inner.mounted || inner.epoch != epoch {
            return FetchOutcome::Discarded;
        }
        inner.in_flight = None;
        let reason = err.to_string();

        match mode {
            FetchMode::Initial | FetchMode::Refresh => {
                inner.state = PagerState::Error;
                inner.cursor = None;
                match snapshot {
                    Some(posts) => {
                        info!(count = posts.len(), "showing saved feed");
                        inner.posts = posts;
                        inner.notice = Some(FeedNotice::ShowingSaved { reason });
                        FetchOutcome::ServedSnapshot(err)
                    }
                    None => {
                        inner.notice = Some(FeedNotice::RetryAvailable { reason });
                        FetchOutcome::Failed(err)
                    }
                }
            }
            FetchMode::More => {
                inner.state = PagerState::Idle;
                inner.notice = Some(FeedNotice::LoadMoreFailed { reason });
                FetchOutcome::Failed(err)
            }
            FetchMode::Background => {
                inner.notice = Some(FeedNotice::BackgroundRefreshFailed { reason });
                FetchOutcome::Failed(err)
            }
        }
    }

    async fn load_snapshot(&self) -> Option<Vec<Post>> {
        let owner = self.session.current()?;
        match FeedSnapshotCache::new(self.cache.as_ref())
            .load_fresh(&owner.user_id, self.snapshot_max_age)
            .await
        {
            Ok(snapshot) => snapshot.map(|s| s.posts),
            Err(e) => {
                warn!("failed to read feed snapshot: {}", e);
                None
            }
        }
    }
}
