// SPDX-License-Identifier: MPL-2.0

mod memory;
mod store;
mod types;

pub use memory::MemoryStore;
pub use store::{RemoteError, RemoteStore, TransactFn};
pub use types::{
    Direction, Document, FieldUpdate, Fields, Filter, OrderBy, PageCursor, Query, Timestamp,
    compare_values, to_fields,
};

use std::future::Future;
use std::time::Duration;

/// Bound a remote call. Running out of time is reported as
/// [`RemoteError::Timeout`], which callers treat like any other outage.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| RemoteError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let store = MemoryStore::new();
        store.set_latency(Some(Duration::from_secs(60)));

        let result = with_timeout(Duration::from_secs(5), store.get("posts", "x")).await;
        assert!(matches!(result, Err(RemoteError::Timeout)));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let store = MemoryStore::new();
        let result = with_timeout(Duration::from_secs(5), store.get("posts", "x")).await;
        assert!(result.unwrap().is_none());
    }
}
