// SPDX-License-Identifier: MPL-2.0

//! Shared async runtime for embedders that call in from synchronous code.
//!
//! OS background-task hooks and platform bridges invoke the engine from
//! threads that have no Tokio context. They share this single runtime
//! instead of building one per call.

use once_cell::sync::Lazy;
use std::future::Future;
use tokio::runtime::Runtime;

/// Two workers: the engine only waits on the backend and the cache.
static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("contact-feed-async")
        .build()
        .expect("failed to create async runtime")
});

/// Block the calling thread on `future`.
/// Panics if called from inside an async context.
pub fn block_on<F: Future>(future: F) -> F::Output {
    RUNTIME.block_on(future)
}

/// Handle for spawning the scheduler's long-lived tasks
pub fn handle() -> tokio::runtime::Handle {
    RUNTIME.handle().clone()
}
