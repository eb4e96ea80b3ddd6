// SPDX-License-Identifier: MPL-2.0

//! Contact-scoped feed synchronization.
//!
//! [`ContactReconciler`] keeps the backend copy of a user's address book a
//! superset of the device contacts. [`FeedPager`] pages through posts written
//! by those contacts (and the user), falling back to the last saved page when
//! the backend cannot be reached. The two never talk directly; the pager reads
//! whatever contact set the backend holds at the start of each fetch.

pub mod cache;
pub mod config;
pub mod contacts;
pub mod engine;
pub mod error;
pub mod feed;
pub mod format;
pub mod logging;
pub mod remote;
pub mod runtime;
pub mod scheduler;
pub mod state;

pub use contacts::{ContactReconciler, ReconcileOutcome};
pub use engine::SyncEngine;
pub use error::SyncError;
pub use feed::{FeedNotice, FeedPager, FetchOutcome, PagerState, Post, PostBody, PostPublisher};
pub use state::{Session, SessionManager};
