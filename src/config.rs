// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

pub const APP_ID: &str = "io.github.sethcottle.ContactFeed";
pub const APP_NAME: &str = "Contact Feed";

/// Backend collection holding one contact set per user, keyed by owner id
pub const CONTACT_SETS_COLLECTION: &str = "contact_sets";
/// Backend collection holding posts
pub const POSTS_COLLECTION: &str = "posts";

// Local cache keys. Each one is owned by exactly one component.
pub const CONTACTS_SNAPSHOT_KEY: &str = "contacts_snapshot";
pub const FEED_SNAPSHOT_KEY: &str = "feed_snapshot";
pub const SESSION_KEY: &str = "session";

/// Scheduler task ids
pub const RECONCILE_TASK_ID: &str = "contact-reconcile";
pub const AUTO_REFRESH_TASK_ID: &str = "feed-auto-refresh";

pub const DEFAULT_PAGE_SIZE: usize = 15;
pub const MAX_PAGE_SIZE: usize = 100;

/// Largest value list a single `In` filter may carry
pub const MAX_IN_VALUES: usize = 30;

/// Number of trailing digits used to match phone numbers across country codes
pub const PHONE_SUFFIX_LEN: usize = 9;

pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const AUTO_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(20);
pub const SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
