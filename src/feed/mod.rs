// SPDX-License-Identifier: MPL-2.0

mod merge;
mod pager;
mod post;
mod publish;
mod reactions;
mod scope;

pub use merge::{append_page, dedup_by_id, merge_branches};
pub use pager::{FeedNotice, FeedPager, FetchOutcome, PagerState};
pub use post::{FIELD_CREATED_AT, FIELD_CREATOR_ID, FIELD_CREATOR_LAST_NINE, Post, PostBody, PostRecord};
pub use publish::PostPublisher;
pub use reactions::{Reaction, ReactionState};
pub use scope::{FeedScope, FetchedPage, fetch_page};
