// SPDX-License-Identifier: MPL-2.0

//! Identity matching and display formatting shared by the reconciler and the feed.
//!
//! Two phone numbers identify the same person when their last nine digits
//! agree. This tolerates the same number being stored with and without a
//! country code or trunk prefix.

use crate::config::PHONE_SUFFIX_LEN;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Strip all whitespace from a phone number as entered in the address book
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Last nine digits of a phone number, ignoring any non-digit characters.
/// Shorter numbers yield all of their digits.
pub fn last_nine_digits(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    let start = digits.len().saturating_sub(PHONE_SUFFIX_LEN);
    digits[start..].iter().collect()
}

/// Suffix set for a collection of numbers, with empty suffixes dropped
pub fn suffix_set<'a, I>(numbers: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    numbers
        .into_iter()
        .map(|n| last_nine_digits(n))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Whether a post author is visible to the viewer: the viewer wrote it, or
/// the author's suffix matches one of the viewer's contact suffixes.
pub fn is_in_scope(
    creator_id: &str,
    creator_last_nine: &str,
    viewer_id: &str,
    contact_suffixes: &HashSet<String>,
) -> bool {
    creator_id == viewer_id || contact_suffixes.contains(creator_last_nine)
}

/// Short relative time for feed rows
pub fn format_relative(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(created_at);

    if duration.num_seconds() < 60 {
        "now".to_string()
    } else if duration.num_minutes() < 60 {
        format!("{}m", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d", duration.num_days())
    } else {
        created_at.format("%b %d").to_string()
    }
}

/// Compact reaction count; zero renders as nothing
pub fn format_count(count: u32) -> String {
    match count {
        c if c >= 1_000_000 => format!("{:.1}M", f64::from(c) / 1_000_000.0),
        c if c >= 1_000 => format!("{:.1}K", f64::from(c) / 1_000.0),
        c if c > 0 => c.to_string(),
        _ => String::new(),
    }
}
