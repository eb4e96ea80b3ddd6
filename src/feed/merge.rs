// SPDX-License-Identifier: MPL-2.0

use crate::feed::Post;
use crate::feed::post::FIELD_CREATED_AT;
use crate::remote::{Document, compare_values};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Keep one item per key. A repeated key keeps the slot of its first
/// appearance but takes the contents of its last copy, which is the freshest.
fn dedup_by_key<T>(items: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut merged: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        let slot = slots.get(key(&item)).copied();
        match slot {
            Some(slot) => merged[slot] = item,
            None => {
                slots.insert(key(&item).to_string(), merged.len());
                merged.push(item);
            }
        }
    }

    merged
}

/// Drop repeated post ids
pub fn dedup_by_id(posts: Vec<Post>) -> Vec<Post> {
    dedup_by_key(posts, |p| p.id.as_str())
}

/// Append a page to the list already on screen
pub fn append_page(existing: &[Post], page: Vec<Post>) -> Vec<Post> {
    let mut combined = Vec::with_capacity(existing.len() + page.len());
    combined.extend_from_slice(existing);
    combined.extend(page);
    dedup_by_id(combined)
}

/// Newest first, ids breaking ties. Matches the store's descending
/// `createdAt` order, so cursors taken from the merge resume correctly.
fn newest_first(a: &Document, b: &Document) -> Ordering {
    let null = Value::Null;
    let a_at = a.get(FIELD_CREATED_AT).unwrap_or(&null);
    let b_at = b.get(FIELD_CREATED_AT).unwrap_or(&null);
    compare_values(b_at, a_at).then_with(|| b.id.cmp(&a.id))
}

/// Merge the documents several queries returned for the same page
pub fn merge_branches(branches: Vec<Vec<Document>>) -> Vec<Document> {
    let mut merged = dedup_by_key(branches.into_iter().flatten().collect(), |d| d.id.as_str());
    merged.sort_by(newest_first);
    merged
}
