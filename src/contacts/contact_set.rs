// SPDX-License-Identifier: MPL-2.0

use crate::format::{normalize_phone, suffix_set};
use crate::remote::{Document, Fields, to_fields};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

const OWNER_ID_FIELD: &str = "ownerId";
const PHONE_NUMBERS_FIELD: &str = "phoneNumbers";

/// The numbers a user is connected to. Grows by union only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSet {
    pub owner_id: String,
    /// Normalized numbers, kept sorted so serialization is deterministic
    #[serde(default)]
    pub phone_numbers: BTreeSet<String>,
}

impl ContactSet {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            phone_numbers: BTreeSet::new(),
        }
    }

    /// Build from raw numbers: whitespace stripped, empties dropped,
    /// duplicates collapsed
    pub fn from_raw<I, S>(owner_id: impl Into<String>, numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phone_numbers = numbers
            .into_iter()
            .map(|n| normalize_phone(n.as_ref()))
            .filter(|n| !n.is_empty())
            .collect();
        Self {
            owner_id: owner_id.into(),
            phone_numbers,
        }
    }

    /// Decode the backend document. Non-string entries are skipped.
    pub fn from_fields(owner_id: &str, fields: &Fields) -> Self {
        let phone_numbers = fields
            .get(PHONE_NUMBERS_FIELD)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .map(normalize_phone)
                    .filter(|n| !n.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            owner_id: owner_id.to_string(),
            phone_numbers,
        }
    }

    pub fn from_document(doc: &Document) -> Self {
        Self::from_fields(&doc.id, &doc.fields)
    }

    pub fn to_fields(&self) -> Result<Fields, serde_json::Error> {
        to_fields(self)
    }

    /// Add this set's numbers to a stored contact-set document. Everything
    /// already in the document stays, including fields and entries this
    /// type does not read. Returns how many numbers were new.
    pub fn merge_into(&self, fields: &mut Fields) -> usize {
        fields
            .entry(OWNER_ID_FIELD)
            .or_insert_with(|| Value::from(self.owner_id.as_str()));

        let entries = fields
            .entry(PHONE_NUMBERS_FIELD)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entries.is_array() {
            *entries = Value::Array(Vec::new());
        }
        let Value::Array(entries) = entries else {
            return 0;
        };

        let known: HashSet<String> = entries
            .iter()
            .filter_map(Value::as_str)
            .map(normalize_phone)
            .collect();
        let added: Vec<Value> = self
            .phone_numbers
            .iter()
            .filter(|n| !known.contains(n.as_str()))
            .map(|n| Value::from(n.as_str()))
            .collect();
        let count = added.len();
        entries.extend(added);
        count
    }

    pub fn len(&self) -> usize {
        self.phone_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phone_numbers.is_empty()
    }

    /// Nine-digit suffixes used to match post authors
    pub fn suffixes(&self) -> HashSet<String> {
        suffix_set(&self.phone_numbers)
    }
}
