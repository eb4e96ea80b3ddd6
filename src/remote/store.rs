// SPDX-License-Identifier: MPL-2.0

use crate::remote::types::{Document, FieldUpdate, Fields, Query};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("network error: {0}")]
    Unavailable(String),
    #[error("request timed out")]
    Timeout,
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("invalid document: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Read-modify-write body of a transaction. Receives the current fields of
/// the document (if it exists) and returns the fields to write back.
/// The store may call it more than once when it retries on contention.
pub type TransactFn<'a> = dyn Fn(Option<&Fields>) -> Result<Fields, RemoteError> + Send + Sync + 'a;

/// Authenticated backend document store.
///
/// Documents live in named collections and are addressed by id. Every call
/// may fail with [`RemoteError::Unavailable`]; callers treat that, and
/// [`RemoteError::Timeout`], as recoverable.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, RemoteError>;

    /// Write a document. With `merge`, existing fields not present in
    /// `fields` are kept; otherwise the document is replaced.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> Result<(), RemoteError>;

    /// Apply field transforms to an existing document
    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: &[FieldUpdate],
    ) -> Result<(), RemoteError>;

    /// Insert a document under a generated id, stamping `timestamp_field`
    /// with the server clock
    async fn create(
        &self,
        collection: &str,
        fields: Fields,
        timestamp_field: &str,
    ) -> Result<Document, RemoteError>;

    /// Atomically read one document, compute its new fields, and write them.
    /// Returns the fields that were committed.
    async fn transact(
        &self,
        collection: &str,
        id: &str,
        apply: &TransactFn,
    ) -> Result<Fields, RemoteError>;
}
