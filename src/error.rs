// SPDX-License-Identifier: MPL-2.0

use crate::cache::CacheError;
use crate::contacts::DirectoryError;
use crate::remote::RemoteError;
use crate::state::SessionError;
use thiserror::Error;

/// Failures surfaced by the reconciler and the feed pager.
///
/// An empty contact list or an empty feed is not represented here: both are
/// valid terminal states.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("contact access was refused")]
    PermissionDenied,
    #[error("no signed-in user")]
    Unauthenticated,
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("local cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl SyncError {
    /// Whether a later attempt (next scheduler tick, user retry) may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_) | Self::Cache(_))
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthenticated => Self::Unauthenticated,
            RemoteError::Serialization(e) => Self::InvalidData(e.to_string()),
            other => Self::RemoteUnavailable(other.to_string()),
        }
    }
}

impl From<DirectoryError> for SyncError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::PermissionDenied => Self::PermissionDenied,
            DirectoryError::Unavailable(msg) => Self::RemoteUnavailable(msg),
        }
    }
}

impl From<SessionError> for SyncError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotSignedIn => Self::Unauthenticated,
            SessionError::InvalidData(msg) => Self::InvalidData(msg),
            SessionError::Cache(e) => Self::Cache(e),
        }
    }
}
