// SPDX-License-Identifier: MPL-2.0

use crate::cache::{CacheError, LocalCache};
use crate::config::SESSION_KEY;
use crate::format::normalize_phone;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no signed-in user")]
    NotSignedIn,
    #[error("invalid session data: {0}")]
    InvalidData(String),
    #[error("session storage failed: {0}")]
    Cache(#[from] CacheError),
}

/// The signed-in user as seen by the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    /// The user's own number, whitespace stripped
    pub phone_number: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, phone_number: &str) -> Self {
        Self {
            user_id: user_id.into(),
            phone_number: normalize_phone(phone_number),
        }
    }
}

/// Holds the current session and persists it in the local cache.
pub struct SessionManager {
    cache: Arc<dyn LocalCache>,
    current: RwLock<Option<Session>>,
}

impl SessionManager {
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self {
            cache,
            current: RwLock::new(None),
        }
    }

    pub async fn sign_in(&self, session: Session) -> Result<(), SessionError> {
        if session.user_id.is_empty() {
            return Err(SessionError::InvalidData("empty user id".to_string()));
        }

        let json = serde_json::to_string(&session)
            .map_err(|e| SessionError::InvalidData(e.to_string()))?;
        self.cache.set(SESSION_KEY, &json).await?;

        info!(user_id = %session.user_id, "signed in");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    /// Load a previously stored session into memory
    pub async fn restore(&self) -> Result<Option<Session>, SessionError> {
        let Some(json) = self.cache.get(SESSION_KEY).await? else {
            return Ok(None);
        };

        let session = match serde_json::from_str::<Session>(&json) {
            Ok(session) => session,
            Err(e) => {
                warn!("discarding unreadable stored session: {}", e);
                self.cache.remove(SESSION_KEY).await?;
                return Ok(None);
            }
        };

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(Some(session))
    }

    pub fn current(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current session, or `NotSignedIn`
    pub fn require(&self) -> Result<Session, SessionError> {
        self.current().ok_or(SessionError::NotSignedIn)
    }

    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.cache.remove(SESSION_KEY).await?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
