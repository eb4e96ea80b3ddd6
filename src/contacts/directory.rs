// SPDX-License-Identifier: MPL-2.0

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("contact access was refused")]
    PermissionDenied,
    #[error("address book unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// One address-book entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactRecord {
    pub display_name: Option<String>,
    /// Numbers exactly as stored on the device
    pub phone_numbers: Vec<String>,
}

impl ContactRecord {
    pub fn with_numbers<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            display_name: None,
            phone_numbers: numbers.into_iter().map(Into::into).collect(),
        }
    }
}

/// The device address book
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Ask for read access. May prompt the user.
    async fn request_permission(&self) -> Permission;

    async fn list_contacts(&self) -> Result<Vec<ContactRecord>, DirectoryError>;
}

/// Fixed address book that always grants access, for tests and headless
/// embedders
#[derive(Debug, Default)]
pub struct StaticDirectory {
    contacts: Vec<ContactRecord>,
}

impl StaticDirectory {
    pub fn new(contacts: Vec<ContactRecord>) -> Self {
        Self { contacts }
    }
}

#[async_trait]
impl ContactDirectory for StaticDirectory {
    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn list_contacts(&self) -> Result<Vec<ContactRecord>, DirectoryError> {
        Ok(self.contacts.clone())
    }
}
