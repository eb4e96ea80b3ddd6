// SPDX-License-Identifier: MPL-2.0

mod contact_set;
mod directory;
mod reconciler;

pub use contact_set::ContactSet;
#[cfg(test)]
pub use directory::MockContactDirectory;
pub use directory::{ContactDirectory, ContactRecord, DirectoryError, Permission, StaticDirectory};
pub use reconciler::{ContactReconciler, ReconcileOutcome};
