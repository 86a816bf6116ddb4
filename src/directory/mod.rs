//! directory
//!
//! Identity resolution: mapping an email address to a user account.
//!
//! # Design
//!
//! Invitation acceptance needs to turn the invited email into a judge's
//! account identifier before the trial linkage can happen. The
//! [`UserDirectory`] trait is that seam; production resolves against the
//! `users` collection, tests inject a [`MockDirectory`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::model::collections;
use crate::core::types::{EmailAddress, UserId};
use crate::store::{DocumentStore, Filter, OrderBy, StoreError};

/// Errors from identity resolution.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The backing store failed.
    #[error("directory lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Resolves email addresses to user accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find the account registered under `email`, if any.
    async fn find_user_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<UserId>, DirectoryError>;
}

/// Directory backed by the `users` collection of the document store.
pub struct StoreDirectory {
    store: Arc<dyn DocumentStore>,
}

impl StoreDirectory {
    /// Create a directory over `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UserDirectory for StoreDirectory {
    async fn find_user_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<UserId>, DirectoryError> {
        let docs = self
            .store
            .query(
                collections::USERS,
                Filter::new().field_eq("email", email.as_str()),
                OrderBy::asc("email"),
            )
            .await?;
        Ok(docs
            .first()
            .map(|doc| UserId::new(doc.id.clone()))
            .transpose()
            .map_err(|_| StoreError::Serialize("user document has empty id".to_string()))?)
    }
}

/// Mock directory for deterministic testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone, Default)]
pub struct MockDirectory {
    users: Arc<Mutex<HashMap<EmailAddress, UserId>>>,
}

impl MockDirectory {
    /// Create an empty mock directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `email` as belonging to `user`.
    pub fn insert(&self, email: EmailAddress, user: UserId) {
        self.users.lock().unwrap().insert(email, user);
    }
}

#[async_trait]
impl UserDirectory for MockDirectory {
    async fn find_user_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<UserId>, DirectoryError> {
        Ok(self.users.lock().unwrap().get(email).cloned())
    }
}
