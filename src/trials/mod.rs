//! trials
//!
//! Trial registry: creating trials and reading them back.
//!
//! # Design
//!
//! Administrators create trials with a name, a calendar date, and a post
//! count; the registry initializes the judge set and post-assignment map
//! empty. Trials are never deleted. Status (upcoming / active /
//! completed) is derived from the date at read time, never stored - see
//! [`crate::core::model::TrialStatus`].

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::core::model::{collections, Trial};
use crate::core::types::{TrialId, UserId};
use crate::store::{DocumentStore, Filter, OrderBy, StoreError};

/// Errors from trial registry operations.
#[derive(Debug, Error)]
pub enum TrialError {
    /// The trial name was empty (after trimming).
    #[error("trial name cannot be empty")]
    EmptyName,

    /// The post count was below 1.
    #[error("post count must be at least 1, got {0}")]
    InvalidPostCount(u32),

    /// No trial with this identifier exists.
    #[error("trial not found: {0}")]
    NotFound(TrialId),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates trials and serves reads over them.
pub struct TrialRegistry {
    store: Arc<dyn DocumentStore>,
}

impl TrialRegistry {
    /// Create a registry over `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create a trial. Validation happens before any write.
    ///
    /// # Errors
    ///
    /// Returns `TrialError::EmptyName` or `TrialError::InvalidPostCount`
    /// on malformed input; nothing is written in that case.
    pub async fn create_trial(
        &self,
        name: &str,
        date: NaiveDate,
        post_count: u32,
        created_by: &UserId,
    ) -> Result<TrialId, TrialError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrialError::EmptyName);
        }
        if post_count < 1 {
            return Err(TrialError::InvalidPostCount(post_count));
        }

        let id = self
            .store
            .create(
                collections::TRIALS,
                json!({
                    "name": name,
                    "date": date,
                    "post_count": post_count,
                    "created_by": created_by,
                    "judges": [],
                    "post_assignments": {},
                }),
            )
            .await?;
        debug!(trial = %id, %name, "created trial");
        Ok(TrialId::new(id)
            .map_err(|_| StoreError::Serialize("store returned an empty id".to_string()))?)
    }

    /// Fetch a trial by id.
    pub async fn get_trial(&self, id: &TrialId) -> Result<Trial, TrialError> {
        match self.store.get(collections::TRIALS, id.as_str()).await {
            Ok(doc) => Ok(doc.to_type::<Trial>()?),
            Err(StoreError::NotFound { .. }) => Err(TrialError::NotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    /// All trials, most recent date first.
    pub async fn list_trials(&self) -> Result<Vec<Trial>, TrialError> {
        let docs = self
            .store
            .query(collections::TRIALS, Filter::new(), OrderBy::desc("date"))
            .await?;
        docs.iter()
            .map(|doc| doc.to_type::<Trial>().map_err(TrialError::from))
            .collect()
    }
}
