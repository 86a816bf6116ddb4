//! scoring::feed
//!
//! Live score feed: push delivery of one participant's scores.
//!
//! # Delivery model
//!
//! A subscription delivers the participant's full, post-ordered score
//! list immediately, then again whenever a score in that set is created
//! or amended. Delivery is at-least-once and an unchanged snapshot may
//! repeat; consumers replace their local view with each delivery rather
//! than applying diffs.
//!
//! # Cancellation
//!
//! The handle returned by [`ScoreSubscription::cancel_handle`] stops
//! further deliveries; it is safe to call from anywhere, multiple times.
//!
//! # Example
//!
//! ```ignore
//! let feed = ScoreFeed::new(store);
//! let mut sub = feed.subscribe(&trial_id, &participant_id).await?;
//! let unsubscribe = sub.cancel_handle();
//!
//! while let Some(scores) = sub.recv().await {
//!     render(&scores);
//! }
//! unsubscribe.cancel();
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::core::model::{collections, Score};
use crate::core::types::{ParticipantId, TrialId};
use crate::store::{CancelHandle, DocumentStore, Filter, OrderBy, StoreError, Subscription};

/// Errors from the score feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Subscribes consumers to score changes.
///
/// Reads the same records the [`crate::scoring::ScoringLedger`] writes;
/// there is no coupling beyond the storage representation.
pub struct ScoreFeed {
    store: Arc<dyn DocumentStore>,
}

impl ScoreFeed {
    /// Create a feed over `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Subscribe to one participant's scores within a trial.
    pub async fn subscribe(
        &self,
        trial_id: &TrialId,
        participant_id: &ParticipantId,
    ) -> Result<ScoreSubscription, FeedError> {
        let inner = self
            .store
            .subscribe(
                collections::SCORES,
                Filter::new()
                    .field_eq("trial_id", trial_id.as_str())
                    .field_eq("participant_id", participant_id.as_str()),
                OrderBy::asc("post_number"),
            )
            .await?;
        Ok(ScoreSubscription { inner })
    }
}

/// A live subscription to one participant's scores.
#[derive(Debug)]
pub struct ScoreSubscription {
    inner: Subscription,
}

impl ScoreSubscription {
    /// Wait for the next snapshot. Returns `None` once cancelled and
    /// drained.
    ///
    /// Malformed score documents are skipped (and logged) rather than
    /// poisoning the feed.
    pub async fn recv(&mut self) -> Option<Vec<Score>> {
        let docs = self.inner.recv().await?;
        let scores = docs
            .iter()
            .filter_map(|doc| match doc.to_type::<Score>() {
                Ok(score) => Some(score),
                Err(err) => {
                    warn!(doc = %doc.id, error = %err, "skipping malformed score document");
                    None
                }
            })
            .collect();
        Some(scores)
    }

    /// A clonable, idempotent unsubscribe handle.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.inner.cancel_handle()
    }

    /// Cancel in place.
    pub fn cancel(&self) {
        self.inner.cancel();
    }
}
