//! assignments
//!
//! Post assignment: exclusive judge-to-post claims within a trial.
//!
//! # Exclusivity
//!
//! Within one trial, a judge holds at most one post and a post is held
//! by at most one judge. Claiming a new post moves the judge (the prior
//! claim is released in the same step); claiming a post held by someone
//! else fails with [`AssignmentError::PostTaken`].
//!
//! # Atomicity
//!
//! The claim is a single atomic read-modify-write of the trial document:
//! release of the prior post, the new mapping, and membership in the
//! judge set all commit together. Two judges racing for the same post
//! therefore resolve to exactly one success and one `PostTaken` - the
//! store serializes the two updates and the loser's closure sees the
//! winner's claim. A read followed by an unconditional write could let
//! both "win", which is why no such path exists here.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

use crate::core::config::RetryConfig;
use crate::core::model::{collections, Trial};
use crate::core::retry::with_retry;
use crate::core::types::{PostNumber, TrialId, UserId};
use crate::store::{DocumentStore, StoreError};

/// Errors from post assignment operations.
#[derive(Debug, Error)]
pub enum AssignmentError {
    /// The post number exceeds the trial's post count.
    #[error("post {post} is out of range, trial has {post_count} posts")]
    OutOfRange {
        /// The requested post.
        post: PostNumber,
        /// The trial's post count.
        post_count: u32,
    },

    /// Another judge already holds this post.
    #[error("post {post} is already taken")]
    PostTaken {
        /// The contested post.
        post: PostNumber,
    },

    /// No trial with this identifier exists.
    #[error("trial not found: {0}")]
    TrialNotFound(TrialId),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Assigns judges to judging posts.
pub struct PostAssignmentManager {
    store: Arc<dyn DocumentStore>,
    retry: RetryConfig,
}

impl PostAssignmentManager {
    /// Create a manager over `store` with the given retry policy for
    /// transient store failures (the claim is idempotent, so retrying is
    /// safe).
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Claim `post` for `judge` within the trial.
    ///
    /// Re-claiming a post the judge already holds is a no-op success.
    /// On success the judge is also a member of the trial's judge set;
    /// no observer can see the claim without the membership.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if the post exceeds the trial's post count,
    /// `PostTaken` if a different judge holds it, `TrialNotFound` for an
    /// unknown trial.
    pub async fn assign_post(
        &self,
        trial_id: &TrialId,
        judge: &UserId,
        post: PostNumber,
    ) -> Result<(), AssignmentError> {
        let refusal: Arc<Mutex<Option<AssignmentError>>> = Arc::new(Mutex::new(None));

        let result = with_retry(&self.retry, || {
            let slot = Arc::clone(&refusal);
            let judge = judge.clone();
            self.store.update(
                collections::TRIALS,
                trial_id.as_str(),
                Box::new(move |fields| {
                    let mut trial: Trial = serde_json::from_value(fields.clone())
                        .map_err(|e| StoreError::Serialize(e.to_string()))?;

                    if post.get() > trial.post_count {
                        *slot.lock().unwrap() = Some(AssignmentError::OutOfRange {
                            post,
                            post_count: trial.post_count,
                        });
                        return Err(StoreError::Aborted);
                    }
                    match trial.holder_of(post) {
                        Some(holder) if *holder != judge => {
                            *slot.lock().unwrap() = Some(AssignmentError::PostTaken { post });
                            return Err(StoreError::Aborted);
                        }
                        _ => {}
                    }

                    // One logical step: move the judge's claim and ensure
                    // membership in the judge set.
                    trial.post_assignments.insert(judge.clone(), post);
                    trial.judges.insert(judge.clone());
                    *fields = serde_json::to_value(&trial)
                        .map_err(|e| StoreError::Serialize(e.to_string()))?;
                    Ok(())
                }),
            )
        })
        .await;

        match result {
            Ok(_) => {
                debug!(trial = %trial_id, judge = %judge, %post, "assigned judge to post");
                Ok(())
            }
            Err(StoreError::Aborted) => {
                let refusal = refusal.lock().unwrap().take();
                Err(refusal.unwrap_or(AssignmentError::PostTaken { post }))
            }
            Err(StoreError::NotFound { .. }) => Err(AssignmentError::TrialNotFound(trial_id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    /// The post currently held by `judge` in the trial, if any.
    pub async fn current_assignment(
        &self,
        trial_id: &TrialId,
        judge: &UserId,
    ) -> Result<Option<PostNumber>, AssignmentError> {
        let doc = match self.store.get(collections::TRIALS, trial_id.as_str()).await {
            Ok(doc) => doc,
            Err(StoreError::NotFound { .. }) => {
                return Err(AssignmentError::TrialNotFound(trial_id.clone()))
            }
            Err(err) => return Err(err.into()),
        };
        let trial: Trial = doc.to_type()?;
        Ok(trial.assignment_of(judge))
    }
}
