//! scoring
//!
//! Scoring ledger: one score per (trial, participant, post) tuple.
//!
//! # Upsert semantics
//!
//! A submission is a create-or-amend keyed on the tuple's natural key.
//! Score documents use [`ScoreId::for_tuple`] as their identifier, so
//! every submission for the same tuple lands on one document and the
//! store's atomic upsert serializes concurrent writers: the second
//! submission amends, last write wins, duplicates cannot exist.
//!
//! Point values are range-checked at the type level
//! ([`crate::core::types::ScoreValue`] admits only 0..=20), so an
//! out-of-range submission fails before this module is ever reached and
//! produces no record.

pub mod feed;

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::core::config::RetryConfig;
use crate::core::model::{collections, Score, Trial};
use crate::core::retry::with_retry;
use crate::core::types::{ParticipantId, PostNumber, ScoreId, ScoreValue, TrialId, UserId};
use crate::store::{DocumentStore, Filter, OrderBy, StoreError};

/// Errors from scoring operations.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// The post number exceeds the trial's post count.
    #[error("post {post} is out of range, trial has {post_count} posts")]
    PostOutOfRange {
        /// The requested post.
        post: PostNumber,
        /// The trial's post count.
        post_count: u32,
    },

    /// No trial with this identifier exists.
    #[error("trial not found: {0}")]
    TrialNotFound(TrialId),

    /// No participant with this identifier exists.
    #[error("participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Records and amends scores.
pub struct ScoringLedger {
    store: Arc<dyn DocumentStore>,
    retry: RetryConfig,
}

impl ScoringLedger {
    /// Create a ledger over `store` with the given retry policy for
    /// transient store failures (the upsert is idempotent, so retrying
    /// is safe).
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Record `judge`'s score for one participant at one post, amending
    /// any existing record for the tuple.
    ///
    /// Returns the identifier of the (possibly amended) record.
    ///
    /// # Errors
    ///
    /// `TrialNotFound` / `ParticipantNotFound` for unknown references,
    /// `PostOutOfRange` if the post exceeds the trial's post count.
    /// Validation happens before any write.
    pub async fn submit_score(
        &self,
        trial_id: &TrialId,
        participant_id: &ParticipantId,
        post: PostNumber,
        judge: &UserId,
        value: ScoreValue,
    ) -> Result<ScoreId, ScoreError> {
        let trial = match self.store.get(collections::TRIALS, trial_id.as_str()).await {
            Ok(doc) => doc.to_type::<Trial>()?,
            Err(StoreError::NotFound { .. }) => {
                return Err(ScoreError::TrialNotFound(trial_id.clone()))
            }
            Err(err) => return Err(err.into()),
        };
        if post.get() > trial.post_count {
            return Err(ScoreError::PostOutOfRange {
                post,
                post_count: trial.post_count,
            });
        }
        match self
            .store
            .get(collections::PARTICIPANTS, participant_id.as_str())
            .await
        {
            Ok(_) => {}
            Err(StoreError::NotFound { .. }) => {
                return Err(ScoreError::ParticipantNotFound(participant_id.clone()))
            }
            Err(err) => return Err(err.into()),
        }

        let score_id = ScoreId::for_tuple(trial_id, participant_id, post);
        let init = json!({
            "trial_id": trial_id,
            "participant_id": participant_id,
            "post_number": post,
            "judge_id": judge,
            "value": value,
        });

        with_retry(&self.retry, || {
            let judge = judge.clone();
            self.store.upsert(
                collections::SCORES,
                score_id.as_str(),
                init.clone(),
                Box::new(move |fields| {
                    // Amend path: last write wins on value and judge.
                    fields["value"] = json!(value);
                    fields["judge_id"] = json!(judge);
                    Ok(())
                }),
            )
        })
        .await?;

        debug!(
            trial = %trial_id,
            participant = %participant_id,
            %post,
            %value,
            "recorded score"
        );
        Ok(score_id)
    }

    /// Scores for a trial, ordered by post number ascending, optionally
    /// restricted to one participant.
    pub async fn list_scores(
        &self,
        trial_id: &TrialId,
        participant_id: Option<&ParticipantId>,
    ) -> Result<Vec<Score>, ScoreError> {
        let mut filter = Filter::new().field_eq("trial_id", trial_id.as_str());
        if let Some(participant) = participant_id {
            filter = filter.field_eq("participant_id", participant.as_str());
        }
        let docs = self
            .store
            .query(collections::SCORES, filter, OrderBy::asc("post_number"))
            .await?;
        docs.iter()
            .map(|doc| doc.to_type::<Score>().map_err(ScoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participants::{NewParticipant, ParticipantRoster};
    use crate::store::MemoryStore;
    use crate::trials::TrialRegistry;
    use chrono::NaiveDate;
    use crate::core::types::{DogRegistration, EmailAddress, ParticipantNumber};

    struct Fixture {
        store: Arc<MemoryStore>,
        ledger: ScoringLedger,
        trial_id: TrialId,
        participant_id: ParticipantId,
    }

    fn judge(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn post(n: u32) -> PostNumber {
        PostNumber::new(n).unwrap()
    }

    fn value(n: i64) -> ScoreValue {
        ScoreValue::new(n).unwrap()
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let registry = TrialRegistry::new(Arc::clone(&store) as Arc<dyn DocumentStore>);
        let roster = ParticipantRoster::new(Arc::clone(&store) as Arc<dyn DocumentStore>);
        let trial_id = registry
            .create_trial(
                "Trial",
                NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
                2,
                &judge("admin-1"),
            )
            .await
            .unwrap();
        let participant_id = roster
            .register(NewParticipant {
                trial_id: trial_id.clone(),
                participant_number: ParticipantNumber::new("0001").unwrap(),
                dog_name: "Bella".into(),
                dog_registration: DogRegistration::new("Dk12345/2024").unwrap(),
                handler_name: "H. Handler".into(),
                email: EmailAddress::new("handler@example.dk").unwrap(),
            })
            .await
            .unwrap();
        let ledger = ScoringLedger::new(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            RetryConfig::no_retry(),
        );
        Fixture {
            store,
            ledger,
            trial_id,
            participant_id,
        }
    }

    #[tokio::test]
    async fn first_submission_creates_one_record() {
        let fx = fixture().await;
        let id = fx
            .ledger
            .submit_score(&fx.trial_id, &fx.participant_id, post(1), &judge("a"), value(15))
            .await
            .unwrap();

        let scores = fx.ledger.list_scores(&fx.trial_id, None).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].id, id);
        assert_eq!(scores[0].value, value(15));
        assert_eq!(fx.store.collection_len(collections::SCORES), 1);
    }

    #[tokio::test]
    async fn resubmission_amends_in_place() {
        let fx = fixture().await;
        let first = fx
            .ledger
            .submit_score(&fx.trial_id, &fx.participant_id, post(1), &judge("a"), value(15))
            .await
            .unwrap();
        let second = fx
            .ledger
            .submit_score(&fx.trial_id, &fx.participant_id, post(1), &judge("b"), value(17))
            .await
            .unwrap();
        assert_eq!(first, second);

        let scores = fx
            .ledger
            .list_scores(&fx.trial_id, Some(&fx.participant_id))
            .await
            .unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].value, value(17));
        assert_eq!(scores[0].judge_id, judge("b"));
    }

    #[tokio::test]
    async fn post_out_of_range_writes_nothing() {
        let fx = fixture().await;
        let err = fx
            .ledger
            .submit_score(&fx.trial_id, &fx.participant_id, post(3), &judge("a"), value(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ScoreError::PostOutOfRange { post_count: 2, .. }));
        assert_eq!(fx.store.collection_len(collections::SCORES), 0);
    }

    #[tokio::test]
    async fn unknown_trial_is_refused() {
        let fx = fixture().await;
        let ghost = TrialId::new("ghost").unwrap();
        let err = fx
            .ledger
            .submit_score(&ghost, &fx.participant_id, post(1), &judge("a"), value(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ScoreError::TrialNotFound(_)));
    }

    #[tokio::test]
    async fn unknown_participant_is_refused() {
        let fx = fixture().await;
        let ghost = ParticipantId::new("ghost").unwrap();
        let err = fx
            .ledger
            .submit_score(&fx.trial_id, &ghost, post(1), &judge("a"), value(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ScoreError::ParticipantNotFound(_)));
        assert_eq!(fx.store.collection_len(collections::SCORES), 0);
    }

    #[tokio::test]
    async fn list_orders_by_post_ascending() {
        let fx = fixture().await;
        fx.ledger
            .submit_score(&fx.trial_id, &fx.participant_id, post(2), &judge("b"), value(8))
            .await
            .unwrap();
        fx.ledger
            .submit_score(&fx.trial_id, &fx.participant_id, post(1), &judge("a"), value(12))
            .await
            .unwrap();

        let posts: Vec<u32> = fx
            .ledger
            .list_scores(&fx.trial_id, None)
            .await
            .unwrap()
            .iter()
            .map(|s| s.post_number.get())
            .collect();
        assert_eq!(posts, [1, 2]);
    }

    #[tokio::test]
    async fn transient_upsert_failure_is_retried_to_one_record() {
        use crate::store::memory::OpKind;

        let fx = fixture().await;
        let ledger = ScoringLedger::new(
            Arc::clone(&fx.store) as Arc<dyn DocumentStore>,
            RetryConfig {
                max_attempts: 3,
                base_delay_ms: 0,
            },
        );

        // Validation reads pass; the upsert itself fails once, then the
        // retry lands exactly one record.
        fx.store.inject_unavailable_on(OpKind::Upsert, 1);
        ledger
            .submit_score(&fx.trial_id, &fx.participant_id, post(1), &judge("a"), value(9))
            .await
            .unwrap();
        assert_eq!(fx.store.collection_len(collections::SCORES), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_store_error() {
        use crate::store::memory::OpKind;

        let fx = fixture().await;
        fx.store.inject_unavailable_on(OpKind::Upsert, 1);
        let err = fx
            .ledger
            .submit_score(&fx.trial_id, &fx.participant_id, post(1), &judge("a"), value(9))
            .await
            .unwrap_err();
        assert!(matches!(err, ScoreError::Store(StoreError::Unavailable(_))));
        assert_eq!(fx.store.collection_len(collections::SCORES), 0);
    }
}
