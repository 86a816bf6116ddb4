//! invitations
//!
//! Invitation ledger: offering trials to judges and recording their
//! responses.
//!
//! # State machine
//!
//! An invitation starts `pending` and transitions exactly once, to
//! `accepted` or `declined`. A second response attempt against a
//! terminal invitation never rewrites the record: a matching retry
//! reports the existing outcome (and re-runs the idempotent trial
//! linkage, so accept retries converge), a mismatched one is a no-op.
//!
//! # Acceptance linkage
//!
//! Accepting links the judge into the trial's judge set. The judge's
//! account id is taken from the caller when supplied, otherwise resolved
//! from the invited email through [`UserDirectory`]. When neither works,
//! or the trial no longer exists, the invitation still becomes accepted
//! but the linkage is skipped and the degraded outcome is surfaced and
//! logged for operator follow-up - see [`ResponseOutcome::AcceptedUnlinked`].

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::model::{collections, Invitation, InvitationStatus, Trial};
use crate::core::types::{EmailAddress, InvitationId, TrialId, UserId};
use crate::directory::UserDirectory;
use crate::store::{DocumentStore, Filter, OrderBy, StoreError};

/// Errors from invitation ledger operations.
#[derive(Debug, Error)]
pub enum InvitationError {
    /// No invitation with this identifier exists.
    #[error("invitation not found: {0}")]
    NotFound(InvitationId),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A judge's answer to an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationDecision {
    Accept,
    Decline,
}

impl InvitationDecision {
    fn as_status(self) -> InvitationStatus {
        match self {
            InvitationDecision::Accept => InvitationStatus::Accepted,
            InvitationDecision::Decline => InvitationStatus::Declined,
        }
    }
}

/// Why an accepted invitation could not be linked into its trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkedReason {
    /// No account matches the invited email and the caller supplied none.
    UnresolvedEmail,
    /// The invitation references a trial that does not exist.
    TrialMissing,
}

impl std::fmt::Display for UnlinkedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnlinkedReason::UnresolvedEmail => write!(f, "no account matches the invited email"),
            UnlinkedReason::TrialMissing => write!(f, "the referenced trial does not exist"),
        }
    }
}

/// Result of [`InvitationLedger::respond`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Accepted and linked into the trial's judge set.
    Linked {
        /// The judge account that was linked.
        judge: UserId,
    },
    /// Accepted, but the trial linkage was skipped. Degraded, not fatal;
    /// flagged for operator follow-up.
    AcceptedUnlinked {
        /// Why the linkage was skipped.
        reason: UnlinkedReason,
    },
    /// Declined.
    Declined,
    /// The invitation was already terminal with a different status;
    /// nothing changed.
    AlreadyResponded {
        /// The status already on record.
        status: InvitationStatus,
    },
}

/// Tracks judge invitations per trial and applies responses.
pub struct InvitationLedger {
    store: Arc<dyn DocumentStore>,
    directory: Arc<dyn UserDirectory>,
}

impl InvitationLedger {
    /// Create a ledger over `store`, resolving identities via `directory`.
    pub fn new(store: Arc<dyn DocumentStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { store, directory }
    }

    /// Record an invitation for `judge_email` to judge `trial_id`.
    ///
    /// The ledger accepts duplicates; callers wanting to avoid them
    /// check [`InvitationLedger::has_open_invitation`] first. Not
    /// idempotent - do not auto-retry.
    pub async fn invite(
        &self,
        trial_id: &TrialId,
        judge_email: &EmailAddress,
        invited_by: &UserId,
    ) -> Result<InvitationId, InvitationError> {
        let id = self
            .store
            .create(
                collections::INVITATIONS,
                json!({
                    "trial_id": trial_id,
                    "judge_email": judge_email,
                    "invited_by": invited_by,
                    "status": InvitationStatus::Pending,
                    "responded_at": null,
                }),
            )
            .await?;
        debug!(invitation = %id, trial = %trial_id, email = %judge_email, "invited judge");
        Ok(InvitationId::new(id)
            .map_err(|_| StoreError::Serialize("store returned an empty id".to_string()))?)
    }

    /// All invitations, newest first, optionally restricted to one judge's
    /// email.
    pub async fn list_invitations(
        &self,
        judge_email: Option<&EmailAddress>,
    ) -> Result<Vec<Invitation>, InvitationError> {
        let mut filter = Filter::new();
        if let Some(email) = judge_email {
            filter = filter.field_eq("judge_email", email.as_str());
        }
        let docs = self
            .store
            .query(collections::INVITATIONS, filter, OrderBy::desc("created_at"))
            .await?;
        docs.iter()
            .map(|doc| doc.to_type::<Invitation>().map_err(InvitationError::from))
            .collect()
    }

    /// Whether a pending invitation already exists for this
    /// (trial, email) pair. The duplicate check callers run before
    /// [`InvitationLedger::invite`].
    pub async fn has_open_invitation(
        &self,
        trial_id: &TrialId,
        judge_email: &EmailAddress,
    ) -> Result<bool, InvitationError> {
        let docs = self
            .store
            .query(
                collections::INVITATIONS,
                Filter::new()
                    .field_eq("trial_id", trial_id.as_str())
                    .field_eq("judge_email", judge_email.as_str())
                    .field_eq("status", "pending"),
                OrderBy::desc("created_at"),
            )
            .await?;
        Ok(!docs.is_empty())
    }

    /// Apply a judge's response.
    ///
    /// On acceptance the judge is linked into the trial's judge set,
    /// preferring `responding_judge` over resolution by invited email.
    /// The linkage is an idempotent set union, so concurrent or repeated
    /// acceptances never produce duplicates.
    ///
    /// # Errors
    ///
    /// Returns `InvitationError::NotFound` for an unknown invitation.
    /// A failed linkage is not an error; see
    /// [`ResponseOutcome::AcceptedUnlinked`].
    pub async fn respond(
        &self,
        id: &InvitationId,
        decision: InvitationDecision,
        responding_judge: Option<&UserId>,
    ) -> Result<ResponseOutcome, InvitationError> {
        let seen: Arc<Mutex<Option<Invitation>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let responded_at = Utc::now();

        let result = self
            .store
            .update(
                collections::INVITATIONS,
                id.as_str(),
                Box::new(move |fields| {
                    let mut invitation: Invitation = serde_json::from_value(fields.clone())
                        .map_err(|e| StoreError::Serialize(e.to_string()))?;
                    if !invitation.status.is_pending() {
                        // Terminal already: abort so the record stays
                        // byte-for-byte untouched.
                        *slot.lock().unwrap() = Some(invitation);
                        return Err(StoreError::Aborted);
                    }
                    invitation.status = decision.as_status();
                    invitation.responded_at = Some(responded_at);
                    *fields = serde_json::to_value(&invitation)
                        .map_err(|e| StoreError::Serialize(e.to_string()))?;
                    *slot.lock().unwrap() = Some(invitation);
                    Ok(())
                }),
            )
            .await;

        let transitioned = match result {
            Ok(_) => true,
            Err(StoreError::Aborted) => false,
            Err(StoreError::NotFound { .. }) => return Err(InvitationError::NotFound(id.clone())),
            Err(err) => return Err(err.into()),
        };
        let invitation = seen
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| StoreError::Serialize("response left no invitation state".to_string()))?;

        if !transitioned && invitation.status != decision.as_status() {
            debug!(invitation = %id, status = ?invitation.status, "response ignored, already terminal");
            return Ok(ResponseOutcome::AlreadyResponded {
                status: invitation.status,
            });
        }

        match invitation.status {
            InvitationStatus::Accepted => self.link_judge(&invitation, responding_judge).await,
            InvitationStatus::Declined => Ok(ResponseOutcome::Declined),
            // A response always leaves pending; kept for totality.
            InvitationStatus::Pending => Ok(ResponseOutcome::AlreadyResponded {
                status: invitation.status,
            }),
        }
    }

    /// Trials this judge has accepted invitations for, skipping dangling
    /// trial references.
    pub async fn trials_for_judge(
        &self,
        judge_email: &EmailAddress,
    ) -> Result<Vec<Trial>, InvitationError> {
        let invitations = self.list_invitations(Some(judge_email)).await?;
        let mut trials = Vec::new();
        for invitation in invitations
            .iter()
            .filter(|inv| inv.status == InvitationStatus::Accepted)
        {
            match self
                .store
                .get(collections::TRIALS, invitation.trial_id.as_str())
                .await
            {
                Ok(doc) => trials.push(doc.to_type::<Trial>()?),
                Err(StoreError::NotFound { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(trials)
    }

    /// Link the accepting judge into the trial's judge set.
    async fn link_judge(
        &self,
        invitation: &Invitation,
        responding_judge: Option<&UserId>,
    ) -> Result<ResponseOutcome, InvitationError> {
        let judge = match responding_judge {
            Some(judge) => Some(judge.clone()),
            None => match self
                .directory
                .find_user_by_email(&invitation.judge_email)
                .await
            {
                Ok(found) => found,
                Err(err) => {
                    warn!(
                        invitation = %invitation.id,
                        error = %err,
                        "identity resolution failed during acceptance; trial linkage skipped"
                    );
                    None
                }
            },
        };
        let Some(judge) = judge else {
            warn!(
                invitation = %invitation.id,
                email = %invitation.judge_email,
                "invitation accepted but judge could not be resolved; trial linkage skipped"
            );
            return Ok(ResponseOutcome::AcceptedUnlinked {
                reason: UnlinkedReason::UnresolvedEmail,
            });
        };

        let joining = judge.clone();
        let result = self
            .store
            .update(
                collections::TRIALS,
                invitation.trial_id.as_str(),
                Box::new(move |fields| {
                    let mut trial: Trial = serde_json::from_value(fields.clone())
                        .map_err(|e| StoreError::Serialize(e.to_string()))?;
                    // Idempotent union: re-accepting or racing acceptances
                    // cannot produce duplicates.
                    trial.judges.insert(joining.clone());
                    *fields = serde_json::to_value(&trial)
                        .map_err(|e| StoreError::Serialize(e.to_string()))?;
                    Ok(())
                }),
            )
            .await;

        match result {
            Ok(_) => {
                debug!(trial = %invitation.trial_id, judge = %judge, "linked judge into trial");
                Ok(ResponseOutcome::Linked { judge })
            }
            Err(StoreError::NotFound { .. }) => {
                warn!(
                    invitation = %invitation.id,
                    trial = %invitation.trial_id,
                    "invitation accepted but trial does not exist; linkage skipped"
                );
                Ok(ResponseOutcome::AcceptedUnlinked {
                    reason: UnlinkedReason::TrialMissing,
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
