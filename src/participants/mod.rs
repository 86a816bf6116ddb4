//! participants
//!
//! Participant roster: registering dog-and-handler entries for a trial.
//!
//! Entries are created by an administrator and read-only afterwards;
//! nothing in this core amends or deletes them. The participant number
//! is a four-digit display code, unique per trial by convention (not
//! enforced).

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::core::model::{collections, Participant};
use crate::core::types::{
    DogRegistration, EmailAddress, ParticipantId, ParticipantNumber, TrialId,
};
use crate::store::{DocumentStore, Filter, OrderBy, StoreError};

/// Errors from roster operations.
#[derive(Debug, Error)]
pub enum ParticipantError {
    /// A required descriptive field was empty.
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    /// The referenced trial does not exist.
    #[error("trial not found: {0}")]
    TrialNotFound(TrialId),

    /// No participant with this identifier exists.
    #[error("participant not found: {0}")]
    NotFound(ParticipantId),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Input for registering a participant.
///
/// Field formats (participant number, dog registration, email) are
/// enforced by their types at construction.
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub trial_id: TrialId,
    pub participant_number: ParticipantNumber,
    pub dog_name: String,
    pub dog_registration: DogRegistration,
    pub handler_name: String,
    pub email: EmailAddress,
}

/// Registers and reads participants.
pub struct ParticipantRoster {
    store: Arc<dyn DocumentStore>,
}

impl ParticipantRoster {
    /// Create a roster over `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Register a participant. Validation happens before any write.
    pub async fn register(&self, new: NewParticipant) -> Result<ParticipantId, ParticipantError> {
        if new.dog_name.trim().is_empty() {
            return Err(ParticipantError::EmptyField("dog name"));
        }
        if new.handler_name.trim().is_empty() {
            return Err(ParticipantError::EmptyField("handler name"));
        }
        match self
            .store
            .get(collections::TRIALS, new.trial_id.as_str())
            .await
        {
            Ok(_) => {}
            Err(StoreError::NotFound { .. }) => {
                return Err(ParticipantError::TrialNotFound(new.trial_id.clone()))
            }
            Err(err) => return Err(err.into()),
        }

        let id = self
            .store
            .create(
                collections::PARTICIPANTS,
                json!({
                    "trial_id": &new.trial_id,
                    "participant_number": &new.participant_number,
                    "dog_name": new.dog_name.trim(),
                    "dog_registration": &new.dog_registration,
                    "handler_name": new.handler_name.trim(),
                    "email": &new.email,
                }),
            )
            .await?;
        debug!(
            participant = %id,
            trial = %new.trial_id,
            number = %new.participant_number,
            "registered participant"
        );
        Ok(ParticipantId::new(id)
            .map_err(|_| StoreError::Serialize("store returned an empty id".to_string()))?)
    }

    /// Fetch a participant by id.
    pub async fn get(&self, id: &ParticipantId) -> Result<Participant, ParticipantError> {
        match self.store.get(collections::PARTICIPANTS, id.as_str()).await {
            Ok(doc) => Ok(doc.to_type::<Participant>()?),
            Err(StoreError::NotFound { .. }) => Err(ParticipantError::NotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    /// Participants of a trial, ordered by participant number ascending.
    pub async fn list(&self, trial_id: &TrialId) -> Result<Vec<Participant>, ParticipantError> {
        let docs = self
            .store
            .query(
                collections::PARTICIPANTS,
                Filter::new().field_eq("trial_id", trial_id.as_str()),
                OrderBy::asc("participant_number"),
            )
            .await?;
        docs.iter()
            .map(|doc| doc.to_type::<Participant>().map_err(ParticipantError::from))
            .collect()
    }
}
