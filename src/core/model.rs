//! core::model
//!
//! Domain records as they are stored and read back from the document
//! store.
//!
//! # Ownership
//!
//! A [`Trial`] exclusively owns its `judges` set and `post_assignments`
//! map; both are only ever mutated through an atomic update of the trial
//! document. [`Invitation`], [`Score`], and [`Participant`] are
//! independent records that reference a trial by identifier (weak
//! reference, lookup by query only).
//!
//! # Timestamps
//!
//! `created_at` and `updated_at` are assigned by the store on commit, so
//! every struct here carries them for reads but write payloads never set
//! them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{
    DogRegistration, EmailAddress, InvitationId, ParticipantId, ParticipantNumber, PostNumber,
    ScoreId, ScoreValue, TrialId, UserId,
};

/// Collection names in the backing document store.
pub mod collections {
    /// Trial documents.
    pub const TRIALS: &str = "trials";
    /// Judge invitation documents.
    pub const INVITATIONS: &str = "invitations";
    /// Score records, keyed by their natural tuple.
    pub const SCORES: &str = "scores";
    /// Participant roster entries.
    pub const PARTICIPANTS: &str = "participants";
    /// User accounts, used for email-to-identity resolution.
    pub const USERS: &str = "users";
}

/// One scored event with a fixed number of judging posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: TrialId,
    pub name: String,
    /// Calendar day of the event; no time-of-day semantics.
    pub date: NaiveDate,
    pub post_count: u32,
    pub created_by: UserId,
    /// Judges linked to the trial. Grows monotonically through
    /// invitation acceptance and post claims; never shrinks.
    #[serde(default)]
    pub judges: BTreeSet<UserId>,
    /// At most one post per judge, at most one judge per post.
    #[serde(default)]
    pub post_assignments: BTreeMap<UserId, PostNumber>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trial {
    /// Derived status relative to the local calendar day.
    pub fn status(&self) -> TrialStatus {
        TrialStatus::on(self.date, Local::now().date_naive())
    }

    /// The judge currently holding `post`, if any.
    pub fn holder_of(&self, post: PostNumber) -> Option<&UserId> {
        self.post_assignments
            .iter()
            .find(|(_, held)| **held == post)
            .map(|(judge, _)| judge)
    }

    /// The post currently held by `judge`, if any.
    pub fn assignment_of(&self, judge: &UserId) -> Option<PostNumber> {
        self.post_assignments.get(judge).copied()
    }
}

/// Derived trial status. Never stored; computed from the trial date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialStatus {
    Upcoming,
    Active,
    Completed,
}

impl TrialStatus {
    /// Status of a trial dated `date` as seen on `today`.
    ///
    /// Calendar-day comparison only; callers strip time-of-day by
    /// construction since both sides are naive dates.
    pub fn on(date: NaiveDate, today: NaiveDate) -> Self {
        match date.cmp(&today) {
            std::cmp::Ordering::Greater => TrialStatus::Upcoming,
            std::cmp::Ordering::Equal => TrialStatus::Active,
            std::cmp::Ordering::Less => TrialStatus::Completed,
        }
    }
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrialStatus::Upcoming => write!(f, "upcoming"),
            TrialStatus::Active => write!(f, "active"),
            TrialStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Lifecycle state of a judge invitation.
///
/// Transitions only `pending -> accepted` or `pending -> declined`;
/// a terminal state is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    /// Whether the invitation still awaits a response.
    pub fn is_pending(self) -> bool {
        matches!(self, InvitationStatus::Pending)
    }

    /// Human-readable label for display surfaces.
    pub fn display_label(self) -> &'static str {
        match self {
            InvitationStatus::Pending => "awaiting response",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
        }
    }
}

/// An offer for a specific judge (by email) to judge a specific trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub trial_id: TrialId,
    pub judge_email: EmailAddress,
    pub invited_by: UserId,
    pub status: InvitationStatus,
    /// Set exactly once, on the first transition out of pending.
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One judge's evaluation of one participant at one post.
///
/// At most one record exists per (trial, participant, post) tuple; a
/// second submission amends the existing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub id: ScoreId,
    pub trial_id: TrialId,
    pub participant_id: ParticipantId,
    pub post_number: PostNumber,
    pub judge_id: UserId,
    pub value: ScoreValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered dog-and-handler entry in a trial.
///
/// Created by an administrator and read-only thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub trial_id: TrialId,
    pub participant_number: ParticipantNumber,
    pub dog_name: String,
    pub dog_registration: DogRegistration,
    pub handler_name: String,
    /// Associates the entry with an authenticated user account.
    pub email: EmailAddress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
