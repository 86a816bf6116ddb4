//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - Identifier newtypes ([`TrialId`], [`InvitationId`], [`ParticipantId`],
//!   [`ScoreId`], [`UserId`]) - opaque, non-empty document identifiers
//! - [`EmailAddress`] - normalized, validated email
//! - [`PostNumber`] - judging post, 1-based
//! - [`ScoreValue`] - point value in 0..=20
//! - [`ParticipantNumber`] - four-digit display code
//! - [`DogRegistration`] - studbook number in `Dk#####/####` form
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs: a
//! [`ScoreValue`] is in range by the time a scoring call is made, so the
//! ledger never has to re-check it.
//!
//! # Examples
//!
//! ```
//! use trialpost::core::types::{EmailAddress, PostNumber, ScoreValue};
//!
//! let email = EmailAddress::new("judge@example.dk").unwrap();
//! assert_eq!(email.as_str(), "judge@example.dk");
//!
//! let post = PostNumber::new(3).unwrap();
//! assert_eq!(post.get(), 3);
//!
//! // Out-of-range values fail at creation time
//! assert!(ScoreValue::new(21).is_err());
//! assert!(PostNumber::new(0).is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("identifier cannot be empty")]
    EmptyIdentifier,

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("post number must be at least 1")]
    InvalidPostNumber,

    #[error("score must be between {min} and {max}, got {value}")]
    ScoreOutOfRange {
        value: i64,
        min: u8,
        max: u8,
    },

    #[error("participant number must be exactly four digits, got {0:?}")]
    InvalidParticipantNumber(String),

    #[error("dog registration must match Dk#####/####, got {0:?}")]
    InvalidDogRegistration(String),
}

macro_rules! identifier_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            ///
            /// # Errors
            ///
            /// Returns `TypeError::EmptyIdentifier` if the value is empty.
            pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(TypeError::EmptyIdentifier);
                }
                Ok(Self(value))
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

identifier_type! {
    /// Identifier of a trial document.
    TrialId
}

identifier_type! {
    /// Identifier of an invitation document.
    InvitationId
}

identifier_type! {
    /// Identifier of a participant document.
    ParticipantId
}

identifier_type! {
    /// Identifier of a score record.
    ///
    /// Score records are keyed by their natural tuple
    /// (trial, participant, post), see [`ScoreId::for_tuple`].
    ScoreId
}

identifier_type! {
    /// Identifier of a user account (administrator or judge).
    UserId
}

impl ScoreId {
    /// The natural-key identifier for a (trial, participant, post) tuple.
    ///
    /// All submissions for the same tuple map to the same document, which
    /// is what makes score submission an upsert rather than an append.
    pub fn for_tuple(trial: &TrialId, participant: &ParticipantId, post: PostNumber) -> Self {
        Self(format!(
            "{}.{}.p{}",
            trial.as_str(),
            participant.as_str(),
            post.get()
        ))
    }
}

/// A normalized email address.
///
/// Addresses are trimmed and lowercased at construction so that lookups
/// by email (invitation filtering, identity resolution) compare equal
/// regardless of how the caller typed them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a validated email address.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidEmail` if the value has no local part,
    /// no `@`, an undotted domain, or contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into().trim().to_ascii_lowercase();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    fn validate(value: &str) -> Result<(), TypeError> {
        let invalid = || TypeError::InvalidEmail(value.to_string());

        if value.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.is_empty() {
            return Err(invalid());
        }
        // Domain must contain a dot with something on both sides.
        let (head, tail) = domain.rsplit_once('.').ok_or_else(invalid)?;
        if head.is_empty() || tail.is_empty() || domain.contains('@') {
            return Err(invalid());
        }
        Ok(())
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

/// A judging post within a trial, numbered from 1.
///
/// Construction guarantees `>= 1`; the upper bound depends on the trial's
/// post count and is checked by the assignment and scoring operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostNumber(u32);

impl PostNumber {
    /// Create a post number.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPostNumber` for zero.
    pub fn new(value: u32) -> Result<Self, TypeError> {
        if value < 1 {
            return Err(TypeError::InvalidPostNumber);
        }
        Ok(Self(value))
    }

    /// The post number as an integer.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for PostNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A judge's point value for one participant at one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreValue(u8);

impl ScoreValue {
    /// Smallest allowed value.
    pub const MIN: u8 = 0;
    /// Largest allowed value.
    pub const MAX: u8 = 20;

    /// Create a score value.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::ScoreOutOfRange` outside `0..=20`.
    pub fn new(value: i64) -> Result<Self, TypeError> {
        if value < i64::from(Self::MIN) || value > i64::from(Self::MAX) {
            return Err(TypeError::ScoreOutOfRange {
                value,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(value as u8))
    }

    /// The value as an integer.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for ScoreValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participant's four-digit display code, e.g. `"0012"`.
///
/// Unique per trial by convention only; the roster does not enforce
/// uniqueness as a hard constraint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantNumber(String);

impl ParticipantNumber {
    /// Create a participant number.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidParticipantNumber` unless the value is
    /// exactly four ASCII digits.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.len() != 4 || !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(TypeError::InvalidParticipantNumber(value));
        }
        Ok(Self(value))
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ParticipantNumber {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ParticipantNumber> for String {
    fn from(value: ParticipantNumber) -> Self {
        value.0
    }
}

/// A dog's studbook registration number in `Dk#####/####` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DogRegistration(String);

impl DogRegistration {
    /// Create a registration number.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidDogRegistration` unless the value is
    /// `Dk`, five digits, `/`, four digits.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        Self::validate(&value)
            .then_some(Self(value.clone()))
            .ok_or(TypeError::InvalidDogRegistration(value))
    }

    fn validate(value: &str) -> bool {
        let Some(rest) = value.strip_prefix("Dk") else {
            return false;
        };
        let Some((serial, year)) = rest.split_once('/') else {
            return false;
        };
        serial.len() == 5
            && year.len() == 4
            && serial.chars().all(|c| c.is_ascii_digit())
            && year.chars().all(|c| c.is_ascii_digit())
    }

    /// The registration as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DogRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DogRegistration {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DogRegistration> for String {
    fn from(value: DogRegistration) -> Self {
        value.0
    }
}
