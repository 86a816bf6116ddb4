//! Trialpost - coordination core for dog-trial events
//!
//! Trialpost covers the invitation -> post-assignment -> scoring workflow
//! of a trial: administrators create trials and invite judges, judges
//! accept and claim an exclusive judging post, submit per-post scores,
//! and participants watch their scores arrive live. Presentation,
//! authentication, and the storage engine itself are external
//! collaborators behind the [`store`] and [`directory`] seams.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`core`] - Domain types, records, configuration, retry policy
//! - [`store`] - Document store abstraction (atomic per-document
//!   read-modify-write, queries, change subscriptions) and the in-memory
//!   reference implementation
//! - [`directory`] - Email-to-account identity resolution
//! - [`trials`] - Trial registry
//! - [`invitations`] - Invitation ledger and acceptance linkage
//! - [`assignments`] - Exclusive judge-to-post claims
//! - [`scoring`] - Score upserts and the live score feed
//! - [`participants`] - Participant roster
//!
//! # Correctness Invariants
//!
//! Trialpost maintains the following invariants:
//!
//! 1. Within a trial, a post is held by at most one judge and a judge
//!    holds at most one post; claims commit atomically with judge-set
//!    membership
//! 2. At most one score record exists per (trial, participant, post)
//!    tuple; a resubmission amends it, last write wins
//! 3. An invitation leaves `pending` at most once; re-responses never
//!    rewrite a terminal record
//! 4. Every trial-document mutation flows through the store's atomic
//!    update, never a blind overwrite

pub mod assignments;
pub mod core;
pub mod directory;
pub mod invitations;
pub mod participants;
pub mod scoring;
pub mod store;
pub mod trials;
