//! Concurrency tests for the contended paths: post claims and score
//! upserts issued by independent actors against the same trial.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Barrier;

use trialpost::assignments::{AssignmentError, PostAssignmentManager};
use trialpost::core::config::RetryConfig;
use trialpost::core::types::{
    DogRegistration, EmailAddress, ParticipantId, ParticipantNumber, PostNumber, ScoreValue,
    TrialId, UserId,
};
use trialpost::participants::{NewParticipant, ParticipantRoster};
use trialpost::scoring::ScoringLedger;
use trialpost::store::{DocumentStore, MemoryStore};
use trialpost::trials::TrialRegistry;

fn user(s: &str) -> UserId {
    UserId::new(s).unwrap()
}

fn post(n: u32) -> PostNumber {
    PostNumber::new(n).unwrap()
}

async fn trial_with_posts(store: &Arc<MemoryStore>, posts: u32) -> TrialId {
    let registry = TrialRegistry::new(Arc::clone(store) as Arc<dyn DocumentStore>);
    registry
        .create_trial(
            "Contended trial",
            NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
            posts,
            &user("admin"),
        )
        .await
        .unwrap()
}

async fn register_participant(store: &Arc<MemoryStore>, trial_id: &TrialId) -> ParticipantId {
    let roster = ParticipantRoster::new(Arc::clone(store) as Arc<dyn DocumentStore>);
    roster
        .register(NewParticipant {
            trial_id: trial_id.clone(),
            participant_number: ParticipantNumber::new("0001").unwrap(),
            dog_name: "Bella".into(),
            dog_registration: DogRegistration::new("Dk12345/2024").unwrap(),
            handler_name: "H. Hansen".into(),
            email: EmailAddress::new("bella@example.dk").unwrap(),
        })
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_claims_for_one_post_yield_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let trial_id = trial_with_posts(&store, 1).await;
    let manager = Arc::new(PostAssignmentManager::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        RetryConfig::no_retry(),
    ));

    let barrier = Arc::new(Barrier::new(2));
    let mut tasks = Vec::new();
    for judge in ["judge-a", "judge-b"] {
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);
        let trial_id = trial_id.clone();
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            manager.assign_post(&trial_id, &user(judge), post(1)).await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => successes += 1,
            Err(AssignmentError::PostTaken { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1, "exactly one claim must win");
    assert_eq!(conflicts, 1, "the loser must see PostTaken");

    let registry = TrialRegistry::new(Arc::clone(&store) as Arc<dyn DocumentStore>);
    let trial = registry.get_trial(&trial_id).await.unwrap();
    assert_eq!(trial.post_assignments.len(), 1);
    // The winner is also in the judge set; the loser never entered it.
    assert_eq!(trial.judges.len(), 1);
    let (winner, held) = trial.post_assignments.iter().next().unwrap();
    assert_eq!(*held, post(1));
    assert!(trial.judges.contains(winner));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_submissions_for_one_tuple_keep_one_record() {
    let store = Arc::new(MemoryStore::new());
    let trial_id = trial_with_posts(&store, 2).await;
    let participant = register_participant(&store, &trial_id).await;
    let ledger = Arc::new(ScoringLedger::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        RetryConfig::no_retry(),
    ));

    let barrier = Arc::new(Barrier::new(2));
    let mut tasks = Vec::new();
    for points in [11i64, 14] {
        let ledger = Arc::clone(&ledger);
        let barrier = Arc::clone(&barrier);
        let trial_id = trial_id.clone();
        let participant = participant.clone();
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            ledger
                .submit_score(
                    &trial_id,
                    &participant,
                    post(1),
                    &user("judge-a"),
                    ScoreValue::new(points).unwrap(),
                )
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let scores = ledger.list_scores(&trial_id, Some(&participant)).await.unwrap();
    assert_eq!(scores.len(), 1, "concurrent submissions must not duplicate");
    assert!(
        scores[0].value == ScoreValue::new(11).unwrap()
            || scores[0].value == ScoreValue::new(14).unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_reassignments_preserve_exclusivity() {
    let store = Arc::new(MemoryStore::new());
    let trial_id = trial_with_posts(&store, 3).await;
    let manager = Arc::new(PostAssignmentManager::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        RetryConfig::no_retry(),
    ));

    // Five judges each walk through the posts; conflicts are expected,
    // corruption is not.
    let mut tasks = Vec::new();
    for judge in ["a", "b", "c", "d", "e"] {
        let manager = Arc::clone(&manager);
        let trial_id = trial_id.clone();
        tasks.push(tokio::spawn(async move {
            for p in 1..=3u32 {
                let _ = manager.assign_post(&trial_id, &user(judge), post(p)).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let registry = TrialRegistry::new(Arc::clone(&store) as Arc<dyn DocumentStore>);
    let trial = registry.get_trial(&trial_id).await.unwrap();

    // No post is held twice, and every holder is a recorded judge.
    let mut held = std::collections::BTreeSet::new();
    for (judge, p) in &trial.post_assignments {
        assert!(held.insert(*p), "post {p} held by more than one judge");
        assert!(trial.judges.contains(judge));
    }
}
