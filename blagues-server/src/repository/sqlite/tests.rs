//! Tests for the SQLite proposal repository.

use std::sync::Arc;

use rusqlite::params;

use super::{SqliteRepository, CURRENT_SCHEMA_VERSION};
use blagues_core::proposal::{
    ExternalRef, NewProposal, Outcome, ProposalFilter, ProposalId, ProposalKind, ProposalStatus,
    UserId, VoteKind,
};
use blagues_core::repository::{ProposalRepository, RepositoryError, VoteWrite};
use blagues_core::{Category, JokeId, JokePayload, Proposal};

use proptest::prelude::*;

fn payload(question: &str) -> JokePayload {
    JokePayload {
        category: Category::Dev,
        question: question.to_string(),
        answer: "A".to_string(),
    }
}

async fn suggestion(repo: &SqliteRepository, msg: &str) -> Proposal {
    repo.create_proposal(NewProposal::suggestion(
        UserId::from("author"),
        ExternalRef::from(msg),
        payload("Q"),
    ))
    .await
    .unwrap()
}

async fn correction(repo: &SqliteRepository, target: ProposalId, msg: &str, q: &str) -> Proposal {
    repo.create_proposal(NewProposal::correction(
        target,
        UserId::from("fixer"),
        ExternalRef::from(msg),
        payload(q),
    ))
    .await
    .unwrap()
}

#[tokio::test]
async fn test_get_returns_none_for_missing() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    assert!(repo.get(ProposalId(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_then_read_back() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let created = suggestion(&repo, "m1").await;

    let by_id = repo.get(created.id).await.unwrap().unwrap();
    assert_eq!(by_id, created);
    assert_eq!(by_id.payload.category, Category::Dev);
    assert_eq!(by_id.status(), ProposalStatus::Pending);

    let by_ref = repo
        .find_by_external_ref(&ExternalRef::from("m1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_ref.id, created.id);
}

#[tokio::test]
async fn test_create_rejects_reused_external_ref() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    suggestion(&repo, "m1").await;
    let err = repo
        .create_proposal(NewProposal::suggestion(
            UserId::from("other"),
            ExternalRef::from("m1"),
            payload("Q2"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Constraint { .. }));
}

#[tokio::test]
async fn test_correction_must_target_suggestion() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let s = suggestion(&repo, "m1").await;
    let c = correction(&repo, s.id, "c1", "Q1").await;
    assert_eq!(c.kind, ProposalKind::Correction { target: s.id });

    for target in [c.id, ProposalId(99)] {
        let err = repo
            .create_proposal(NewProposal::correction(
                target,
                UserId::from("fixer"),
                ExternalRef::from(format!("bad-{}", target.0)),
                payload("Q2"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Constraint { .. }));
    }
}

#[tokio::test]
async fn test_finalize_is_conditional() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let s = suggestion(&repo, "m1").await;

    assert!(repo.finalize(s.id, Outcome::Refused).await.unwrap());
    assert!(!repo.finalize(s.id, Outcome::Refused).await.unwrap());
    assert!(!repo.finalize(s.id, Outcome::Merged).await.unwrap());
    assert_eq!(
        repo.get(s.id).await.unwrap().unwrap().status(),
        ProposalStatus::Refused
    );

    let err = repo.finalize(ProposalId(42), Outcome::Merged).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Storage { .. }));
}

#[tokio::test]
async fn test_concurrent_finalize_has_one_winner() {
    let repo = Arc::new(SqliteRepository::new_in_memory().unwrap());
    let id = suggestion(&repo, "m1").await.id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.finalize(id, Outcome::Merged).await.unwrap() })
        })
        .collect();
    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_release_reopens_unlinked_claim_once() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let s = suggestion(&repo, "m1").await;

    assert!(!repo.release(s.id, Outcome::Merged).await.unwrap());
    assert!(repo.finalize(s.id, Outcome::Merged).await.unwrap());
    assert!(repo.release(s.id, Outcome::Merged).await.unwrap());
    assert!(!repo.release(s.id, Outcome::Merged).await.unwrap());
    assert!(repo.get(s.id).await.unwrap().unwrap().is_pending());

    assert!(repo.finalize(s.id, Outcome::Merged).await.unwrap());
    repo.set_joke_id(s.id, JokeId(3)).await.unwrap();
    assert!(!repo.release(s.id, Outcome::Merged).await.unwrap());
    assert!(repo.get(s.id).await.unwrap().unwrap().is_merged());
}

#[tokio::test]
async fn test_merge_bookkeeping() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let s = suggestion(&repo, "m1").await;

    repo.set_joke_id(s.id, JokeId(12)).await.unwrap();
    repo.update_payload(s.id, payload("Q corrected")).await.unwrap();

    let stored = repo.get(s.id).await.unwrap().unwrap();
    assert_eq!(stored.joke_id, Some(JokeId(12)));
    assert_eq!(stored.payload.question, "Q corrected");
    assert_eq!(
        repo.find_published(JokeId(12)).await.unwrap().map(|p| p.id),
        Some(s.id)
    );
}

#[tokio::test]
async fn test_published_root_is_created_merged() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let root = repo
        .create_proposal(NewProposal::published(
            JokeId(7),
            ExternalRef::from("joke:7"),
            payload("Q"),
        ))
        .await
        .unwrap();
    assert!(root.is_merged());
    let stored = repo.find_published(JokeId(7)).await.unwrap().unwrap();
    assert_eq!(stored.status(), ProposalStatus::Merged);
}

#[tokio::test]
async fn test_cast_vote_swaps_opposite() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let s = suggestion(&repo, "m1").await;
    let user = UserId::from("mod");

    assert_eq!(
        repo.cast_vote(s.id, &user, VoteKind::Disapproval)
            .await
            .unwrap(),
        VoteWrite::Inserted {
            replaced_opposite: false
        }
    );
    assert_eq!(
        repo.cast_vote(s.id, &user, VoteKind::Approval).await.unwrap(),
        VoteWrite::Inserted {
            replaced_opposite: true
        }
    );
    assert_eq!(
        repo.cast_vote(s.id, &user, VoteKind::Approval).await.unwrap(),
        VoteWrite::AlreadyPresent
    );
    assert_eq!(repo.count_votes(s.id, VoteKind::Approval).await.unwrap(), 1);
    assert_eq!(repo.count_votes(s.id, VoteKind::Disapproval).await.unwrap(), 0);
}

#[tokio::test]
async fn test_vote_on_missing_proposal_is_constraint_error() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let err = repo
        .cast_vote(ProposalId(3), &UserId::from("mod"), VoteKind::Approval)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Constraint { .. }));
}

#[tokio::test]
async fn test_voters_in_voting_order() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let s = suggestion(&repo, "m1").await;
    for user in ["carol", "alice", "bob"] {
        repo.add_vote(s.id, &UserId::from(user), VoteKind::Approval)
            .await
            .unwrap();
    }
    assert!(repo
        .remove_vote(s.id, &UserId::from("alice"), VoteKind::Approval)
        .await
        .unwrap());
    assert!(!repo
        .remove_vote(s.id, &UserId::from("alice"), VoteKind::Approval)
        .await
        .unwrap());

    let voters = repo.voters(s.id, VoteKind::Approval).await.unwrap();
    assert_eq!(voters, vec![UserId::from("carol"), UserId::from("bob")]);
}

#[tokio::test]
async fn test_delete_removes_votes() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let s = suggestion(&repo, "m1").await;
    repo.add_vote(s.id, &UserId::from("mod"), VoteKind::Disapproval)
        .await
        .unwrap();

    repo.delete_proposal(s.id).await.unwrap();

    assert!(repo.get(s.id).await.unwrap().is_none());
    assert_eq!(repo.count_votes(s.id, VoteKind::Disapproval).await.unwrap(), 0);
}

#[tokio::test]
async fn test_chain_and_listing_filters() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let s = suggestion(&repo, "m1").await;
    let other = suggestion(&repo, "m2").await;
    let c1 = correction(&repo, s.id, "c1", "Q1").await;
    correction(&repo, other.id, "c2", "Q2").await;
    let c3 = correction(&repo, s.id, "c3", "Q3").await;
    repo.finalize(other.id, Outcome::Merged).await.unwrap();

    let chain = repo.chain_for(s.id).await.unwrap();
    assert_eq!(
        chain.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![c1.id, c3.id]
    );

    let pending = repo
        .list_proposals(ProposalFilter::pending_suggestions())
        .await
        .unwrap();
    assert_eq!(pending.iter().map(|p| p.id).collect::<Vec<_>>(), vec![s.id]);

    let corrections = repo
        .list_proposals(ProposalFilter {
            suggestions: Some(false),
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(corrections.len(), 3);

    let everything = repo.list_proposals(ProposalFilter::default()).await.unwrap();
    assert_eq!(everything.len(), 5);
}

#[tokio::test]
async fn test_both_flags_set_reads_as_corruption() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let s = suggestion(&repo, "m1").await;
    {
        let conn = repo.conn.lock().unwrap();
        // Bypass the CHECK constraint the schema enforces.
        conn.execute_batch("PRAGMA ignore_check_constraints = ON").unwrap();
        conn.execute(
            "UPDATE proposals SET merged = 1, refused = 1 WHERE id = ?1",
            params![s.id.0],
        )
        .unwrap();
    }
    let err = repo.get(s.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Corruption { .. }));
}

#[tokio::test]
async fn test_schema_version_recorded_and_reopen_is_idempotent() {
    let dir = std::env::temp_dir().join(format!("blagues-sqlite-{}", uuid::Uuid::new_v4()));
    let path = dir.join("state.db");

    {
        let repo = SqliteRepository::new(&path).unwrap();
        suggestion(&repo, "m1").await;
    }
    let repo = SqliteRepository::new(&path).unwrap();
    let version: i64 = repo
        .conn
        .lock()
        .unwrap()
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
    assert!(repo
        .find_by_external_ref(&ExternalRef::from("m1"))
        .await
        .unwrap()
        .is_some());

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_newer_schema_is_rejected() {
    let dir = std::env::temp_dir().join(format!("blagues-sqlite-{}", uuid::Uuid::new_v4()));
    let path = dir.join("state.db");
    drop(SqliteRepository::new(&path).unwrap());
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE schema_version SET version = ?1 WHERE id = 1",
            params![CURRENT_SCHEMA_VERSION + 1],
        )
        .unwrap();
    }
    assert!(SqliteRepository::new(&path).is_err());
    std::fs::remove_dir_all(dir).unwrap();
}

proptest! {
    /// Property: whatever the sequence of casts, the stored voter sets stay
    /// disjoint and free of duplicates.
    #[test]
    fn cast_vote_keeps_voters_disjoint(votes in proptest::collection::vec((0u8..4, any::<bool>()), 0..30)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let repo = SqliteRepository::new_in_memory().unwrap();
            let s = suggestion(&repo, "m1").await;
            for (user, approve) in &votes {
                let kind = if *approve { VoteKind::Approval } else { VoteKind::Disapproval };
                repo.cast_vote(s.id, &UserId(format!("u{}", user)), kind).await.unwrap();
            }

            let approvers = repo.voters(s.id, VoteKind::Approval).await.unwrap();
            let disapprovers = repo.voters(s.id, VoteKind::Disapproval).await.unwrap();
            for user in &approvers {
                assert!(!disapprovers.contains(user));
            }
            assert!(approvers.len() + disapprovers.len() <= 4);
        });
    }
}
