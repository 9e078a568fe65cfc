//! In-memory implementation of `ProposalRepository`.
//!
//! All state sits behind one `RwLock`, so every trait call is atomic with
//! respect to the others. State is lost on restart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{ProposalRepository, RepositoryError, VoteWrite};
use crate::joke::{JokeId, JokePayload};
use crate::proposal::{
    ExternalRef, NewProposal, Outcome, Proposal, ProposalFilter, ProposalId, ProposalKind, UserId,
    VoteKind,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    proposals: BTreeMap<ProposalId, Proposal>,
    /// Vote rows in insertion order.
    approvals: Vec<(ProposalId, UserId)>,
    disapprovals: Vec<(ProposalId, UserId)>,
}

impl Inner {
    fn votes(&self, kind: VoteKind) -> &Vec<(ProposalId, UserId)> {
        match kind {
            VoteKind::Approval => &self.approvals,
            VoteKind::Disapproval => &self.disapprovals,
        }
    }

    fn votes_mut(&mut self, kind: VoteKind) -> &mut Vec<(ProposalId, UserId)> {
        match kind {
            VoteKind::Approval => &mut self.approvals,
            VoteKind::Disapproval => &mut self.disapprovals,
        }
    }

    fn has_vote(&self, id: ProposalId, user: &UserId, kind: VoteKind) -> bool {
        self.votes(kind).iter().any(|(p, u)| *p == id && u == user)
    }

    fn remove_vote(&mut self, id: ProposalId, user: &UserId, kind: VoteKind) -> bool {
        let votes = self.votes_mut(kind);
        let before = votes.len();
        votes.retain(|(p, u)| !(*p == id && u == user));
        votes.len() != before
    }

    fn proposal_mut(
        &mut self,
        id: ProposalId,
        operation: &'static str,
    ) -> Result<&mut Proposal, RepositoryError> {
        self.proposals
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::storage(operation, format!("no proposal {}", id)))
    }

    fn ensure_exists(&self, id: ProposalId) -> Result<(), RepositoryError> {
        if self.proposals.contains_key(&id) {
            Ok(())
        } else {
            Err(RepositoryError::constraint(format!(
                "vote references missing proposal {}",
                id
            )))
        }
    }
}

/// In-memory proposal repository.
#[derive(Default)]
pub struct InMemoryRepository {
    inner: RwLock<Inner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_creation(mut proposals: Vec<Proposal>) -> Vec<Proposal> {
    proposals.sort_by_key(|p| (p.created_at, p.id));
    proposals
}

#[async_trait]
impl ProposalRepository for InMemoryRepository {
    async fn create_proposal(&self, new: NewProposal) -> Result<Proposal, RepositoryError> {
        let mut inner = self.inner.write().await;

        if inner
            .proposals
            .values()
            .any(|p| p.external_ref == new.external_ref)
        {
            return Err(RepositoryError::constraint(format!(
                "external ref {} already used",
                new.external_ref
            )));
        }
        if let ProposalKind::Correction { target } = new.kind {
            match inner.proposals.get(&target) {
                Some(root) if root.kind.is_suggestion() => {}
                _ => {
                    return Err(RepositoryError::constraint(format!(
                        "correction target {} is not a suggestion",
                        target
                    )))
                }
            }
        }

        inner.next_id += 1;
        let proposal = Proposal {
            id: ProposalId(inner.next_id),
            kind: new.kind,
            submitter: new.submitter,
            external_ref: new.external_ref,
            payload: new.payload,
            joke_id: new.joke_id,
            merged: new.merged,
            refused: false,
            created_at: Utc::now(),
        };
        inner.proposals.insert(proposal.id, proposal.clone());
        Ok(proposal)
    }

    async fn get(&self, id: ProposalId) -> Result<Option<Proposal>, RepositoryError> {
        Ok(self.inner.read().await.proposals.get(&id).cloned())
    }

    async fn find_by_external_ref(
        &self,
        external_ref: &ExternalRef,
    ) -> Result<Option<Proposal>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .proposals
            .values()
            .find(|p| &p.external_ref == external_ref)
            .cloned())
    }

    async fn find_published(&self, joke_id: JokeId) -> Result<Option<Proposal>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .proposals
            .values()
            .find(|p| p.kind.is_suggestion() && p.joke_id == Some(joke_id))
            .cloned())
    }

    async fn finalize(&self, id: ProposalId, outcome: Outcome) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        Ok(inner.proposal_mut(id, "finalize")?.finalize(outcome))
    }

    async fn release(&self, id: ProposalId, outcome: Outcome) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        Ok(inner.proposal_mut(id, "release")?.release(outcome))
    }

    async fn set_joke_id(&self, id: ProposalId, joke_id: JokeId) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.proposal_mut(id, "set_joke_id")?.joke_id = Some(joke_id);
        Ok(())
    }

    async fn update_payload(
        &self,
        id: ProposalId,
        payload: JokePayload,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.proposal_mut(id, "update_payload")?.payload = payload;
        Ok(())
    }

    async fn delete_proposal(&self, id: ProposalId) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.proposals.remove(&id);
        inner.approvals.retain(|(p, _)| *p != id);
        inner.disapprovals.retain(|(p, _)| *p != id);
        Ok(())
    }

    async fn add_vote(
        &self,
        id: ProposalId,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<VoteWrite, RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.ensure_exists(id)?;
        if inner.has_vote(id, user, kind) {
            return Ok(VoteWrite::AlreadyPresent);
        }
        inner.votes_mut(kind).push((id, user.clone()));
        Ok(VoteWrite::Inserted {
            replaced_opposite: false,
        })
    }

    async fn remove_vote(
        &self,
        id: ProposalId,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<bool, RepositoryError> {
        Ok(self.inner.write().await.remove_vote(id, user, kind))
    }

    async fn cast_vote(
        &self,
        id: ProposalId,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<VoteWrite, RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.ensure_exists(id)?;
        if inner.has_vote(id, user, kind) {
            return Ok(VoteWrite::AlreadyPresent);
        }
        let replaced_opposite = inner.remove_vote(id, user, kind.opposite());
        inner.votes_mut(kind).push((id, user.clone()));
        Ok(VoteWrite::Inserted { replaced_opposite })
    }

    async fn voters(
        &self,
        id: ProposalId,
        kind: VoteKind,
    ) -> Result<Vec<UserId>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .votes(kind)
            .iter()
            .filter(|(p, _)| *p == id)
            .map(|(_, u)| u.clone())
            .collect())
    }

    async fn list_proposals(
        &self,
        filter: ProposalFilter,
    ) -> Result<Vec<Proposal>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(sorted_by_creation(
            inner
                .proposals
                .values()
                .filter(|p| filter.matches(p))
                .cloned()
                .collect(),
        ))
    }

    async fn chain_for(&self, suggestion: ProposalId) -> Result<Vec<Proposal>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(sorted_by_creation(
            inner
                .proposals
                .values()
                .filter(|p| p.kind == ProposalKind::Correction { target: suggestion })
                .cloned()
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joke::Category;
    use crate::proposal::ProposalStatus;
    use proptest::prelude::*;

    fn payload(question: &str) -> JokePayload {
        JokePayload {
            category: Category::Global,
            question: question.to_string(),
            answer: "A".to_string(),
        }
    }

    async fn suggestion(repo: &InMemoryRepository, msg: &str) -> Proposal {
        repo.create_proposal(NewProposal::suggestion(
            UserId::from("author"),
            ExternalRef::from(msg),
            payload("Q"),
        ))
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let repo = InMemoryRepository::new();
        let a = suggestion(&repo, "m1").await;
        let b = suggestion(&repo, "m2").await;
        assert!(b.id > a.id);
        assert_eq!(a.status(), ProposalStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_rejects_reused_external_ref() {
        let repo = InMemoryRepository::new();
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
        let repo = InMemoryRepository::new();
        let s = suggestion(&repo, "m1").await;
        let c = repo
            .create_proposal(NewProposal::correction(
                s.id,
                UserId::from("fixer"),
                ExternalRef::from("c1"),
                payload("Q fixed"),
            ))
            .await
            .unwrap();

        let err = repo
            .create_proposal(NewProposal::correction(
                c.id,
                UserId::from("fixer"),
                ExternalRef::from("c2"),
                payload("Q fixed again"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Constraint { .. }));
    }

    #[tokio::test]
    async fn test_finalize_only_once() {
        let repo = InMemoryRepository::new();
        let s = suggestion(&repo, "m1").await;

        assert!(repo.finalize(s.id, Outcome::Merged).await.unwrap());
        assert!(!repo.finalize(s.id, Outcome::Merged).await.unwrap());
        assert!(!repo.finalize(s.id, Outcome::Refused).await.unwrap());

        let stored = repo.get(s.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), ProposalStatus::Merged);
    }

    #[tokio::test]
    async fn test_cast_vote_swaps_opposite() {
        let repo = InMemoryRepository::new();
        let s = suggestion(&repo, "m1").await;
        let user = UserId::from("mod");

        let first = repo
            .cast_vote(s.id, &user, VoteKind::Disapproval)
            .await
            .unwrap();
        assert_eq!(
            first,
            VoteWrite::Inserted {
                replaced_opposite: false
            }
        );

        let swapped = repo.cast_vote(s.id, &user, VoteKind::Approval).await.unwrap();
        assert_eq!(
            swapped,
            VoteWrite::Inserted {
                replaced_opposite: true
            }
        );
        assert_eq!(repo.count_votes(s.id, VoteKind::Disapproval).await.unwrap(), 0);
        assert_eq!(repo.count_votes(s.id, VoteKind::Approval).await.unwrap(), 1);

        let again = repo.cast_vote(s.id, &user, VoteKind::Approval).await.unwrap();
        assert_eq!(again, VoteWrite::AlreadyPresent);
        assert_eq!(repo.count_votes(s.id, VoteKind::Approval).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_vote_on_missing_proposal_is_constraint_error() {
        let repo = InMemoryRepository::new();
        let err = repo
            .add_vote(ProposalId(42), &UserId::from("mod"), VoteKind::Approval)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Constraint { .. }));
    }

    #[tokio::test]
    async fn test_chain_for_is_creation_ordered() {
        let repo = InMemoryRepository::new();
        let s = suggestion(&repo, "m1").await;
        let other = suggestion(&repo, "m2").await;
        for (i, target) in [s.id, other.id, s.id].into_iter().enumerate() {
            repo.create_proposal(NewProposal::correction(
                target,
                UserId::from("fixer"),
                ExternalRef::from(format!("c{}", i)),
                payload(&format!("Q{}", i)),
            ))
            .await
            .unwrap();
        }

        let chain = repo.chain_for(s.id).await.unwrap();
        let refs: Vec<_> = chain.iter().map(|p| p.external_ref.0.as_str()).collect();
        assert_eq!(refs, vec!["c0", "c2"]);
    }

    #[tokio::test]
    async fn test_delete_removes_votes() {
        let repo = InMemoryRepository::new();
        let s = suggestion(&repo, "m1").await;
        repo.add_vote(s.id, &UserId::from("mod"), VoteKind::Approval)
            .await
            .unwrap();

        repo.delete_proposal(s.id).await.unwrap();

        assert!(repo.get(s.id).await.unwrap().is_none());
        assert!(repo
            .voters(s.id, VoteKind::Approval)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_find_published() {
        let repo = InMemoryRepository::new();
        let root = repo
            .create_proposal(NewProposal::published(
                JokeId(7),
                ExternalRef::from("joke:7"),
                payload("Q"),
            ))
            .await
            .unwrap();
        assert!(root.is_merged());

        let found = repo.find_published(JokeId(7)).await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(root.id));
        assert!(repo.find_published(JokeId(8)).await.unwrap().is_none());
    }

    fn arb_vote() -> impl Strategy<Value = (u8, bool)> {
        (0u8..5, any::<bool>())
    }

    proptest! {
        /// Property: whatever the sequence of casts, no user ends up both an
        /// approver and a disapprover, and nobody is counted twice.
        #[test]
        fn cast_vote_keeps_voters_disjoint(votes in proptest::collection::vec(arb_vote(), 0..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let repo = InMemoryRepository::new();
                let s = suggestion(&repo, "m1").await;

                for (user, approve) in &votes {
                    let kind = if *approve { VoteKind::Approval } else { VoteKind::Disapproval };
                    repo.cast_vote(s.id, &UserId(format!("u{}", user)), kind).await.unwrap();
                }

                let approvers = repo.voters(s.id, VoteKind::Approval).await.unwrap();
                let disapprovers = repo.voters(s.id, VoteKind::Disapproval).await.unwrap();

                for user in &approvers {
                    assert!(!disapprovers.contains(user), "{} holds both votes", user);
                }
                let mut deduped = approvers.clone();
                deduped.sort();
                deduped.dedup();
                assert_eq!(deduped.len(), approvers.len());
            });
        }
    }
}
