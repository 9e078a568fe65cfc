//! Vote recording with one vote per user and proposal.
//!
//! Counts are always read back from the repository after the write has been
//! confirmed, never derived from a local copy.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Conflict, FlowError};
use crate::proposal::{Proposal, ProposalId, UserId, VoteKind};
use crate::repository::{ProposalRepository, VoteWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote was written. `count` is the confirmed number of votes of
    /// that kind after the write.
    Recorded {
        count: usize,
        replaced_opposite: bool,
    },
    /// The user already held this vote; nothing changed.
    AlreadyVoted { count: usize },
}

impl VoteOutcome {
    pub fn count(&self) -> usize {
        match self {
            VoteOutcome::Recorded { count, .. } | VoteOutcome::AlreadyVoted { count } => *count,
        }
    }
}

#[derive(Clone)]
pub struct ApprovalTally {
    repo: Arc<dyn ProposalRepository>,
}

impl ApprovalTally {
    pub fn new(repo: Arc<dyn ProposalRepository>) -> Self {
        Self { repo }
    }

    pub async fn approve(
        &self,
        id: ProposalId,
        user: &UserId,
    ) -> Result<VoteOutcome, FlowError> {
        self.vote(id, user, VoteKind::Approval).await
    }

    pub async fn disapprove(
        &self,
        id: ProposalId,
        user: &UserId,
    ) -> Result<VoteOutcome, FlowError> {
        self.vote(id, user, VoteKind::Disapproval).await
    }

    /// Record `kind` for `user`, swapping out an opposite vote.
    ///
    /// Fails with `AlreadyFinalized` when the proposal is merged or refused.
    pub async fn vote(
        &self,
        id: ProposalId,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<VoteOutcome, FlowError> {
        let proposal = self.pending(id).await?;

        let write = self.repo.cast_vote(proposal.id, user, kind).await?;
        let count = self.repo.count_votes(proposal.id, kind).await?;
        debug!(proposal = %id, user = %user, %kind, ?write, count, "vote written");

        Ok(match write {
            VoteWrite::Inserted { replaced_opposite } => VoteOutcome::Recorded {
                count,
                replaced_opposite,
            },
            VoteWrite::AlreadyPresent => VoteOutcome::AlreadyVoted { count },
        })
    }

    /// Approvers and disapprovers of a proposal, in voting order.
    pub async fn voters(&self, id: ProposalId) -> Result<(Vec<UserId>, Vec<UserId>), FlowError> {
        Ok((
            self.repo.voters(id, VoteKind::Approval).await?,
            self.repo.voters(id, VoteKind::Disapproval).await?,
        ))
    }

    async fn pending(&self, id: ProposalId) -> Result<Proposal, FlowError> {
        let proposal = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| FlowError::not_found(format!("proposal {}", id)))?;
        if !proposal.is_pending() {
            return Err(Conflict::AlreadyFinalized {
                status: proposal.status(),
            }
            .into());
        }
        Ok(proposal)
    }
}
