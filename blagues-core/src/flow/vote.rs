use tracing::{info, warn};

use super::{FlowOutcome, SubmissionFlow};
use crate::error::{Conflict, FlowError};
use crate::proposal::{Actor, ExternalRef, VoteKind};
use crate::tally::VoteOutcome;

impl SubmissionFlow {
    pub async fn approve(
        &self,
        actor: &Actor,
        target: &ExternalRef,
    ) -> Result<FlowOutcome, FlowError> {
        self.vote(actor, target, VoteKind::Approval).await
    }

    pub async fn disapprove(
        &self,
        actor: &Actor,
        target: &ExternalRef,
    ) -> Result<FlowOutcome, FlowError> {
        self.vote(actor, target, VoteKind::Disapproval).await
    }

    async fn vote(
        &self,
        actor: &Actor,
        target: &ExternalRef,
        kind: VoteKind,
    ) -> Result<FlowOutcome, FlowError> {
        if !actor.moderator {
            return Err(FlowError::permission_denied(
                "seuls les modérateurs peuvent voter",
            ));
        }

        let proposal = self
            .repo
            .find_by_external_ref(target)
            .await?
            .ok_or_else(|| FlowError::not_found(format!("message {}", target)))?;

        // A pending proposal whose message was deleted can no longer be
        // reviewed: drop it instead of counting votes nobody can see.
        if proposal.is_pending() && !self.presenter.exists(&proposal.external_ref).await? {
            warn!(proposal = %proposal.id, message = %target, "message vanished, dropping proposal");
            self.repo.delete_proposal(proposal.id).await?;
            return Err(FlowError::not_found(format!("message {}", target)));
        }

        let report = self.lifecycle.vote(&proposal, &actor.id, kind).await?;
        if let VoteOutcome::AlreadyVoted { .. } = report.vote {
            return Err(Conflict::AlreadyVoted { kind }.into());
        }

        Ok(match report.finalized {
            Some(outcome) => {
                info!(proposal = %proposal.id, ?outcome, "proposal finalized by vote");
                FlowOutcome::Finalized {
                    kind: proposal.kind,
                    outcome,
                }
            }
            None => FlowOutcome::Voted {
                kind,
                count: report.vote.count(),
                quorum: self.lifecycle.quorum(),
            },
        })
    }
}
