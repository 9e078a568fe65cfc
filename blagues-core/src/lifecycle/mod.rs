//! Proposal lifecycle: PENDING until a quorum of approvals merges it or a
//! quorum of disapprovals refuses it.
//!
//! The transition function is pure (`transition`), effects are data
//! (`effect`) and the interpreter runs them. Votes flow through the tally,
//! so counts fed to the transition are always confirmed store reads.

pub mod effect;
pub mod event;
pub mod interpreter;
pub mod state;
pub mod transition;

use std::sync::Arc;

use tracing::{info, warn};

use crate::chain::{Chain, CorrectionChain};
use crate::dataset::Dataset;
use crate::error::{Conflict, FlowError};
use crate::joke::JokePayload;
use crate::presentation::Presenter;
use crate::proposal::{Outcome, Proposal, ProposalId, ProposalKind, UserId, VoteKind};
use crate::repository::{ProposalRepository, RepositoryError};
use crate::tally::{ApprovalTally, VoteOutcome};

use event::LifecycleEvent;
use interpreter::{EffectInterpreter, Execution};
use state::{MergeTarget, ProposalState};
use transition::transition;

/// Result of a vote handled by the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteReport {
    pub vote: VoteOutcome,
    /// Set when this vote finalized the proposal.
    pub finalized: Option<Outcome>,
}

#[derive(Clone)]
pub struct ProposalLifecycle {
    repo: Arc<dyn ProposalRepository>,
    tally: ApprovalTally,
    chain: CorrectionChain,
    interpreter: EffectInterpreter,
    quorum: usize,
}

impl ProposalLifecycle {
    pub fn new(
        repo: Arc<dyn ProposalRepository>,
        dataset: Arc<dyn Dataset>,
        presenter: Arc<dyn Presenter>,
        quorum: usize,
    ) -> Self {
        Self {
            tally: ApprovalTally::new(repo.clone()),
            chain: CorrectionChain::new(repo.clone()),
            interpreter: EffectInterpreter::new(repo.clone(), dataset, presenter, quorum),
            repo,
            quorum,
        }
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn chain(&self) -> &CorrectionChain {
        &self.chain
    }

    pub fn interpreter(&self) -> &EffectInterpreter {
        &self.interpreter
    }

    /// Record a vote and finalize the proposal if it reached quorum.
    ///
    /// `AlreadyVoted` is reported through `VoteReport::vote`, not as an
    /// error.
    pub async fn vote(
        &self,
        proposal: &Proposal,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<VoteReport, FlowError> {
        let (state, chain) = self.snapshot(proposal).await?;
        transition(&state, LifecycleEvent::VoteRequested { kind }, self.quorum).map_err(|c| {
            warn!(proposal = %proposal.id, user = %user, conflict = %c, "vote rejected");
            c
        })?;

        let vote = self.tally.vote(proposal.id, user, kind).await?;
        let count = match vote {
            VoteOutcome::AlreadyVoted { .. } => {
                return Ok(VoteReport {
                    vote,
                    finalized: None,
                })
            }
            VoteOutcome::Recorded { count, .. } => count,
        };
        info!(proposal = %proposal.id, user = %user, %kind, count, quorum = self.quorum, "vote recorded");

        let result = transition(
            &state,
            LifecycleEvent::VoteCounted { kind, count },
            self.quorum,
        )?;
        let previous = previous_fields(proposal, &chain);
        let finalized = match self
            .interpreter
            .execute(proposal, previous, result.effects)
            .await?
        {
            Execution::Completed { finalized } => finalized,
            Execution::ClaimLost => None,
        };
        Ok(VoteReport { vote, finalized })
    }

    /// Merge the current tip of a suggestion's chain without waiting for
    /// votes. Fails with `AlreadyFinalized` if the tip is not pending.
    pub async fn merge_tip(&self, suggestion: ProposalId) -> Result<Proposal, FlowError> {
        let tip = self.chain.tip_of(suggestion).await?;
        self.resolve(&tip, Outcome::Merged).await?;
        Ok(tip)
    }

    /// Finalize `proposal` with `outcome`, running the same side effects a
    /// quorum would.
    pub async fn resolve(&self, proposal: &Proposal, outcome: Outcome) -> Result<(), FlowError> {
        let (state, chain) = self.snapshot(proposal).await?;
        let result = transition(&state, LifecycleEvent::Resolve { outcome }, self.quorum)?;
        let previous = previous_fields(proposal, &chain);
        match self
            .interpreter
            .execute(proposal, previous, result.effects)
            .await?
        {
            Execution::Completed { .. } => Ok(()),
            Execution::ClaimLost => {
                let status = self
                    .repo
                    .get(proposal.id)
                    .await?
                    .map_or(outcome.into(), |p| p.status());
                Err(Conflict::AlreadyFinalized { status }.into())
            }
        }
    }

    /// Current state of `proposal` plus its loaded chain.
    async fn snapshot(&self, proposal: &Proposal) -> Result<(ProposalState, Chain), FlowError> {
        let chain = self.chain.load(proposal.root_id()).await?;
        let current = if proposal.kind.is_suggestion() {
            chain.root.clone()
        } else {
            chain
                .corrections
                .iter()
                .find(|c| c.id == proposal.id)
                .cloned()
                .ok_or_else(|| FlowError::not_found(format!("correction {}", proposal.id)))?
        };

        let target = match current.kind {
            ProposalKind::Suggestion => MergeTarget::NewItem,
            ProposalKind::Correction { target } if chain.root.is_merged() => {
                let joke_id = chain.root.joke_id.ok_or_else(|| {
                    RepositoryError::corruption(format!(
                        "merged suggestion {} has no joke id",
                        target
                    ))
                })?;
                MergeTarget::PublishedJoke {
                    root: target,
                    joke_id,
                }
            }
            ProposalKind::Correction { target } => MergeTarget::PendingSuggestion { root: target },
        };

        let state = ProposalState {
            id: current.id,
            kind: current.kind,
            status: current.status(),
            payload: current.payload.clone(),
            position: chain.position_of(&current),
            target,
        };
        Ok((state, chain))
    }
}

fn previous_fields<'a>(proposal: &Proposal, chain: &'a Chain) -> Option<&'a JokePayload> {
    match proposal.kind {
        ProposalKind::Suggestion => None,
        ProposalKind::Correction { .. } => Some(&chain.root.payload),
    }
}
