//! Executes lifecycle effects against the repository, the dataset and the
//! presenter.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::effect::Effect;
use crate::dataset::Dataset;
use crate::error::FlowError;
use crate::joke::JokePayload;
use crate::presentation::{
    render_correction, render_suggestion, Presenter, ProposalView, VoteSummary,
};
use crate::proposal::{Outcome, Proposal, ProposalKind, VoteKind};
use crate::repository::ProposalRepository;

/// What running a batch of effects achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Every effect ran. `finalized` is set when this call won the claim.
    Completed { finalized: Option<Outcome> },
    /// Another flow finalized the proposal first; nothing was written.
    ClaimLost,
}

#[derive(Clone)]
pub struct EffectInterpreter {
    repo: Arc<dyn ProposalRepository>,
    dataset: Arc<dyn Dataset>,
    presenter: Arc<dyn Presenter>,
    quorum: usize,
}

impl EffectInterpreter {
    pub fn new(
        repo: Arc<dyn ProposalRepository>,
        dataset: Arc<dyn Dataset>,
        presenter: Arc<dyn Presenter>,
        quorum: usize,
    ) -> Self {
        Self {
            repo,
            dataset,
            presenter,
            quorum,
        }
    }

    /// Run `effects` for `proposal` in order.
    ///
    /// `previous` is the content a correction amends, captured before any
    /// effect rewrites it. A failed write releases the claim taken by this
    /// batch, so the proposal stays pending and the next vote retries the
    /// merge. A failed refresh is only logged since every write already
    /// happened.
    pub async fn execute(
        &self,
        proposal: &Proposal,
        previous: Option<&JokePayload>,
        effects: Vec<Effect>,
    ) -> Result<Execution, FlowError> {
        let mut finalized = None;

        for effect in effects {
            match effect {
                Effect::Claim { outcome } => {
                    if !self.repo.finalize(proposal.id, outcome).await? {
                        info!(proposal = %proposal.id, ?outcome, "proposal already finalized by another flow");
                        return Ok(Execution::ClaimLost);
                    }
                    info!(proposal = %proposal.id, ?outcome, "proposal finalized");
                    finalized = Some(outcome);
                }

                Effect::Refresh => {
                    if let Err(err) = self.refresh(proposal, previous).await {
                        warn!(proposal = %proposal.id, error = %err, "failed to refresh proposal presentation");
                    }
                }

                write => {
                    if let Err(err) = self.apply(proposal, write).await {
                        if let Some(outcome) = finalized {
                            self.release(proposal, outcome).await;
                        }
                        return Err(err);
                    }
                }
            }
        }

        Ok(Execution::Completed { finalized })
    }

    async fn apply(&self, proposal: &Proposal, effect: Effect) -> Result<(), FlowError> {
        match effect {
            Effect::AppendItem { payload } => {
                // A previous attempt may have appended the item before failing to
                // link it; reuse it instead of adding it twice.
                let existing = self
                    .dataset
                    .find_by_question(&payload.question)
                    .await?
                    .filter(|joke| joke.payload() == payload);
                let joke = match existing {
                    Some(joke) => joke,
                    None => self.dataset.append_item(payload).await.map_err(|err| {
                        error!(proposal = %proposal.id, error = %err, "merged suggestion could not be added to the dataset");
                        err
                    })?,
                };
                self.repo.set_joke_id(proposal.id, joke.id).await?;
                info!(proposal = %proposal.id, joke = %joke.id, "joke added");
            }

            Effect::ApplyCorrection {
                root,
                joke_id,
                payload,
            } => {
                if let Some(joke_id) = joke_id {
                    self.dataset
                        .replace_item(joke_id, payload.clone())
                        .await
                        .map_err(|err| {
                            error!(proposal = %proposal.id, joke = %joke_id, error = %err, "merged correction could not be applied to the dataset");
                            err
                        })?;
                }
                self.repo.update_payload(root, payload).await?;
                info!(proposal = %proposal.id, suggestion = %root, joke = ?joke_id, "correction applied");
            }

            Effect::Claim { .. } | Effect::Refresh => {}
        }
        Ok(())
    }

    /// Put a claimed proposal back to pending after its side effects failed.
    async fn release(&self, proposal: &Proposal, outcome: Outcome) {
        match self.repo.release(proposal.id, outcome).await {
            Ok(true) => {
                warn!(proposal = %proposal.id, ?outcome, "side effects failed, proposal is pending again")
            }
            Ok(false) => {
                error!(proposal = %proposal.id, ?outcome, "side effects failed and the claim could not be released")
            }
            Err(err) => {
                error!(proposal = %proposal.id, ?outcome, error = %err, "side effects failed and releasing the claim failed")
            }
        }
    }

    /// Re-render a proposal from its persisted state.
    pub async fn refresh(
        &self,
        proposal: &Proposal,
        previous: Option<&JokePayload>,
    ) -> Result<(), FlowError> {
        let current = self
            .repo
            .get(proposal.id)
            .await?
            .ok_or_else(|| FlowError::not_found(format!("proposal {}", proposal.id)))?;
        let votes = VoteSummary {
            approvers: self.repo.voters(current.id, VoteKind::Approval).await?,
            disapprovers: self.repo.voters(current.id, VoteKind::Disapproval).await?,
            quorum: self.quorum,
        };

        let display = match (&current.kind, previous) {
            (ProposalKind::Correction { .. }, Some(previous)) => {
                render_correction(ProposalView::from(&current), previous, &votes)
            }
            _ => render_suggestion(ProposalView::from(&current), &votes, None),
        };
        self.presenter.edit(&current.external_ref, display).await?;
        Ok(())
    }
}
