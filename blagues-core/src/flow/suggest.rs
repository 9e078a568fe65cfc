use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{FlowOutcome, SubmissionFlow};
use crate::collector::InteractiveCollector;
use crate::error::FlowError;
use crate::joke::JokePayload;
use crate::presentation::{
    cancelled, controls, render_confirmation, render_suggestion, Board, ProposalView, VoteSummary,
};
use crate::proposal::{Actor, NewProposal, ProposalFilter, ProposalKind};
use crate::similarity::{best_match, SimilarityVerdict};

/// Suggestion fields as typed by the user, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSuggestion {
    pub category: String,
    pub question: String,
    pub answer: String,
}

impl SubmissionFlow {
    /// Published jokes followed by suggestions still under review.
    async fn similarity_corpus(&self) -> Result<Vec<JokePayload>, FlowError> {
        let mut corpus: Vec<JokePayload> = self
            .dataset
            .all_items()
            .await?
            .iter()
            .map(|joke| joke.payload())
            .collect();
        corpus.extend(
            self.repo
                .list_proposals(ProposalFilter::pending_suggestions())
                .await?
                .into_iter()
                .map(|p| p.payload),
        );
        Ok(corpus)
    }

    pub async fn suggest(
        &self,
        collector: &mut InteractiveCollector,
        actor: &Actor,
        raw: RawSuggestion,
    ) -> Result<FlowOutcome, FlowError> {
        let payload = JokePayload::parse(&raw.category, &raw.question, &raw.answer)?;

        let corpus = self.similarity_corpus().await?;
        let texts: Vec<String> = corpus.iter().map(JokePayload::similarity_text).collect();
        let found = best_match(&payload.similarity_text(), &texts);
        let similar = match self.settings.similarity().classify(found) {
            SimilarityVerdict::Duplicate { index, score } => {
                info!(user = %actor.id, score, "suggestion rejected as duplicate");
                return Ok(FlowOutcome::Duplicate {
                    matched: corpus[index].clone(),
                    score,
                });
            }
            SimilarityVerdict::Similar { index, .. } => Some(&corpus[index]),
            SimilarityVerdict::Distinct => None,
        };

        let prompt = collector
            .prompt(render_confirmation(&payload, similar))
            .await?;
        let choice = collector
            .collect(
                |event| {
                    matches!(
                        event.button_on(&prompt),
                        Some(controls::SEND) | Some(controls::CANCEL)
                    )
                },
                self.settings.confirm_window,
            )
            .await?;
        if choice.button_on(&prompt) == Some(controls::CANCEL) {
            return Ok(FlowOutcome::NotSent { payload });
        }

        let kind = ProposalKind::Suggestion;
        let votes = VoteSummary {
            quorum: self.settings.quorum,
            ..VoteSummary::default()
        };
        let display = render_suggestion(ProposalView::draft(&kind, &actor.id, &payload), &votes, similar);
        let external_ref = self
            .presenter
            .publish(Board::Suggestions, display.clone())
            .await?;

        let created = self
            .repo
            .create_proposal(NewProposal::suggestion(
                actor.id.clone(),
                external_ref.clone(),
                payload,
            ))
            .await;
        let proposal = match created {
            Ok(proposal) => proposal,
            Err(err) => {
                error!(user = %actor.id, message = %external_ref, error = %err, "suggestion published but not stored");
                if let Err(edit_err) = self.presenter.edit(&external_ref, cancelled(&display)).await {
                    error!(message = %external_ref, error = %edit_err, "failed to withdraw orphan suggestion");
                }
                return Err(err.into());
            }
        };

        info!(proposal = %proposal.id, user = %actor.id, message = %external_ref, "suggestion submitted");
        Ok(FlowOutcome::Submitted { external_ref })
    }
}
