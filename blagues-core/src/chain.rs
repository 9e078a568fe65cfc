//! Correction chains.
//!
//! A chain is the suggestion plus every correction targeting it, ordered by
//! creation. The tip is the newest correction that is still pending, or the
//! suggestion itself when there is none. Older corrections are never flagged;
//! their inertness is recomputed from the existence of a newer tip.

use std::sync::Arc;

use tracing::info;

use crate::error::{Conflict, FlowError};
use crate::joke::JokePayload;
use crate::proposal::{ExternalRef, NewProposal, Proposal, ProposalId, UserId};
use crate::repository::ProposalRepository;

/// Where a proposal sits relative to its chain's tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainPosition {
    /// The proposal is the tip and may be voted on.
    Tip,
    /// A newer pending correction replaced this correction.
    Superseded { tip: ExternalRef },
    /// This suggestion has a pending correction that must be resolved first.
    Blocked { correction: ExternalRef },
}

impl ChainPosition {
    pub fn check(&self) -> Result<(), Conflict> {
        match self {
            ChainPosition::Tip => Ok(()),
            ChainPosition::Superseded { tip } => {
                Err(Conflict::SupersededByNewerCorrection { tip: tip.clone() })
            }
            ChainPosition::Blocked { correction } => Err(Conflict::PendingCorrectionExists {
                correction: correction.clone(),
            }),
        }
    }
}

/// A loaded chain: its root suggestion and its corrections, oldest first.
#[derive(Debug, Clone)]
pub struct Chain {
    pub root: Proposal,
    pub corrections: Vec<Proposal>,
}

impl Chain {
    pub fn tip(&self) -> &Proposal {
        self.corrections
            .iter()
            .rev()
            .find(|c| c.is_pending())
            .unwrap_or(&self.root)
    }

    /// The content the chain currently stands for.
    ///
    /// Merged corrections are folded into the root, so this is the root's
    /// payload unless a correction is pending.
    pub fn current_fields(&self) -> &JokePayload {
        &self.tip().payload
    }

    pub fn position_of(&self, proposal: &Proposal) -> ChainPosition {
        let tip = self.tip();
        if tip.id == proposal.id {
            return ChainPosition::Tip;
        }
        if proposal.kind.is_suggestion() {
            ChainPosition::Blocked {
                correction: tip.external_ref.clone(),
            }
        } else {
            ChainPosition::Superseded {
                tip: tip.external_ref.clone(),
            }
        }
    }

    /// Reject a correction that changes nothing or repeats an open one.
    pub fn validate_correction(&self, fields: &JokePayload) -> Result<(), Conflict> {
        if self.current_fields() == fields {
            return Err(Conflict::NoChangesProposed);
        }
        if self
            .corrections
            .iter()
            .any(|c| c.is_pending() && &c.payload == fields)
        {
            return Err(Conflict::DuplicateCorrection);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct CorrectionChain {
    repo: Arc<dyn ProposalRepository>,
}

impl CorrectionChain {
    pub fn new(repo: Arc<dyn ProposalRepository>) -> Self {
        Self { repo }
    }

    /// Load the chain rooted at `suggestion`.
    pub async fn load(&self, suggestion: ProposalId) -> Result<Chain, FlowError> {
        let root = self
            .repo
            .get(suggestion)
            .await?
            .filter(|p| p.kind.is_suggestion())
            .ok_or_else(|| FlowError::not_found(format!("suggestion {}", suggestion)))?;
        let corrections = self.repo.chain_for(root.id).await?;
        Ok(Chain { root, corrections })
    }

    pub async fn tip_of(&self, suggestion: ProposalId) -> Result<Proposal, FlowError> {
        Ok(self.load(suggestion).await?.tip().clone())
    }

    /// Check `fields` against the chain without writing anything.
    pub async fn validate_correction(
        &self,
        suggestion: ProposalId,
        fields: &JokePayload,
    ) -> Result<Chain, FlowError> {
        let chain = self.load(suggestion).await?;
        chain.validate_correction(fields)?;
        Ok(chain)
    }

    /// Create a correction of `suggestion`, which becomes the new tip.
    pub async fn propose_correction(
        &self,
        suggestion: ProposalId,
        fields: JokePayload,
        submitter: UserId,
        external_ref: ExternalRef,
    ) -> Result<Proposal, FlowError> {
        let chain = self.validate_correction(suggestion, &fields).await?;
        let correction = self
            .repo
            .create_proposal(NewProposal::correction(
                chain.root.id,
                submitter,
                external_ref,
                fields,
            ))
            .await?;
        info!(
            suggestion = %chain.root.id,
            correction = %correction.id,
            "correction proposed"
        );
        Ok(correction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::Outcome;
    use crate::repository::InMemoryRepository;

    fn fields(q: &str) -> JokePayload {
        JokePayload::parse("global", q, "A1").unwrap()
    }

    async fn setup() -> (CorrectionChain, Arc<InMemoryRepository>, Proposal) {
        let repo = Arc::new(InMemoryRepository::new());
        let root = repo
            .create_proposal(NewProposal::suggestion(
                UserId::from("author"),
                ExternalRef::from("s1"),
                fields("Q1"),
            ))
            .await
            .unwrap();
        (CorrectionChain::new(repo.clone()), repo, root)
    }

    async fn correct(chain: &CorrectionChain, root: &Proposal, q: &str, msg: &str) -> Proposal {
        chain
            .propose_correction(
                root.id,
                fields(q),
                UserId::from("fixer"),
                ExternalRef::from(msg),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_chain_tip_is_suggestion() {
        let (chain, _, root) = setup().await;
        assert_eq!(chain.tip_of(root.id).await.unwrap().id, root.id);
    }

    #[tokio::test]
    async fn test_newest_pending_correction_is_tip() {
        let (chain, _, root) = setup().await;
        let c1 = correct(&chain, &root, "Q2", "c1").await;
        let c2 = correct(&chain, &root, "Q3", "c2").await;

        let loaded = chain.load(root.id).await.unwrap();
        assert_eq!(loaded.tip().id, c2.id);
        assert_eq!(
            loaded.position_of(&c1),
            ChainPosition::Superseded {
                tip: ExternalRef::from("c2")
            }
        );
        assert_eq!(loaded.position_of(&c2), ChainPosition::Tip);
        assert_eq!(
            loaded.position_of(&root),
            ChainPosition::Blocked {
                correction: ExternalRef::from("c2")
            }
        );
    }

    #[tokio::test]
    async fn test_finalized_corrections_hand_tip_back() {
        let (chain, repo, root) = setup().await;
        let c1 = correct(&chain, &root, "Q2", "c1").await;
        let c2 = correct(&chain, &root, "Q3", "c2").await;

        repo.finalize(c2.id, Outcome::Refused).await.unwrap();
        assert_eq!(chain.tip_of(root.id).await.unwrap().id, c1.id);

        repo.finalize(c1.id, Outcome::Merged).await.unwrap();
        assert_eq!(chain.tip_of(root.id).await.unwrap().id, root.id);
    }

    #[tokio::test]
    async fn test_unchanged_fields_are_rejected() {
        let (chain, _, root) = setup().await;
        let err = chain
            .propose_correction(
                root.id,
                fields("Q1"),
                UserId::from("fixer"),
                ExternalRef::from("c1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Conflict(Conflict::NoChangesProposed)));
    }

    #[tokio::test]
    async fn test_repeated_open_correction_is_duplicate() {
        let (chain, _, root) = setup().await;
        correct(&chain, &root, "Q2", "c1").await;
        correct(&chain, &root, "Q3", "c2").await;

        let err = chain
            .propose_correction(
                root.id,
                fields("Q2"),
                UserId::from("other"),
                ExternalRef::from("c3"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Conflict(Conflict::DuplicateCorrection)));
    }

    #[tokio::test]
    async fn test_correction_cannot_root_a_chain() {
        let (chain, _, root) = setup().await;
        let c1 = correct(&chain, &root, "Q2", "c1").await;
        let err = chain.load(c1.id).await.unwrap_err();
        assert!(matches!(err, FlowError::NotFound { .. }));
    }
}
