//! Side effects of lifecycle transitions, as data.
//!
//! The interpreter executes them in order. `Claim` always comes first when
//! present: if another flow already finalized the proposal, the remaining
//! effects are skipped.

use crate::joke::{JokeId, JokePayload};
use crate::proposal::{Outcome, ProposalId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Conditionally move the proposal to its terminal status.
    Claim { outcome: Outcome },

    /// Append a merged suggestion to the dataset and remember the new id.
    AppendItem { payload: JokePayload },

    /// Fold a merged correction into its chain's root.
    ApplyCorrection {
        root: ProposalId,
        /// Dataset item to replace, when the root is published.
        joke_id: Option<JokeId>,
        payload: JokePayload,
    },

    /// Re-render the proposal's presentation from persisted state.
    Refresh,
}

impl Effect {
    /// Whether the effect writes to the dataset or the repository.
    pub fn is_write(&self) -> bool {
        !matches!(self, Effect::Refresh)
    }
}
