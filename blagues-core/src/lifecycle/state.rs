//! Snapshot of a proposal as seen by the lifecycle transition function.

use crate::chain::ChainPosition;
use crate::joke::{JokeId, JokePayload};
use crate::proposal::{ProposalId, ProposalKind, ProposalStatus};

/// What merging a proposal writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeTarget {
    /// A suggestion becomes a new dataset item.
    NewItem,
    /// A correction of a suggestion that is still under review rewrites
    /// that suggestion's content.
    PendingSuggestion { root: ProposalId },
    /// A correction of a published joke replaces the dataset item.
    PublishedJoke { root: ProposalId, joke_id: JokeId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalState {
    pub id: ProposalId,
    pub kind: ProposalKind,
    pub status: ProposalStatus,
    pub payload: JokePayload,
    pub position: ChainPosition,
    pub target: MergeTarget,
}
