//! Repository abstraction for proposal and vote persistence.
//!
//! This module defines the `ProposalRepository` trait that abstracts
//! storage of proposals and their votes. The in-memory backend lives here;
//! the SQLite backend lives in the server crate.
//!
//! Two guarantees every backend must provide, since the engine takes no
//! in-process lock:
//! - `cast_vote` is atomic: the opposite vote of the same user is removed
//!   and the new one inserted as one write, and the `(proposal, user)` pair
//!   is unique per vote kind.
//! - `finalize` is a conditional write: it only succeeds while the proposal
//!   is neither merged nor refused, and reports whether it did. `release`
//!   is its conditional inverse, used only when the side effects of the
//!   claim failed.

mod memory;

pub use memory::InMemoryRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::joke::{JokeId, JokePayload};
use crate::proposal::{
    ExternalRef, NewProposal, Outcome, Proposal, ProposalFilter, ProposalId, UserId, VoteKind,
};

/// Errors from repository operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The backend failed (I/O, lock, driver error).
    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
    /// Stored data could not be decoded.
    #[error("corrupt stored data: {what}")]
    Corruption { what: String },
    /// A uniqueness or reference constraint rejected the write.
    #[error("constraint violated: {message}")]
    Constraint { message: String },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }
}

/// Result of writing a single vote row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteWrite {
    Inserted {
        /// The same user's opposite vote was removed in the same write.
        replaced_opposite: bool,
    },
    /// The user already holds this vote; nothing changed.
    AlreadyPresent,
}

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn create_proposal(&self, new: NewProposal) -> Result<Proposal, RepositoryError>;

    async fn get(&self, id: ProposalId) -> Result<Option<Proposal>, RepositoryError>;

    async fn find_by_external_ref(
        &self,
        external_ref: &ExternalRef,
    ) -> Result<Option<Proposal>, RepositoryError>;

    /// The suggestion record that carries `joke_id`, if any.
    async fn find_published(&self, joke_id: JokeId) -> Result<Option<Proposal>, RepositoryError>;

    /// Conditional terminal transition. Returns `true` only for the call that
    /// moved the proposal out of the pending state.
    async fn finalize(&self, id: ProposalId, outcome: Outcome) -> Result<bool, RepositoryError>;

    /// Undo a claim whose merge or refusal could not be applied.
    ///
    /// Clears the flag `outcome` set, only while it is set and the proposal
    /// is not linked to a dataset item. Returns whether the proposal is
    /// pending again.
    async fn release(&self, id: ProposalId, outcome: Outcome) -> Result<bool, RepositoryError>;

    async fn set_joke_id(&self, id: ProposalId, joke_id: JokeId) -> Result<(), RepositoryError>;

    async fn update_payload(
        &self,
        id: ProposalId,
        payload: JokePayload,
    ) -> Result<(), RepositoryError>;

    /// Remove a proposal and its votes. Used when its message vanished.
    async fn delete_proposal(&self, id: ProposalId) -> Result<(), RepositoryError>;

    /// Insert a vote, unless the user already holds it.
    async fn add_vote(
        &self,
        id: ProposalId,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<VoteWrite, RepositoryError>;

    /// Remove a vote. Returns whether a row was removed.
    async fn remove_vote(
        &self,
        id: ProposalId,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<bool, RepositoryError>;

    /// Atomically drop the user's opposite vote and record this one.
    async fn cast_vote(
        &self,
        id: ProposalId,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<VoteWrite, RepositoryError>;

    /// Users holding a vote of `kind`, in the order they voted.
    async fn voters(&self, id: ProposalId, kind: VoteKind)
        -> Result<Vec<UserId>, RepositoryError>;

    async fn count_votes(&self, id: ProposalId, kind: VoteKind) -> Result<usize, RepositoryError> {
        Ok(self.voters(id, kind).await?.len())
    }

    /// Proposals matching `filter`, oldest first.
    async fn list_proposals(
        &self,
        filter: ProposalFilter,
    ) -> Result<Vec<Proposal>, RepositoryError>;

    /// Corrections targeting `suggestion`, ordered by creation.
    async fn chain_for(&self, suggestion: ProposalId) -> Result<Vec<Proposal>, RepositoryError>;
}
