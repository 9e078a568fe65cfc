//! Error taxonomy for user-initiated flows.
//!
//! Validation and conflict errors are expected outcomes: the flow boundary
//! turns them into an explanatory reply. Storage, dataset and transport
//! failures abort the flow with a generic failure reply.

use std::fmt;

use thiserror::Error;

use crate::dataset::DatasetError;
use crate::presentation::TransportError;
use crate::proposal::{ExternalRef, ProposalStatus, VoteKind};
use crate::repository::RepositoryError;

/// A request that is well-formed but clashes with the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The proposal is already merged or refused.
    AlreadyFinalized { status: ProposalStatus },
    /// The user already cast this exact vote.
    AlreadyVoted { kind: VoteKind },
    /// A correction left every field unchanged.
    NoChangesProposed,
    /// An open correction in the chain already carries the same fields.
    DuplicateCorrection,
    /// The suggestion has an open correction that must be resolved first.
    PendingCorrectionExists { correction: ExternalRef },
    /// A newer correction replaced this one; votes go to the tip.
    SupersededByNewerCorrection { tip: ExternalRef },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyFinalized { status } => write!(f, "proposal is already {}", status),
            Self::AlreadyVoted { kind } => write!(f, "vote already recorded ({})", kind),
            Self::NoChangesProposed => write!(f, "no field was changed"),
            Self::DuplicateCorrection => write!(f, "this correction was already proposed"),
            Self::PendingCorrectionExists { correction } => {
                write!(f, "correction {} must be resolved first", correction)
            }
            Self::SupersededByNewerCorrection { tip } => {
                write!(f, "superseded by newer correction {}", tip)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid input: {message}")]
    Validation { message: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("conflict: {0}")]
    Conflict(Conflict),

    #[error("timed out waiting for a reply")]
    TimedOut,

    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FlowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
        }
    }

    /// Whether the error is an expected outcome the user can act on, as
    /// opposed to an infrastructure failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Repository(_) | Self::Dataset(_) | Self::Transport(_)
        )
    }
}

impl From<Conflict> for FlowError {
    fn from(conflict: Conflict) -> Self {
        Self::Conflict(conflict)
    }
}
