//! Proposal and vote types.
//!
//! A proposal is either a new joke suggestion or a correction of one. The
//! `merged`/`refused` flags are exposed only through [`ProposalStatus`], so
//! callers never observe both set at once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::joke::{JokeId, JokePayload};

/// Newtype for a persisted proposal id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub i64);

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Newtype for a chat user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque handle to a message rendered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalRef(pub String);

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExternalRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExternalRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What a proposal amends, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalKind {
    Suggestion,
    /// `target` is always the root suggestion of the chain.
    Correction { target: ProposalId },
}

impl ProposalKind {
    pub fn is_suggestion(&self) -> bool {
        matches!(self, ProposalKind::Suggestion)
    }

    pub fn noun(&self) -> &'static str {
        match self {
            ProposalKind::Suggestion => "suggestion",
            ProposalKind::Correction { .. } => "correction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Merged,
    Refused,
}

impl ProposalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Merged => write!(f, "merged"),
            Self::Refused => write!(f, "refused"),
        }
    }
}

/// Terminal outcome of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Merged,
    Refused,
}

impl From<Outcome> for ProposalStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Merged => ProposalStatus::Merged,
            Outcome::Refused => ProposalStatus::Refused,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    Approval,
    Disapproval,
}

impl VoteKind {
    pub fn opposite(self) -> Self {
        match self {
            VoteKind::Approval => VoteKind::Disapproval,
            VoteKind::Disapproval => VoteKind::Approval,
        }
    }

    /// The terminal outcome reached when this vote kind hits quorum.
    pub fn outcome(self) -> Outcome {
        match self {
            VoteKind::Approval => Outcome::Merged,
            VoteKind::Disapproval => Outcome::Refused,
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approval => write!(f, "approval"),
            Self::Disapproval => write!(f, "disapproval"),
        }
    }
}

/// A persisted proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub kind: ProposalKind,
    pub submitter: UserId,
    pub external_ref: ExternalRef,
    pub payload: JokePayload,
    /// Dataset item this suggestion became (or was created from).
    pub joke_id: Option<JokeId>,
    pub(crate) merged: bool,
    pub(crate) refused: bool,
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    /// Rebuild a proposal from stored columns.
    ///
    /// Rows with both flags set are storage corruption; `None` is returned so
    /// the caller can report it.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: ProposalId,
        kind: ProposalKind,
        submitter: UserId,
        external_ref: ExternalRef,
        payload: JokePayload,
        joke_id: Option<JokeId>,
        merged: bool,
        refused: bool,
        created_at: DateTime<Utc>,
    ) -> Option<Self> {
        if merged && refused {
            return None;
        }
        Some(Self {
            id,
            kind,
            submitter,
            external_ref,
            payload,
            joke_id,
            merged,
            refused,
            created_at,
        })
    }

    pub fn status(&self) -> ProposalStatus {
        match (self.merged, self.refused) {
            (true, _) => ProposalStatus::Merged,
            (false, true) => ProposalStatus::Refused,
            (false, false) => ProposalStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == ProposalStatus::Pending
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }

    pub fn is_refused(&self) -> bool {
        self.refused
    }

    /// Id of the chain root: the suggestion itself or the correction's target.
    pub fn root_id(&self) -> ProposalId {
        match self.kind {
            ProposalKind::Suggestion => self.id,
            ProposalKind::Correction { target } => target,
        }
    }

    /// Apply a terminal outcome in memory. Returns false when already final.
    pub(crate) fn finalize(&mut self, outcome: Outcome) -> bool {
        if !self.is_pending() {
            return false;
        }
        match outcome {
            Outcome::Merged => self.merged = true,
            Outcome::Refused => self.refused = true,
        }
        true
    }

    /// Inverse of `finalize` for a claim whose side effects failed.
    pub(crate) fn release(&mut self, outcome: Outcome) -> bool {
        if self.joke_id.is_some() && self.kind.is_suggestion() {
            return false;
        }
        let flag = match outcome {
            Outcome::Merged => &mut self.merged,
            Outcome::Refused => &mut self.refused,
        };
        std::mem::replace(flag, false)
    }
}

/// Everything needed to create a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProposal {
    pub kind: ProposalKind,
    pub submitter: UserId,
    pub external_ref: ExternalRef,
    pub payload: JokePayload,
    pub joke_id: Option<JokeId>,
    /// Only set for root records of already-published jokes.
    pub merged: bool,
}

impl NewProposal {
    pub fn suggestion(submitter: UserId, external_ref: ExternalRef, payload: JokePayload) -> Self {
        Self {
            kind: ProposalKind::Suggestion,
            submitter,
            external_ref,
            payload,
            joke_id: None,
            merged: false,
        }
    }

    pub fn correction(
        target: ProposalId,
        submitter: UserId,
        external_ref: ExternalRef,
        payload: JokePayload,
    ) -> Self {
        Self {
            kind: ProposalKind::Correction { target },
            submitter,
            external_ref,
            payload,
            joke_id: None,
            merged: false,
        }
    }

    /// Root record for a joke that was published without going through a
    /// suggestion, so that corrections of it have a chain to hang off.
    pub fn published(joke_id: JokeId, external_ref: ExternalRef, payload: JokePayload) -> Self {
        Self {
            kind: ProposalKind::Suggestion,
            submitter: UserId::from("dataset"),
            external_ref,
            payload,
            joke_id: Some(joke_id),
            merged: true,
        }
    }
}

/// Filter for [`crate::repository::ProposalRepository::list_proposals`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProposalFilter {
    /// `Some(true)` for suggestions only, `Some(false)` for corrections only.
    pub suggestions: Option<bool>,
    pub status: Option<ProposalStatus>,
}

impl ProposalFilter {
    pub fn pending_suggestions() -> Self {
        Self {
            suggestions: Some(true),
            status: Some(ProposalStatus::Pending),
        }
    }

    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.suggestions
            .map_or(true, |s| s == proposal.kind.is_suggestion())
            && self.status.map_or(true, |s| s == proposal.status())
    }
}

/// Who is acting, as asserted by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
    /// Role gating happens in the transport; this flag is trusted.
    #[serde(default)]
    pub moderator: bool,
}

impl Actor {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>, moderator: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            moderator,
        }
    }
}
