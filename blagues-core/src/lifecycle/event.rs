//! Events fed to the lifecycle transition function.

use crate::proposal::{Outcome, VoteKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A user asked to vote. Only guards run; nothing is written yet.
    VoteRequested { kind: VoteKind },
    /// A vote was persisted and `count` votes of `kind` are now confirmed.
    VoteCounted { kind: VoteKind, count: usize },
    /// Finalize without a vote, e.g. an operator merging the tip directly.
    Resolve { outcome: Outcome },
}
