//! Pure lifecycle transition function.
//!
//! Given a proposal snapshot and an event, returns the next status and the
//! effects to run, or the conflict that rejects the event. No I/O happens
//! here.

use super::effect::Effect;
use super::event::LifecycleEvent;
use super::state::{MergeTarget, ProposalState};
use crate::error::Conflict;
use crate::proposal::{Outcome, ProposalStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub status: ProposalStatus,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    fn new(status: ProposalStatus, effects: Vec<Effect>) -> Self {
        Self { status, effects }
    }

    fn no_change(status: ProposalStatus) -> Self {
        Self::new(status, vec![])
    }
}

pub fn transition(
    state: &ProposalState,
    event: LifecycleEvent,
    quorum: usize,
) -> Result<TransitionResult, Conflict> {
    if state.status.is_terminal() {
        return Err(Conflict::AlreadyFinalized {
            status: state.status,
        });
    }
    state.position.check()?;

    match event {
        LifecycleEvent::VoteRequested { .. } => Ok(TransitionResult::no_change(state.status)),

        LifecycleEvent::VoteCounted { kind, count } if count >= quorum => {
            Ok(finalize(state, kind.outcome()))
        }

        LifecycleEvent::VoteCounted { .. } => {
            Ok(TransitionResult::new(state.status, vec![Effect::Refresh]))
        }

        LifecycleEvent::Resolve { outcome } => Ok(finalize(state, outcome)),
    }
}

fn finalize(state: &ProposalState, outcome: Outcome) -> TransitionResult {
    let mut effects = vec![Effect::Claim { outcome }];

    if outcome == Outcome::Merged {
        effects.push(match &state.target {
            MergeTarget::NewItem => Effect::AppendItem {
                payload: state.payload.clone(),
            },
            MergeTarget::PendingSuggestion { root } => Effect::ApplyCorrection {
                root: *root,
                joke_id: None,
                payload: state.payload.clone(),
            },
            MergeTarget::PublishedJoke { root, joke_id } => Effect::ApplyCorrection {
                root: *root,
                joke_id: Some(*joke_id),
                payload: state.payload.clone(),
            },
        });
    }

    effects.push(Effect::Refresh);
    TransitionResult::new(outcome.into(), effects)
}
