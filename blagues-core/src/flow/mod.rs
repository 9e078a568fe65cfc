//! User-facing flows: suggest, correct, approve and disapprove.
//!
//! Each request runs as its own task with its own collector. Flows share
//! nothing but the injected repository, dataset, presenter and event hub.

mod correct;
mod suggest;
mod vote;

pub use crate::presentation::FlowOutcome;
pub use suggest::RawSuggestion;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::collector::{EventHub, InteractiveCollector};
use crate::dataset::Dataset;
use crate::error::FlowError;
use crate::lifecycle::ProposalLifecycle;
use crate::presentation::{render_error, render_outcome, Conversation, Presenter};
use crate::proposal::{Actor, ExternalRef};
use crate::repository::ProposalRepository;
use crate::similarity::SimilarityPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Votes of one kind needed to finalize a proposal.
    pub quorum: usize,
    pub duplicate_threshold: f64,
    pub similar_threshold: f64,
    pub confirm_window: Duration,
    pub identify_window: Duration,
    pub change_window: Duration,
    /// `None` re-prompts for an identifier until the window runs out.
    pub max_identify_attempts: Option<u32>,
    pub max_change_rounds: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            quorum: 5,
            duplicate_threshold: 0.8,
            similar_threshold: 0.6,
            confirm_window: Duration::from_secs(60),
            identify_window: Duration::from_secs(10),
            change_window: Duration::from_secs(30),
            max_identify_attempts: None,
            max_change_rounds: 25,
        }
    }
}

impl EngineSettings {
    fn similarity(&self) -> SimilarityPolicy {
        SimilarityPolicy {
            duplicate_threshold: self.duplicate_threshold,
            similar_threshold: self.similar_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Suggest(RawSuggestion),
    Correct { identifier: String },
    Approve { target: ExternalRef },
    Disapprove { target: ExternalRef },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Suggest(_) => "suggest",
            Command::Correct { .. } => "correct",
            Command::Approve { .. } => "approve",
            Command::Disapprove { .. } => "disapprove",
        }
    }
}

/// One user command, as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRequest {
    pub actor: Actor,
    pub conversation: Conversation,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Clone)]
pub struct SubmissionFlow {
    repo: Arc<dyn ProposalRepository>,
    dataset: Arc<dyn Dataset>,
    presenter: Arc<dyn Presenter>,
    hub: EventHub,
    lifecycle: ProposalLifecycle,
    settings: EngineSettings,
}

impl SubmissionFlow {
    pub fn new(
        repo: Arc<dyn ProposalRepository>,
        dataset: Arc<dyn Dataset>,
        presenter: Arc<dyn Presenter>,
        hub: EventHub,
        settings: EngineSettings,
    ) -> Self {
        let lifecycle = ProposalLifecycle::new(
            repo.clone(),
            dataset.clone(),
            presenter.clone(),
            settings.quorum,
        );
        Self {
            repo,
            dataset,
            presenter,
            hub,
            lifecycle,
            settings,
        }
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// A collector for `actor` in `conversation`, subscribed immediately.
    pub fn collector(&self, actor: &Actor, conversation: &Conversation) -> InteractiveCollector {
        InteractiveCollector::new(
            &self.hub,
            self.presenter.clone(),
            actor.id.clone(),
            conversation.clone(),
        )
    }

    /// Run one command to completion and answer the user.
    ///
    /// The outcome or error replaces the flow's last prompt, or is sent as
    /// a new reply when the flow never prompted. A timeout sends nothing:
    /// the expired prompt was already marked cancelled.
    pub async fn handle(&self, request: FlowRequest) -> Result<FlowOutcome, FlowError> {
        let FlowRequest {
            actor,
            conversation,
            command,
        } = request;
        let name = command.name();
        info!(command = name, user = %actor.id, conversation = %conversation, "flow started");

        let mut collector = self.collector(&actor, &conversation);
        let result = match command {
            Command::Suggest(raw) => self.suggest(&mut collector, &actor, raw).await,
            Command::Correct { identifier } => {
                self.correct(&mut collector, &actor, &identifier).await
            }
            Command::Approve { target } => self.approve(&actor, &target).await,
            Command::Disapprove { target } => self.disapprove(&actor, &target).await,
        };

        let display = match &result {
            Ok(outcome) => {
                info!(command = name, user = %actor.id, ?outcome, "flow finished");
                Some(render_outcome(outcome))
            }
            Err(FlowError::TimedOut) => {
                info!(command = name, user = %actor.id, "flow timed out");
                None
            }
            Err(err) if err.is_recoverable() => {
                warn!(command = name, user = %actor.id, error = %err, "flow rejected");
                Some(render_error(err))
            }
            Err(err) => {
                error!(command = name, user = %actor.id, error = %err, "flow failed");
                Some(render_error(err))
            }
        };

        if let Some(display) = display {
            if let Err(err) = collector.update_prompt(display).await {
                error!(command = name, user = %actor.id, error = %err, "failed to answer user");
            }
        }
        result
    }
}
