pub mod chain;
pub mod collector;
pub mod dataset;
pub mod error;
pub mod flow;
pub mod joke;
pub mod lifecycle;
pub mod presentation;
pub mod proposal;
pub mod repository;
pub mod similarity;
pub mod tally;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use collector::{EventHub, UserEvent, UserEventKind};
pub use dataset::{Dataset, DatasetError, InMemoryDataset};
pub use error::{Conflict, FlowError};
pub use flow::{Command, EngineSettings, FlowOutcome, FlowRequest, RawSuggestion, SubmissionFlow};
pub use joke::{Category, Joke, JokeId, JokePayload};
pub use presentation::{Board, Conversation, DisplayPayload, Presenter, TransportError};
pub use proposal::{
    Actor, ExternalRef, NewProposal, Outcome, Proposal, ProposalFilter, ProposalId, ProposalKind,
    ProposalStatus, UserId, VoteKind,
};
pub use repository::{InMemoryRepository, ProposalRepository, RepositoryError, VoteWrite};
