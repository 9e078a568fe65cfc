//! Test doubles shared by the unit tests and the server's integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::presentation::{Board, Conversation, DisplayPayload, Presenter, TransportError};
use crate::proposal::ExternalRef;

/// A presenter call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCall {
    Publish(Board, ExternalRef),
    Reply(Conversation, ExternalRef),
    Edit(ExternalRef),
}

#[derive(Default)]
struct Inner {
    next: u64,
    messages: HashMap<ExternalRef, DisplayPayload>,
    calls: Vec<PresenterCall>,
}

/// Presenter that keeps every message it was asked to show in memory.
#[derive(Default)]
pub struct RecordingPresenter {
    inner: Mutex<Inner>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current content of a message.
    pub fn shown(&self, target: &ExternalRef) -> Option<DisplayPayload> {
        self.lock().messages.get(target).cloned()
    }

    pub fn calls(&self) -> Vec<PresenterCall> {
        self.lock().calls.clone()
    }

    /// Messages published on `board`, oldest first.
    pub fn published(&self, board: Board) -> Vec<ExternalRef> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PresenterCall::Publish(b, target) if *b == board => Some(target.clone()),
                _ => None,
            })
            .collect()
    }

    /// Replies sent to the acting user, oldest first.
    pub fn replies(&self) -> Vec<ExternalRef> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PresenterCall::Reply(_, target) => Some(target.clone()),
                _ => None,
            })
            .collect()
    }

    /// The most recent reply as it is shown now.
    pub fn last_reply(&self) -> Option<DisplayPayload> {
        self.replies().last().and_then(|target| self.shown(target))
    }

    /// Simulate a message deleted by someone outside the bot.
    pub fn remove(&self, target: &ExternalRef) {
        self.lock().messages.remove(target);
    }

    fn store(&self, prefix: &str, payload: DisplayPayload) -> ExternalRef {
        let mut inner = self.lock();
        inner.next += 1;
        let target = ExternalRef(format!("{}-{}", prefix, inner.next));
        inner.messages.insert(target.clone(), payload);
        target
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn publish(
        &self,
        board: Board,
        payload: DisplayPayload,
    ) -> Result<ExternalRef, TransportError> {
        let prefix = match board {
            Board::Suggestions => "suggestion",
            Board::Corrections => "correction",
        };
        let target = self.store(prefix, payload);
        self.lock()
            .calls
            .push(PresenterCall::Publish(board, target.clone()));
        Ok(target)
    }

    async fn reply(
        &self,
        conversation: &Conversation,
        payload: DisplayPayload,
    ) -> Result<ExternalRef, TransportError> {
        let target = self.store("reply", payload);
        self.lock()
            .calls
            .push(PresenterCall::Reply(conversation.clone(), target.clone()));
        Ok(target)
    }

    async fn edit(&self, target: &ExternalRef, payload: DisplayPayload) -> Result<(), TransportError> {
        let mut inner = self.lock();
        match inner.messages.get_mut(target) {
            Some(shown) => *shown = payload,
            None => {
                return Err(TransportError::Rejected {
                    status: 404,
                    body: format!("unknown message {}", target),
                })
            }
        }
        inner.calls.push(PresenterCall::Edit(target.clone()));
        Ok(())
    }

    async fn exists(&self, target: &ExternalRef) -> Result<bool, TransportError> {
        Ok(self.lock().messages.contains_key(target))
    }
}
