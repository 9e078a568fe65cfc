//! Timed collection of replies from one user.
//!
//! Incoming user events are fanned out by the [`EventHub`]. Every waiting
//! flow owns its own receiver through an [`InteractiveCollector`], so events
//! from other users pass it by without being consumed on anyone's behalf.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, warn};

use crate::error::FlowError;
use crate::presentation::{cancelled, Conversation, DisplayPayload, Presenter, TransportError};
use crate::proposal::{Actor, ExternalRef, UserId};

const DEFAULT_CAPACITY: usize = 256;

/// An interaction delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEvent {
    pub actor: Actor,
    pub conversation: Conversation,
    pub kind: UserEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserEventKind {
    /// A button on the message `prompt` was pressed.
    Button { prompt: ExternalRef, id: String },
    /// Values were picked from a select menu on `prompt`.
    Select {
        prompt: ExternalRef,
        id: String,
        values: Vec<String>,
    },
    /// A plain message typed in the conversation.
    Text { content: String },
}

impl UserEvent {
    /// The control id, if this is a press on `prompt`.
    pub fn button_on(&self, prompt: &ExternalRef) -> Option<&str> {
        match &self.kind {
            UserEventKind::Button { prompt: p, id } if p == prompt => Some(id),
            _ => None,
        }
    }

    /// The picked values, if this is a selection on `prompt`.
    pub fn selection_on(&self, prompt: &ExternalRef) -> Option<&[String]> {
        match &self.kind {
            UserEventKind::Select {
                prompt: p, values, ..
            } if p == prompt => Some(values),
            _ => None,
        }
    }

    /// The text, if this message was typed in `conversation`.
    pub fn text_in(&self, conversation: &Conversation) -> Option<&str> {
        match &self.kind {
            UserEventKind::Text { content } if &self.conversation == conversation => {
                Some(content)
            }
            _ => None,
        }
    }
}

/// Broadcast fan-out of user events to every waiting collector.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<UserEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Deliver an event to every current subscriber.
    ///
    /// Returns how many collectors received it. Zero means nobody was
    /// waiting and the event is dropped.
    pub fn publish(&self, event: UserEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Collects replies of one user inside one conversation.
///
/// The receiver is subscribed on construction, before any prompt is shown,
/// so a reply can never arrive before the collector listens for it.
pub struct InteractiveCollector {
    receiver: broadcast::Receiver<UserEvent>,
    presenter: Arc<dyn Presenter>,
    user: UserId,
    conversation: Conversation,
    last_prompt: Option<(ExternalRef, DisplayPayload)>,
}

impl InteractiveCollector {
    pub fn new(
        hub: &EventHub,
        presenter: Arc<dyn Presenter>,
        user: UserId,
        conversation: Conversation,
    ) -> Self {
        Self {
            receiver: hub.subscribe(),
            presenter,
            user,
            conversation,
            last_prompt: None,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Show a new prompt to the user. It becomes the prompt cancelled on
    /// timeout.
    pub async fn prompt(&mut self, payload: DisplayPayload) -> Result<ExternalRef, FlowError> {
        let target = self
            .presenter
            .reply(&self.conversation, payload.clone())
            .await?;
        self.last_prompt = Some((target.clone(), payload));
        Ok(target)
    }

    /// Replace the content of the last prompt in place, or show it if there
    /// is none yet.
    pub async fn update_prompt(
        &mut self,
        payload: DisplayPayload,
    ) -> Result<ExternalRef, FlowError> {
        match self.last_prompt.take() {
            Some((target, _)) => {
                self.presenter.edit(&target, payload.clone()).await?;
                self.last_prompt = Some((target.clone(), payload));
                Ok(target)
            }
            None => self.prompt(payload).await,
        }
    }

    /// Wait for the first event of this user that satisfies `predicate`.
    ///
    /// Events of other users, and events of this user that do not match,
    /// are skipped. After `window` elapses the last prompt is edited to a
    /// cancelled state and `TimedOut` is returned.
    pub async fn collect<F>(&mut self, predicate: F, window: Duration) -> Result<UserEvent, FlowError>
    where
        F: Fn(&UserEvent) -> bool,
    {
        let deadline = Instant::now() + window;
        loop {
            match timeout_at(deadline, self.receiver.recv()).await {
                Ok(Ok(event)) => {
                    if event.actor.id != self.user {
                        continue;
                    }
                    if predicate(&event) {
                        return Ok(event);
                    }
                    debug!(user = %self.user, "ignoring non-matching event");
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(user = %self.user, skipped, "collector lagged behind the event hub");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    warn!(user = %self.user, "event hub closed while collecting");
                    break;
                }
                Err(_) => break,
            }
        }

        debug!(user = %self.user, ?window, "collection window elapsed");
        self.cancel_last().await;
        Err(FlowError::TimedOut)
    }

    /// Freeze the last prompt in a cancelled state.
    ///
    /// Failures are logged only: the flow is ending either way.
    pub async fn cancel_last(&mut self) {
        let Some((target, payload)) = self.last_prompt.take() else {
            return;
        };
        if let Err(err) = self.edit(&target, cancelled(&payload)).await {
            error!(prompt = %target, error = %err, "failed to mark prompt as cancelled");
        }
    }

    async fn edit(
        &self,
        target: &ExternalRef,
        payload: DisplayPayload,
    ) -> Result<(), TransportError> {
        self.presenter.edit(target, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::{render_change_menu, Tone};
    use crate::testing::RecordingPresenter;
    use crate::joke::JokePayload;

    fn text(user: &str, content: &str) -> UserEvent {
        UserEvent {
            actor: Actor::new(user, user, false),
            conversation: Conversation::from("cmd"),
            kind: UserEventKind::Text {
                content: content.to_string(),
            },
        }
    }

    fn setup() -> (EventHub, Arc<RecordingPresenter>, InteractiveCollector) {
        let hub = EventHub::default();
        let presenter = Arc::new(RecordingPresenter::new());
        let collector = InteractiveCollector::new(
            &hub,
            presenter.clone(),
            UserId::from("alice"),
            Conversation::from("cmd"),
        );
        (hub, presenter, collector)
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_matching_event_of_user() {
        let (hub, _, mut collector) = setup();

        let publisher = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            publisher.publish(text("bob", "from bob"));
            publisher.publish(text("alice", "ignored"));
            publisher.publish(text("alice", "42"));
        });

        let event = collector
            .collect(
                |e| e.text_in(&Conversation::from("cmd")) == Some("42"),
                Duration::from_secs(30),
            )
            .await
            .unwrap();
        assert_eq!(event.actor.id, UserId::from("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_users_events_stay_available_to_their_collector() {
        let (hub, presenter, mut alice) = setup();
        let mut bob = InteractiveCollector::new(
            &hub,
            presenter,
            UserId::from("bob"),
            Conversation::from("cmd"),
        );

        hub.publish(text("bob", "for bob"));
        hub.publish(text("alice", "for alice"));

        let any = |_: &UserEvent| true;
        let a = alice.collect(any, Duration::from_secs(5)).await.unwrap();
        let b = bob.collect(any, Duration::from_secs(5)).await.unwrap();
        assert_eq!(a.kind, text("alice", "for alice").kind);
        assert_eq!(b.kind, text("bob", "for bob").kind);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_last_prompt() {
        let (_hub, presenter, mut collector) = setup();
        let menu = render_change_menu(&JokePayload::parse("global", "Q", "A").unwrap(), false);
        let prompt = collector.prompt(menu).await.unwrap();

        let started = Instant::now();
        let err = collector
            .collect(|_| true, Duration::from_secs(30))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::TimedOut));
        assert!(started.elapsed() >= Duration::from_secs(30));
        let shown = presenter.shown(&prompt).unwrap();
        assert_eq!(shown.tone, Tone::Cancelled);
        assert!(shown.controls.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_hub_ends_as_timeout() {
        let presenter = Arc::new(RecordingPresenter::new());
        let mut collector = {
            let hub = EventHub::default();
            InteractiveCollector::new(
                &hub,
                presenter,
                UserId::from("alice"),
                Conversation::from("cmd"),
            )
        };
        let err = collector
            .collect(|_| true, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::TimedOut));
    }

    #[test]
    fn test_publish_without_listeners_drops_event() {
        let hub = EventHub::new(4);
        assert_eq!(hub.publish(text("alice", "hello")), 0);
    }
}
