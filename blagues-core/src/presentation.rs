//! Transport-neutral rendering of proposals, prompts and outcomes.
//!
//! Every presentation is recomputed from persisted state by a pure render
//! function; nothing edits a previously rendered payload field by field.
//! The [`Presenter`] trait is the seam to the chat transport.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Conflict, FlowError};
use crate::joke::{Category, JokePayload};
use crate::proposal::{
    ExternalRef, Outcome, Proposal, ProposalKind, ProposalStatus, UserId, VoteKind,
};

/// Footer shown on a prompt that expired or was abandoned.
pub const CANCELLED_FOOTER: &str = "💡 Commande annulée";

/// Control ids used by prompts, matched by the collector predicates.
pub mod controls {
    pub const SEND: &str = "send";
    pub const CANCEL: &str = "cancel";
    pub const CATEGORY: &str = "type";
    pub const QUESTION: &str = "question";
    pub const ANSWER: &str = "answer";
    pub const VALIDATE: &str = "valid";
    pub const CATEGORY_SELECT: &str = "category";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Proposed,
    Merged,
    Refused,
    Info,
    Success,
    Problem,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "control", rename_all = "snake_case")]
pub enum Control {
    Button {
        id: String,
        label: String,
        style: ButtonStyle,
    },
    Select {
        id: String,
        placeholder: String,
        options: Vec<SelectOption>,
    },
}

impl Control {
    pub fn button(id: &str, label: &str, style: ButtonStyle) -> Self {
        Control::Button {
            id: id.to_string(),
            label: label.to_string(),
            style,
        }
    }
}

/// What the transport should show. Fully describes one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
    pub tone: Tone,
    pub footer: Option<String>,
    #[serde(default)]
    pub controls: Vec<Control>,
}

impl DisplayPayload {
    pub fn new(tone: Tone) -> Self {
        Self {
            title: None,
            description: None,
            fields: Vec::new(),
            tone,
            footer: None,
            controls: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }
}

/// Plain-text rendering, used for logs and the CLI.
impl fmt::Display for DisplayPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut blocks = Vec::new();
        if let Some(title) = &self.title {
            blocks.push(format!("# {}", title));
        }
        if let Some(description) = &self.description {
            blocks.push(description.clone());
        }
        for field in &self.fields {
            blocks.push(format!("## {}\n{}", field.name, field.value));
        }
        if let Some(footer) = &self.footer {
            blocks.push(format!("-- {}", footer));
        }
        write!(f, "{}", blocks.join("\n\n"))
    }
}

/// Voters of a proposal and the quorum they count towards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteSummary {
    pub approvers: Vec<UserId>,
    pub disapprovers: Vec<UserId>,
    pub quorum: usize,
}

impl VoteSummary {
    fn line(&self) -> String {
        let names = |users: &[UserId]| {
            users
                .iter()
                .map(|u| format!("@{}", u))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let side = |emoji: &str, users: &[UserId]| {
            if users.is_empty() {
                format!("{} {}/{}", emoji, users.len(), self.quorum)
            } else {
                format!("{} {}/{} : {}", emoji, users.len(), self.quorum, names(users))
            }
        };
        format!(
            "{}\n{}",
            side("👍", &self.approvers),
            side("👎", &self.disapprovers)
        )
    }
}

/// The three lines every joke display uses.
pub fn joke_block(payload: &JokePayload) -> String {
    format!(
        "> **Type**: {}\n> **Blague**: {}\n> **Réponse**: {}",
        payload.category.label(),
        payload.question,
        payload.answer
    )
}

fn status_tone(status: ProposalStatus) -> Tone {
    match status {
        ProposalStatus::Pending => Tone::Proposed,
        ProposalStatus::Merged => Tone::Merged,
        ProposalStatus::Refused => Tone::Refused,
    }
}

fn status_footer(kind: &ProposalKind, status: ProposalStatus) -> Option<String> {
    let noun = match kind {
        ProposalKind::Suggestion => "Suggestion",
        ProposalKind::Correction { .. } => "Correction",
    };
    match status {
        ProposalStatus::Pending => None,
        ProposalStatus::Merged => Some(format!("{} ajoutée", noun)),
        ProposalStatus::Refused => Some(format!("{} refusée", noun)),
    }
}

/// Append the vote line while the proposal is open.
fn with_votes(block: String, status: ProposalStatus, votes: &VoteSummary) -> String {
    if status.is_terminal() {
        block
    } else {
        format!("{}\n\n{}", block, votes.line())
    }
}

/// The parts of a proposal a presentation shows.
///
/// Drafts that are not persisted yet are rendered through the same view.
#[derive(Debug, Clone, Copy)]
pub struct ProposalView<'a> {
    pub kind: &'a ProposalKind,
    pub submitter: &'a UserId,
    pub payload: &'a JokePayload,
    pub status: ProposalStatus,
}

impl<'a> ProposalView<'a> {
    pub fn draft(kind: &'a ProposalKind, submitter: &'a UserId, payload: &'a JokePayload) -> Self {
        Self {
            kind,
            submitter,
            payload,
            status: ProposalStatus::Pending,
        }
    }
}

impl<'a> From<&'a Proposal> for ProposalView<'a> {
    fn from(proposal: &'a Proposal) -> Self {
        Self {
            kind: &proposal.kind,
            submitter: &proposal.submitter,
            payload: &proposal.payload,
            status: proposal.status(),
        }
    }
}

pub fn render_suggestion(
    view: ProposalView<'_>,
    votes: &VoteSummary,
    similar: Option<&JokePayload>,
) -> DisplayPayload {
    let mut display = DisplayPayload::new(status_tone(view.status))
        .title(format!("Suggestion de @{}", view.submitter))
        .description(with_votes(joke_block(view.payload), view.status, votes));
    if let Some(similar) = similar {
        display = display.field(Field::new("Blague similaire", joke_block(similar)));
    }
    display.footer = status_footer(view.kind, view.status);
    display
}

/// A correction shows the content it amends and the corrected content.
pub fn render_correction(
    view: ProposalView<'_>,
    previous: &JokePayload,
    votes: &VoteSummary,
) -> DisplayPayload {
    let mut display = DisplayPayload::new(status_tone(view.status))
        .title(format!("Correction de @{}", view.submitter))
        .field(Field::new("Blague initiale", joke_block(previous)))
        .field(Field::new(
            "Blague corrigée",
            with_votes(joke_block(view.payload), view.status, votes),
        ));
    display.footer = status_footer(view.kind, view.status);
    display
}

pub fn render_confirmation(payload: &JokePayload, similar: Option<&JokePayload>) -> DisplayPayload {
    let mut display = DisplayPayload::new(Tone::Info)
        .title("Voulez-vous envoyer cette suggestion ?")
        .description(joke_block(payload));
    if let Some(similar) = similar {
        display = display.field(Field::new("Blague similaire", joke_block(similar)));
    }
    display
        .control(Control::button(controls::SEND, "Envoyer", ButtonStyle::Success))
        .control(Control::button(controls::CANCEL, "Annuler", ButtonStyle::Danger))
}

pub fn render_identify_request() -> DisplayPayload {
    DisplayPayload::new(Tone::Info)
        .title("Correction de blague")
        .description(
            "Il faut tout d'abord identifier la blague. Pour cela, il faut l'identifiant de la \
             blague, l'identifiant du message la proposant ou la question de celle-ci.",
        )
}

/// `attempt` counts failed identification replies so far.
pub fn render_identify_retry(attempt: u32) -> DisplayPayload {
    render_identify_request().footer(format!(
        "Blague introuvable ({} tentative{}), réessayez.",
        attempt,
        if attempt > 1 { "s" } else { "" }
    ))
}

/// `edited` is true once at least one field was changed.
pub fn render_change_menu(current: &JokePayload, edited: bool) -> DisplayPayload {
    DisplayPayload::new(Tone::Info)
        .title(if edited {
            "Quels autres changements voulez-vous faire ?"
        } else {
            "Quels changements voulez-vous faire ?"
        })
        .description(joke_block(current))
        .control(Control::button(controls::CATEGORY, "Type", ButtonStyle::Primary))
        .control(Control::button(controls::QUESTION, "Question", ButtonStyle::Primary))
        .control(Control::button(controls::ANSWER, "Réponse", ButtonStyle::Primary))
        .control(Control::button(controls::VALIDATE, "Valider", ButtonStyle::Success))
        .control(Control::button(controls::CANCEL, "Annuler", ButtonStyle::Danger))
}

pub fn render_category_picker() -> DisplayPayload {
    DisplayPayload::new(Tone::Info)
        .description("Par quel type de blague voulez-vous changer le type actuel ?")
        .control(Control::Select {
            id: controls::CATEGORY_SELECT.to_string(),
            placeholder: "Nouveau type de blague".to_string(),
            options: Category::ALL
                .iter()
                .map(|c| SelectOption {
                    value: c.key().to_string(),
                    label: c.label().to_string(),
                    description: c.description().to_string(),
                })
                .collect(),
        })
}

/// Free-text request for the question or the answer.
pub fn render_text_request(field: &str) -> DisplayPayload {
    DisplayPayload::new(Tone::Info).description(format!(
        "Par quelle {field} voulez-vous changer la {field} actuelle ?"
    ))
}

/// The same prompt, frozen: controls removed and marked as cancelled.
pub fn cancelled(previous: &DisplayPayload) -> DisplayPayload {
    DisplayPayload {
        tone: Tone::Cancelled,
        footer: Some(CANCELLED_FOOTER.to_string()),
        controls: Vec::new(),
        ..previous.clone()
    }
}

/// How a finished flow is reported back to the acting user.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    /// A suggestion was published for review.
    Submitted { external_ref: ExternalRef },
    /// The suggestion matched an existing joke too closely.
    Duplicate { matched: JokePayload, score: f64 },
    /// The author declined the confirmation.
    NotSent { payload: JokePayload },
    CorrectionSubmitted {
        external_ref: ExternalRef,
        fields: JokePayload,
    },
    /// The author left the change menu without validating.
    CorrectionAbandoned,
    Voted {
        kind: VoteKind,
        count: usize,
        quorum: usize,
    },
    Finalized {
        kind: ProposalKind,
        outcome: Outcome,
    },
}

pub fn render_outcome(outcome: &FlowOutcome) -> DisplayPayload {
    match outcome {
        FlowOutcome::Submitted { external_ref } => DisplayPayload::new(Tone::Success)
            .description(format!("La blague ({}) a été envoyée !", external_ref)),
        FlowOutcome::Duplicate { matched, .. } => DisplayPayload::new(Tone::Problem)
            .description("Cette blague existe déjà.")
            .field(Field::new("Blague similaire", joke_block(matched))),
        FlowOutcome::NotSent { payload } => DisplayPayload::new(Tone::Info)
            .description("La blague n'a pas été envoyée.")
            .field(Field::new("Blague", joke_block(payload))),
        FlowOutcome::CorrectionSubmitted { fields, .. } => DisplayPayload::new(Tone::Success)
            .title("Requête de changement envoyée")
            .description(joke_block(fields)),
        FlowOutcome::CorrectionAbandoned => DisplayPayload::new(Tone::Cancelled)
            .description("Aucune correction n'a été envoyée.")
            .footer(CANCELLED_FOOTER),
        FlowOutcome::Voted { kind, count, quorum } => {
            let noun = match kind {
                VoteKind::Approval => "approbation",
                VoteKind::Disapproval => "désapprobation",
            };
            DisplayPayload::new(Tone::Success).description(format!(
                "Votre {} a été prise en compte ! ({}/{})",
                noun, count, quorum
            ))
        }
        FlowOutcome::Finalized { kind, outcome } => {
            let verb = match outcome {
                Outcome::Merged => "ajoutée",
                Outcome::Refused => "refusée",
            };
            DisplayPayload::new(Tone::Success)
                .description(format!("La {} a bien été {} !", kind.noun(), verb))
        }
    }
}

fn conflict_message(conflict: &Conflict) -> String {
    match conflict {
        Conflict::AlreadyFinalized {
            status: ProposalStatus::Refused,
        } => "Cette proposition a déjà été refusée.".to_string(),
        Conflict::AlreadyFinalized { .. } => "Cette proposition a déjà été ajoutée.".to_string(),
        Conflict::AlreadyVoted {
            kind: VoteKind::Approval,
        } => "Vous avez déjà approuvé cette proposition.".to_string(),
        Conflict::AlreadyVoted {
            kind: VoteKind::Disapproval,
        } => "Vous avez déjà désapprouvé cette proposition.".to_string(),
        Conflict::NoChangesProposed => "Aucun élément n'a été modifié.".to_string(),
        Conflict::DuplicateCorrection => "Cette correction a déjà été proposée.".to_string(),
        Conflict::PendingCorrectionExists { correction } => format!(
            "Une correction ({}) a été proposée, veuillez la traiter avant cette suggestion.",
            correction
        ),
        Conflict::SupersededByNewerCorrection { tip } => format!(
            "Une correction plus récente ({}) rend celle-ci obsolète, veuillez voter sur la \
             dernière version.",
            tip
        ),
    }
}

pub fn render_error(error: &FlowError) -> DisplayPayload {
    let message = match error {
        FlowError::Validation { message } => format!("Saisie invalide : {}", message),
        FlowError::NotFound { .. } => "Le message est invalide.".to_string(),
        FlowError::Conflict(conflict) => conflict_message(conflict),
        FlowError::TimedOut => {
            return DisplayPayload::new(Tone::Cancelled).description(CANCELLED_FOOTER)
        }
        FlowError::PermissionDenied { reason } => {
            format!("Vous n'avez pas la permission : {}", reason)
        }
        FlowError::Repository(_) | FlowError::Dataset(_) | FlowError::Transport(_) => {
            "Une erreur est survenue, veuillez réessayer plus tard.".to_string()
        }
    };
    DisplayPayload::new(Tone::Problem).description(message)
}

/// Channel a proposal is published to for review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    Suggestions,
    Corrections,
}

impl Board {
    pub fn for_kind(kind: &ProposalKind) -> Self {
        match kind {
            ProposalKind::Suggestion => Board::Suggestions,
            ProposalKind::Correction { .. } => Board::Corrections,
        }
    }
}

/// Opaque handle to where a command was issued; replies go there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation(pub String);

impl fmt::Display for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Conversation {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Request(String),

    #[error("transport rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected transport response: {0}")]
    Malformed(String),
}

/// Chat transport as seen by the flows.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Post a proposal on a review board.
    async fn publish(
        &self,
        board: Board,
        payload: DisplayPayload,
    ) -> Result<ExternalRef, TransportError>;

    /// Answer the acting user in the conversation a command came from.
    async fn reply(
        &self,
        conversation: &Conversation,
        payload: DisplayPayload,
    ) -> Result<ExternalRef, TransportError>;

    /// Replace a previously shown message.
    async fn edit(
        &self,
        target: &ExternalRef,
        payload: DisplayPayload,
    ) -> Result<(), TransportError>;

    /// Whether a previously shown message still exists.
    async fn exists(&self, target: &ExternalRef) -> Result<bool, TransportError>;
}
