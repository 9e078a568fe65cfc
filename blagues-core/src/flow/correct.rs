use tracing::{error, info, warn};

use super::{FlowOutcome, SubmissionFlow};
use crate::collector::InteractiveCollector;
use crate::error::{Conflict, FlowError};
use crate::joke::{validate_field, Joke, JokeId, JokePayload};
use crate::presentation::{
    cancelled, controls, render_category_picker, render_change_menu, render_correction,
    render_identify_request, render_identify_retry, render_text_request, Board, ProposalView,
    VoteSummary,
};
use crate::proposal::{
    Actor, ExternalRef, NewProposal, Proposal, ProposalKind, ProposalStatus,
};
use crate::repository::RepositoryError;

impl SubmissionFlow {
    pub async fn correct(
        &self,
        collector: &mut InteractiveCollector,
        actor: &Actor,
        identifier: &str,
    ) -> Result<FlowOutcome, FlowError> {
        let root = self.identify(collector, identifier).await?;
        if root.is_refused() {
            return Err(Conflict::AlreadyFinalized {
                status: ProposalStatus::Refused,
            }
            .into());
        }

        let chain = self.lifecycle.chain().load(root.id).await?;
        let Some(fields) = self
            .request_changes(collector, chain.current_fields())
            .await?
        else {
            return Ok(FlowOutcome::CorrectionAbandoned);
        };
        chain.validate_correction(&fields)?;

        let kind = ProposalKind::Correction { target: root.id };
        let votes = VoteSummary {
            quorum: self.settings.quorum,
            ..VoteSummary::default()
        };
        let display = render_correction(
            ProposalView::draft(&kind, &actor.id, &fields),
            &chain.root.payload,
            &votes,
        );
        let external_ref = self
            .presenter
            .publish(Board::Corrections, display.clone())
            .await?;

        let proposed = self
            .lifecycle
            .chain()
            .propose_correction(root.id, fields.clone(), actor.id.clone(), external_ref.clone())
            .await;
        if let Err(err) = proposed {
            error!(user = %actor.id, message = %external_ref, error = %err, "correction published but not stored");
            if let Err(edit_err) = self.presenter.edit(&external_ref, cancelled(&display)).await {
                error!(message = %external_ref, error = %edit_err, "failed to withdraw orphan correction");
            }
            return Err(err);
        }

        Ok(FlowOutcome::CorrectionSubmitted {
            external_ref,
            fields,
        })
    }

    /// Resolve the joke to correct, prompting for another identifier until
    /// one resolves.
    async fn identify(
        &self,
        collector: &mut InteractiveCollector,
        identifier: &str,
    ) -> Result<Proposal, FlowError> {
        if let Some(root) = self.resolve_target(identifier).await? {
            return Ok(root);
        }

        collector.prompt(render_identify_request()).await?;
        let conversation = collector.conversation().clone();
        let mut failed: u32 = 0;
        loop {
            let reply = collector
                .collect(
                    |event| event.text_in(&conversation).is_some(),
                    self.settings.identify_window,
                )
                .await?;
            let text = reply.text_in(&conversation).unwrap_or_default();
            if let Some(root) = self.resolve_target(text).await? {
                return Ok(root);
            }

            failed += 1;
            info!(user = %reply.actor.id, attempt = failed, "identifier did not resolve");
            if self
                .settings
                .max_identify_attempts
                .map_or(false, |max| failed >= max)
            {
                return Err(FlowError::not_found(format!(
                    "no joke matches after {} attempts",
                    failed
                )));
            }
            collector.update_prompt(render_identify_retry(failed)).await?;
        }
    }

    /// The root suggestion an identifier designates, if any.
    ///
    /// Tried in order: a proposal message, a published joke id, then an
    /// exact published question.
    pub async fn resolve_target(&self, identifier: &str) -> Result<Option<Proposal>, FlowError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }

        if let Some(proposal) = self
            .repo
            .find_by_external_ref(&ExternalRef::from(identifier))
            .await?
        {
            return match proposal.kind {
                ProposalKind::Suggestion => Ok(Some(proposal)),
                ProposalKind::Correction { target } => Ok(self.repo.get(target).await?),
            };
        }

        let joke = match identifier.parse::<u32>() {
            Ok(id) => self.dataset.find_by_id(JokeId(id)).await?,
            Err(_) => self.dataset.find_by_question(identifier).await?,
        };
        match joke {
            Some(joke) => Ok(Some(self.published_root(&joke).await?)),
            None => Ok(None),
        }
    }

    /// The suggestion record owning a published joke's chain, created on
    /// first use for jokes that never went through a suggestion.
    async fn published_root(&self, joke: &Joke) -> Result<Proposal, FlowError> {
        if let Some(root) = self.repo.find_published(joke.id).await? {
            return Ok(root);
        }
        let created = self
            .repo
            .create_proposal(NewProposal::published(
                joke.id,
                ExternalRef(format!("joke:{}", joke.id)),
                joke.payload(),
            ))
            .await;
        match created {
            Ok(root) => {
                info!(proposal = %root.id, joke = %joke.id, "root record created for published joke");
                Ok(root)
            }
            // Another flow created it first.
            Err(RepositoryError::Constraint { .. }) => self
                .repo
                .find_published(joke.id)
                .await?
                .ok_or_else(|| FlowError::not_found(format!("joke {}", joke.id))),
            Err(err) => Err(err.into()),
        }
    }

    /// Run the change menu. Returns `None` when the user cancels or runs
    /// out of rounds.
    async fn request_changes(
        &self,
        collector: &mut InteractiveCollector,
        current: &JokePayload,
    ) -> Result<Option<JokePayload>, FlowError> {
        let window = self.settings.change_window;
        let conversation = collector.conversation().clone();
        let mut fields = current.clone();
        let mut edited = false;

        for _ in 0..self.settings.max_change_rounds {
            let menu = collector
                .update_prompt(render_change_menu(&fields, edited))
                .await?;
            let press = collector
                .collect(|event| event.button_on(&menu).is_some(), window)
                .await?;

            match press.button_on(&menu) {
                Some(controls::CATEGORY) => {
                    let picker = collector.update_prompt(render_category_picker()).await?;
                    let pick = collector
                        .collect(|event| event.selection_on(&picker).is_some(), window)
                        .await?;
                    let value = pick
                        .selection_on(&picker)
                        .and_then(|values| values.first())
                        .map(String::as_str)
                        .unwrap_or_default();
                    fields.category = value.parse()?;
                }
                Some(field @ (controls::QUESTION | controls::ANSWER)) => {
                    let label = if field == controls::QUESTION {
                        "question"
                    } else {
                        "réponse"
                    };
                    collector.update_prompt(render_text_request(label)).await?;
                    let reply = collector
                        .collect(|event| event.text_in(&conversation).is_some(), window)
                        .await?;
                    let text = validate_field(label, reply.text_in(&conversation).unwrap_or_default())?;
                    if field == controls::QUESTION {
                        fields.question = text;
                    } else {
                        fields.answer = text;
                    }
                }
                Some(controls::VALIDATE) => return Ok(Some(fields)),
                _ => return Ok(None),
            }
            edited = true;
        }

        warn!(rounds = self.settings.max_change_rounds, "change menu round limit reached");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::test_support::*;
    use super::super::{Command, EngineSettings};
    use super::*;
    use crate::dataset::Dataset;
    use crate::joke::Category;
    use crate::presentation::Tone;
    use crate::proposal::UserId;
    use crate::repository::ProposalRepository;

    fn joke(id: u32, q: &str) -> Joke {
        Joke {
            id: JokeId(id),
            category: Category::Global,
            question: q.to_string(),
            answer: "A".to_string(),
        }
    }

    fn correct(identifier: &str) -> Command {
        Command::Correct {
            identifier: identifier.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_correct_published_joke_by_id() {
        let h = harness(vec![joke(4, "Q4")]);
        let flow = h.flow.clone();
        let request = h.request(author(), correct("4"));
        let task = tokio::spawn(async move { flow.handle(request).await });

        let menu = h.prompt_number(1).await;
        h.press(&author(), &menu, controls::QUESTION);
        h.say(&author(), "Q4 corrigée");
        h.press(&author(), &menu, controls::VALIDATE);

        let outcome = task.await.unwrap().unwrap();
        let FlowOutcome::CorrectionSubmitted { external_ref, fields } = outcome else {
            panic!("expected a submitted correction");
        };
        assert_eq!(fields.question, "Q4 corrigée");
        assert_eq!(fields.answer, "A");

        let correction = h
            .repo
            .find_by_external_ref(&external_ref)
            .await
            .unwrap()
            .unwrap();
        let root = h.repo.get(correction.root_id()).await.unwrap().unwrap();
        assert!(root.is_merged());
        assert_eq!(root.joke_id, Some(JokeId(4)));

        let shown = h.presenter.shown(&external_ref).unwrap();
        assert!(shown.fields[0].value.contains("Q4"));
        assert!(shown.fields[1].value.contains("Q4 corrigée"));
        assert_eq!(h.presenter.shown(&menu).unwrap().tone, Tone::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_correct_by_question_changes_category() {
        let h = harness(vec![joke(1, "Pourquoi ?")]);
        let flow = h.flow.clone();
        let request = h.request(author(), correct("pourquoi ?"));
        let task = tokio::spawn(async move { flow.handle(request).await });

        let menu = h.prompt_number(1).await;
        h.press(&author(), &menu, controls::CATEGORY);
        h.select(&author(), &menu, "dark");
        h.press(&author(), &menu, controls::VALIDATE);

        match task.await.unwrap().unwrap() {
            FlowOutcome::CorrectionSubmitted { fields, .. } => {
                assert_eq!(fields.category, Category::Dark);
                assert_eq!(fields.question, "Pourquoi ?");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_correction_of_correction_targets_root() {
        let h = harness(vec![]);
        let root = h
            .repo
            .create_proposal(NewProposal::suggestion(
                UserId::from("bob"),
                ExternalRef::from("s1"),
                JokePayload::parse("global", "Q1", "A1").unwrap(),
            ))
            .await
            .unwrap();
        h.repo
            .create_proposal(NewProposal::correction(
                root.id,
                UserId::from("carol"),
                ExternalRef::from("c1"),
                JokePayload::parse("global", "Q2", "A1").unwrap(),
            ))
            .await
            .unwrap();

        let flow = h.flow.clone();
        let request = h.request(author(), correct("c1"));
        let task = tokio::spawn(async move { flow.handle(request).await });

        let menu = h.prompt_number(1).await;
        let shown = h.presenter.shown(&menu).unwrap();
        assert!(shown.description.unwrap().contains("Q2"), "menu starts from the tip");
        h.press(&author(), &menu, controls::ANSWER);
        h.say(&author(), "A2");
        h.press(&author(), &menu, controls::VALIDATE);

        let FlowOutcome::CorrectionSubmitted { external_ref, .. } = task.await.unwrap().unwrap()
        else {
            panic!("expected a submitted correction");
        };
        let created = h
            .repo
            .find_by_external_ref(&external_ref)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.kind, ProposalKind::Correction { target: root.id });
        assert_eq!(created.payload.question, "Q2");
        assert_eq!(created.payload.answer, "A2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_identifier_reprompts_until_resolved() {
        let h = harness(vec![joke(2, "Q2")]);
        let flow = h.flow.clone();
        let request = h.request(author(), correct("nope"));
        let task = tokio::spawn(async move { flow.handle(request).await });

        let prompt = h.prompt_number(1).await;
        assert_eq!(
            h.presenter.shown(&prompt).unwrap().title.as_deref(),
            Some("Correction de blague")
        );
        h.say(&moderator(1), "2");
        h.say(&author(), "still wrong");
        h.say(&author(), "also wrong");
        h.say(&author(), "2");
        h.press(&author(), &prompt, controls::CANCEL);

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, FlowOutcome::CorrectionAbandoned);
        assert!(h.presenter.published(Board::Corrections).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_attempts_can_be_bounded() {
        let settings = EngineSettings {
            max_identify_attempts: Some(2),
            ..EngineSettings::default()
        };
        let h = harness_with(vec![], settings);
        let flow = h.flow.clone();
        let request = h.request(author(), correct("nope"));
        let task = tokio::spawn(async move { flow.handle(request).await });

        h.prompt_number(1).await;
        h.say(&author(), "x");
        h.say(&author(), "y");

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, FlowError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_window_elapses() {
        let h = harness(vec![]);
        let started = tokio::time::Instant::now();
        let err = h
            .flow
            .handle(h.request(author(), correct("nope")))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::TimedOut));
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(30));
        let prompt = h.presenter.replies()[0].clone();
        assert_eq!(h.presenter.shown(&prompt).unwrap().tone, Tone::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_text_request_times_out_without_changes() {
        let h = harness(vec![joke(4, "Q4")]);
        let flow = h.flow.clone();
        let request = h.request(author(), correct("4"));
        let task = tokio::spawn(async move { flow.handle(request).await });

        let menu = h.prompt_number(1).await;
        h.press(&author(), &menu, controls::QUESTION);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, FlowError::TimedOut));
        let shown = h.presenter.shown(&menu).unwrap();
        assert_eq!(shown.tone, Tone::Cancelled);
        assert!(shown.controls.is_empty());

        let root = h.repo.find_published(JokeId(4)).await.unwrap().unwrap();
        assert!(h.repo.chain_for(root.id).await.unwrap().is_empty());
        assert_eq!(h.dataset.find_by_id(JokeId(4)).await.unwrap().unwrap().question, "Q4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_validating_without_changes_is_rejected() {
        let h = harness(vec![joke(4, "Q4")]);
        let flow = h.flow.clone();
        let request = h.request(author(), correct("4"));
        let task = tokio::spawn(async move { flow.handle(request).await });

        let menu = h.prompt_number(1).await;
        h.press(&author(), &menu, controls::VALIDATE);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, FlowError::Conflict(Conflict::NoChangesProposed)));
        assert!(h.presenter.published(Board::Corrections).is_empty());
        assert_eq!(h.presenter.shown(&menu).unwrap().tone, Tone::Problem);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_an_open_correction_is_rejected() {
        let h = harness(vec![joke(4, "Q4")]);
        let mut results = Vec::new();
        for answer in ["B", "C", "B"] {
            let flow = h.flow.clone();
            let request = h.request(author(), correct("4"));
            let task = tokio::spawn(async move { flow.handle(request).await });

            let menu = h.presenter.replies().len() + 1;
            let menu = h.prompt_number(menu).await;
            h.press(&author(), &menu, controls::ANSWER);
            h.say(&author(), answer);
            h.press(&author(), &menu, controls::VALIDATE);

            results.push(task.await.unwrap());
        }

        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(
            results[2],
            Err(FlowError::Conflict(Conflict::DuplicateCorrection))
        ));
        assert_eq!(h.presenter.published(Board::Corrections).len(), 2);
    }
}
