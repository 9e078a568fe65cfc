//! The canonical joke dataset.
//!
//! Merged suggestions are appended here and merged corrections replace the
//! item they amend. The public lookup API reads from the same trait.

mod memory;

pub use memory::InMemoryDataset;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::joke::{Category, Joke, JokeId, JokePayload};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("no joke with id {0}")]
    NotFound(JokeId),

    #[error("dataset I/O failed during {operation}: {message}")]
    Io {
        operation: &'static str,
        message: String,
    },

    #[error("dataset file is malformed: {0}")]
    Malformed(String),
}

impl DatasetError {
    pub fn io(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Io {
            operation,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Dataset: Send + Sync {
    /// Append a new item. Its id is one more than the largest id present.
    async fn append_item(&self, payload: JokePayload) -> Result<Joke, DatasetError>;

    /// Overwrite the fields of an existing item, keeping its id.
    async fn replace_item(&self, id: JokeId, payload: JokePayload) -> Result<Joke, DatasetError>;

    async fn all_items(&self) -> Result<Vec<Joke>, DatasetError>;

    async fn find_by_id(&self, id: JokeId) -> Result<Option<Joke>, DatasetError> {
        Ok(self.all_items().await?.into_iter().find(|j| j.id == id))
    }

    /// Exact question match, ignoring case and surrounding whitespace.
    async fn find_by_question(&self, question: &str) -> Result<Option<Joke>, DatasetError> {
        let wanted = question.trim().to_lowercase();
        Ok(self
            .all_items()
            .await?
            .into_iter()
            .find(|j| j.question.trim().to_lowercase() == wanted))
    }

    async fn count(&self) -> Result<usize, DatasetError> {
        Ok(self.all_items().await?.len())
    }
}

/// Append `payload` to `items` under the next free id.
///
/// Shared by the dataset backends so they agree on id assignment.
pub fn push_item(items: &mut Vec<Joke>, payload: JokePayload) -> Joke {
    let id = items.iter().map(|j| j.id.0).max().map_or(1, |max| max + 1);
    let joke = Joke {
        id: JokeId(id),
        category: payload.category,
        question: payload.question,
        answer: payload.answer,
    };
    items.push(joke.clone());
    joke
}

/// Replace the fields of the item with `id` in place.
pub fn overwrite_item(
    items: &mut [Joke],
    id: JokeId,
    payload: JokePayload,
) -> Result<Joke, DatasetError> {
    let joke = items
        .iter_mut()
        .find(|j| j.id == id)
        .ok_or(DatasetError::NotFound(id))?;
    joke.category = payload.category;
    joke.question = payload.question;
    joke.answer = payload.answer;
    Ok(joke.clone())
}

/// Uniformly pick a joke whose category is not in `disallow`.
pub fn random_joke<'a>(items: &'a [Joke], disallow: &[Category]) -> Option<&'a Joke> {
    random_joke_with(&mut rand::thread_rng(), items, |j| {
        !disallow.contains(&j.category)
    })
}

/// Uniformly pick a joke of `category`.
pub fn random_joke_by_category(items: &[Joke], category: Category) -> Option<&Joke> {
    random_joke_with(&mut rand::thread_rng(), items, |j| j.category == category)
}

/// Uniformly pick one of the jokes `keep` accepts.
pub fn random_joke_with<'a, R, F>(rng: &mut R, items: &'a [Joke], keep: F) -> Option<&'a Joke>
where
    R: Rng + ?Sized,
    F: Fn(&Joke) -> bool,
{
    let allowed: Vec<&Joke> = items.iter().filter(|&j| keep(j)).collect();
    allowed.choose(rng).copied()
}
