//! Joke content types shared by the dataset and the proposal engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Maximum length of a question or an answer, in characters.
pub const MAX_FIELD_LEN: usize = 130;

/// Joke category with its stable wire key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Global,
    Dev,
    Dark,
    Limit,
    Beauf,
    Blondes,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Global,
        Category::Dev,
        Category::Dark,
        Category::Limit,
        Category::Beauf,
        Category::Blondes,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Global => "global",
            Category::Dev => "dev",
            Category::Dark => "dark",
            Category::Limit => "limit",
            Category::Beauf => "beauf",
            Category::Blondes => "blondes",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Global => "Général",
            Category::Dev => "Développeur",
            Category::Dark => "Noir",
            Category::Limit => "+18",
            Category::Beauf => "Beauf",
            Category::Blondes => "Blondes",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::Global => "Blagues tous publics",
            Category::Dev => "Blagues de développeurs",
            Category::Dark => "Humour noir",
            Category::Limit => "Blagues réservées aux adultes",
            Category::Beauf => "Humour beauf",
            Category::Blondes => "Blagues de blondes",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for Category {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| FlowError::validation(format!("unknown category '{}'", wanted)))
    }
}

/// Identifier of a published joke in the canonical dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JokeId(pub u32);

impl fmt::Display for JokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A published joke as stored in the dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joke {
    pub id: JokeId,
    #[serde(rename = "type")]
    pub category: Category,
    #[serde(rename = "joke")]
    pub question: String,
    pub answer: String,
}

impl Joke {
    pub fn payload(&self) -> JokePayload {
        JokePayload {
            category: self.category,
            question: self.question.clone(),
            answer: self.answer.clone(),
        }
    }
}

/// Joke content without an identity: what users submit and correct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JokePayload {
    pub category: Category,
    pub question: String,
    pub answer: String,
}

impl JokePayload {
    /// Build a payload from raw user input, trimming and validating each field.
    pub fn parse(category: &str, question: &str, answer: &str) -> Result<Self, FlowError> {
        Ok(Self {
            category: category.parse()?,
            question: validate_field("question", question)?,
            answer: validate_field("answer", answer)?,
        })
    }

    /// Text fed to the similarity matcher.
    pub fn similarity_text(&self) -> String {
        format!("{} {}", self.question, self.answer)
    }
}

/// Trim a free-text field and check it is non-empty and short enough.
pub fn validate_field(name: &str, value: &str) -> Result<String, FlowError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FlowError::validation(format!("{} is required", name)));
    }
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(FlowError::validation(format!(
            "{} exceeds {} characters",
            name, MAX_FIELD_LEN
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!("DEV".parse::<Category>().unwrap(), Category::Dev);
        assert_eq!(" blondes ".parse::<Category>().unwrap(), Category::Blondes);
    }

    #[test]
    fn test_unknown_category_is_validation_error() {
        let err = "pun".parse::<Category>().unwrap_err();
        assert!(matches!(err, FlowError::Validation { .. }));
    }

    #[test]
    fn test_payload_parse_trims_fields() {
        let payload = JokePayload::parse("global", "  Q1 ", "A1\n").unwrap();
        assert_eq!(payload.question, "Q1");
        assert_eq!(payload.answer, "A1");
    }

    #[test]
    fn test_payload_rejects_empty_answer() {
        assert!(JokePayload::parse("global", "Q1", "   ").is_err());
    }

    #[test]
    fn test_payload_rejects_overlong_question() {
        let long = "x".repeat(MAX_FIELD_LEN + 1);
        assert!(JokePayload::parse("global", &long, "A").is_err());

        let exact = "é".repeat(MAX_FIELD_LEN);
        assert!(JokePayload::parse("global", &exact, "A").is_ok());
    }

    #[test]
    fn test_joke_uses_dataset_field_names() {
        let joke: Joke = serde_json::from_str(
            r#"{"id": 3, "type": "dev", "joke": "Q", "answer": "A"}"#,
        )
        .unwrap();
        assert_eq!(joke.id, JokeId(3));
        assert_eq!(joke.category, Category::Dev);
        assert_eq!(joke.question, "Q");
    }
}
