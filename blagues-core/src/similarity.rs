//! Near-duplicate detection for submissions.
//!
//! Scores are Sørensen–Dice coefficients over character bigrams with
//! whitespace ignored, in `[0, 1]`.

use serde::Serialize;

/// Best-scoring corpus entry for a candidate text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BestMatch {
    pub score: f64,
    /// `None` only when the corpus is empty.
    pub index: Option<usize>,
}

impl BestMatch {
    pub const NONE: BestMatch = BestMatch {
        score: 0.0,
        index: None,
    };
}

/// Score `candidate` against every corpus entry and keep the best one.
///
/// Ties keep the earliest entry.
pub fn best_match<S: AsRef<str>>(candidate: &str, corpus: &[S]) -> BestMatch {
    corpus
        .iter()
        .enumerate()
        .fold(BestMatch::NONE, |best, (index, text)| {
            let score = strsim::sorensen_dice(candidate, text.as_ref());
            if best.index.is_none() || score > best.score {
                BestMatch {
                    score,
                    index: Some(index),
                }
            } else {
                best
            }
        })
}

/// What the submission flow does with a match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimilarityVerdict {
    /// Reject: the item already exists.
    Duplicate { index: usize, score: f64 },
    /// Accept, but show the close match alongside.
    Similar { index: usize, score: f64 },
    Distinct,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityPolicy {
    /// Scores strictly above this are duplicates.
    pub duplicate_threshold: f64,
    /// Scores strictly above this (and not duplicates) get a notice.
    pub similar_threshold: f64,
}

impl Default for SimilarityPolicy {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.8,
            similar_threshold: 0.6,
        }
    }
}

impl SimilarityPolicy {
    pub fn classify(&self, found: BestMatch) -> SimilarityVerdict {
        let Some(index) = found.index else {
            return SimilarityVerdict::Distinct;
        };
        if found.score > self.duplicate_threshold {
            SimilarityVerdict::Duplicate {
                index,
                score: found.score,
            }
        } else if found.score > self.similar_threshold {
            SimilarityVerdict::Similar {
                index,
                score: found.score,
            }
        } else {
            SimilarityVerdict::Distinct
        }
    }
}
