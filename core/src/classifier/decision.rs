//! Turns a score vector into a labelled prediction.

use super::labels::LabelTable;
use super::runtime::softmax;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Winning class of a classification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Index into the label table
    pub index: usize,
    /// Human-readable class name
    pub label: String,
    /// Raw model score
    pub score: f32,
    /// Softmax probability of this class (0.0-1.0)
    pub confidence: f32,
}

/// Index of the largest score. Ties go to the first index.
///
/// Scores that are NaN, `-inf` or `f32::MIN` can never win.
pub fn argmax(scores: &[f32]) -> Result<usize, DecisionError> {
    if scores.is_empty() {
        return Err(DecisionError::EmptyScores);
    }

    let mut best = f32::MIN;
    let mut best_index = None;
    for (i, &score) in scores.iter().enumerate() {
        if score > best {
            best = score;
            best_index = Some(i);
        }
    }

    best_index.ok_or(DecisionError::NoValidScore)
}

/// Pick the winning class and look up its label.
///
/// The score vector must be exactly as long as the label table.
pub fn decide(scores: &[f32], labels: &LabelTable) -> Result<Prediction, DecisionError> {
    check_lengths(scores, labels)?;
    let index = argmax(scores)?;
    let probabilities = softmax(scores);
    prediction_at(index, scores, &probabilities, labels)
}

/// The `k` highest-scoring classes, best first. Equal scores keep index
/// order, so the first entry is always the [`argmax`] winner.
pub fn top_k(scores: &[f32], labels: &LabelTable, k: usize) -> Result<Vec<Prediction>, DecisionError> {
    check_lengths(scores, labels)?;
    argmax(scores)?;

    let probabilities = softmax(scores);
    let mut indexed: Vec<usize> = (0..scores.len()).filter(|&i| !scores[i].is_nan()).collect();
    indexed.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
    });

    indexed
        .into_iter()
        .take(k)
        .map(|index| prediction_at(index, scores, &probabilities, labels))
        .collect()
}

fn check_lengths(scores: &[f32], labels: &LabelTable) -> Result<(), DecisionError> {
    if scores.len() != labels.len() {
        return Err(DecisionError::LengthMismatch {
            scores: scores.len(),
            labels: labels.len(),
        });
    }
    Ok(())
}

fn prediction_at(
    index: usize,
    scores: &[f32],
    probabilities: &[f32],
    labels: &LabelTable,
) -> Result<Prediction, DecisionError> {
    let label = labels.get(index).ok_or(DecisionError::IndexOutOfRange {
        index,
        len: labels.len(),
    })?;
    Ok(Prediction {
        index,
        label: label.to_string(),
        score: scores[index],
        confidence: probabilities.get(index).copied().unwrap_or(0.0),
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("model returned no scores")]
    EmptyScores,
    #[error("model returned no comparable score")]
    NoValidScore,
    #[error("model returned {scores} scores but the label table has {labels} entries")]
    LengthMismatch { scores: usize, labels: usize },
    #[error("class index {index} is outside the label table ({len} entries)")]
    IndexOutOfRange { index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> LabelTable {
        LabelTable::new((0..n).map(|i| format!("class-{}", i))).unwrap()
    }

    #[test]
    fn first_maximum_wins() {
        assert_eq!(argmax(&[0.1, 0.9, 0.9, 0.2]), Ok(1));
        assert_eq!(argmax(&[5.0, 5.0, 5.0]), Ok(0));
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Ok(1));
    }

    #[test]
    fn empty_and_incomparable_scores_are_errors() {
        assert_eq!(argmax(&[]), Err(DecisionError::EmptyScores));
        assert_eq!(
            argmax(&[f32::NAN, f32::NEG_INFINITY, f32::MIN]),
            Err(DecisionError::NoValidScore)
        );
        assert_eq!(argmax(&[f32::NAN, 0.5, f32::NAN]), Ok(1));
    }

    #[test]
    fn decide_maps_index_to_label() {
        let table = labels(4);
        let prediction = decide(&[0.0, 0.0, 1.0, 0.0], &table).unwrap();
        assert_eq!(prediction.index, 2);
        assert_eq!(prediction.label, "class-2");
        assert_eq!(prediction.score, 1.0);
        assert!(prediction.confidence > 0.25 && prediction.confidence < 1.0);
    }

    #[test]
    fn decide_checks_length_before_indexing() {
        let table = labels(3);
        assert_eq!(
            decide(&[0.1, 0.2, 0.3, 0.9], &table),
            Err(DecisionError::LengthMismatch { scores: 4, labels: 3 })
        );
        assert_eq!(
            decide(&[], &table),
            Err(DecisionError::LengthMismatch { scores: 0, labels: 3 })
        );
    }

    #[test]
    fn top_k_orders_by_score_and_keeps_ties_stable() {
        let table = labels(5);
        let ranked = top_k(&[0.2, 0.7, 0.1, 0.7, 0.4], &table, 3).unwrap();
        let indices: Vec<usize> = ranked.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 3, 4]);
        assert_eq!(ranked[0], decide(&[0.2, 0.7, 0.1, 0.7, 0.4], &table).unwrap());
    }

    #[test]
    fn top_k_treats_signed_zeros_as_a_tie() {
        let table = labels(3);
        let scores = [-0.0, 0.0, -1.0];
        let ranked = top_k(&scores, &table, 1).unwrap();
        assert_eq!(ranked[0].index, 0);
        assert_eq!(ranked[0], decide(&scores, &table).unwrap());
    }

    #[test]
    fn top_k_larger_than_table_returns_everything() {
        let table = labels(2);
        assert_eq!(top_k(&[1.0, 2.0], &table, 10).unwrap().len(), 2);
    }
}
