// IntelliPest 🌿 AGPL-3.0 License

//! Raw model output decoding.
//!
//! Turns a backend's [`RawOutput`] into a ranked class-prediction list.
//! The pipeline is flatten → reconcile against the known class count →
//! normalize to probabilities → rank. Malformed output is never an error
//! at this layer: anything undecodable yields an empty prediction list
//! and the engine reports a no-detection outcome. Confidence
//! thresholding is the caller's concern, not the decoder's.

use crate::backend::RawOutput;
use crate::labels::PestClass;
use crate::results::ClassPrediction;

/// Confidence sums inside this band are treated as already normalized;
/// anything outside goes through softmax.
const NORMALIZED_SUM_RANGE: std::ops::RangeInclusive<f32> = 0.9..=1.1;

/// Decode raw backend output into the full ranked prediction list.
///
/// Scores are reconciled to `expected_classes` entries (extra scores are
/// dropped, missing ones read as zero), normalized, and sorted by
/// descending confidence with ties broken by ascending class index.
/// Every class appears in the result; nothing is filtered here.
#[must_use]
pub fn decode(raw: &RawOutput, expected_classes: usize) -> Vec<ClassPrediction> {
    let Some(scores) = flatten(raw) else {
        return Vec::new();
    };
    if scores.is_empty() || expected_classes == 0 {
        return Vec::new();
    }

    let scores = reconcile(scores, expected_classes);
    let probs = normalize(&scores);
    rank(&probs)
}

/// Collapse the output variants into a single score buffer.
///
/// Nested output contributes its first row (the sole batch element);
/// an empty nesting decodes to nothing.
fn flatten(raw: &RawOutput) -> Option<Vec<f32>> {
    match raw {
        RawOutput::Flat(data) => Some(data.clone()),
        RawOutput::Shaped { data, .. } => Some(data.clone()),
        RawOutput::Nested(rows) => rows.first().cloned(),
    }
}

/// Force the score buffer to exactly `expected` entries.
fn reconcile(mut scores: Vec<f32>, expected: usize) -> Vec<f32> {
    scores.resize(expected, 0.0);
    scores
}

/// Normalize scores to probabilities.
///
/// Already-normalized output (sum within [0.9, 1.1]) passes through
/// untouched; raw logits go through a max-subtracted softmax. A zero or
/// non-finite exponent sum degrades to the uniform distribution.
fn normalize(scores: &[f32]) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    if sum.is_finite() && NORMALIZED_SUM_RANGE.contains(&sum) {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let exp_sum: f32 = exps.iter().sum();

    if exp_sum > 0.0 && exp_sum.is_finite() {
        exps.iter().map(|&e| e / exp_sum).collect()
    } else {
        vec![1.0 / scores.len() as f32; scores.len()]
    }
}

/// Rank probabilities descending.
///
/// The sort is stable on confidence only, so equal-confidence classes
/// keep their ascending index order.
fn rank(probs: &[f32]) -> Vec<ClassPrediction> {
    let mut ranked: Vec<ClassPrediction> = probs
        .iter()
        .enumerate()
        .map(|(index, &confidence)| ClassPrediction {
            class_index: index,
            label: PestClass::label(index),
            confidence,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
