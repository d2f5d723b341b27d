//! Ensemble combination.
//!
//! Merges the available per-model outcomes into one prediction under a
//! configurable selection-and-weighting policy. Pure and deterministic:
//! identical inputs produce byte-identical output. Callers must not rely
//! on supplied weights summing to anything in particular: the canonical
//! renormalization happens here, every time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{round_half_up, GoalDistribution, ModelKind, ModelOutcome, MODEL_KINDS};

/// Terminal (non-fatal) outcome when the requested model subset has no
/// available member.
pub const ERR_NO_MODELS: &str = "no_models_available";

/// Default ensemble weights: 0.4 sequence / 0.3 seasonal / 0.3 count.
pub const DEFAULT_WEIGHTS: [(ModelKind, f64); 3] = [
    (ModelKind::Sequence, 0.4),
    (ModelKind::Seasonal, 0.3),
    (ModelKind::Count, 0.3),
];

/// Optional per-request model subset and weight overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSelection {
    #[serde(default = "all_models")]
    pub models: Vec<ModelKind>,
    #[serde(default)]
    pub weights: Option<BTreeMap<ModelKind, f64>>,
}

fn all_models() -> Vec<ModelKind> {
    MODEL_KINDS.to_vec()
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            models: all_models(),
            weights: None,
        }
    }
}

/// The deterministic part of an `EnsembleResult`: everything except the
/// per-request metadata echo and the timestamp, which the facade adds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Combined {
    pub prediction: Option<i64>,
    pub confidence: Option<f64>,
    pub raw_prediction: Option<f64>,
    pub probability_distribution: Option<GoalDistribution>,
    pub models_used: Vec<ModelKind>,
    pub weights: BTreeMap<ModelKind, f64>,
    pub error: Option<String>,
}

impl Combined {
    fn no_models() -> Self {
        Self {
            prediction: None,
            confidence: None,
            raw_prediction: None,
            probability_distribution: None,
            models_used: Vec::new(),
            weights: BTreeMap::new(),
            error: Some(ERR_NO_MODELS.to_string()),
        }
    }
}

/// Combine the per-model outcomes under the given selection.
pub fn combine(
    outcomes: &BTreeMap<ModelKind, ModelOutcome>,
    selection: Option<&ModelSelection>,
) -> Combined {
    let requested: BTreeSet<ModelKind> = selection
        .map(|s| s.models.iter().copied().collect())
        .unwrap_or_else(|| MODEL_KINDS.iter().copied().collect());

    // A model counts as available only if its outcome carries a raw value.
    let available: Vec<ModelKind> = requested
        .iter()
        .copied()
        .filter(|kind| {
            outcomes
                .get(kind)
                .map(|o| o.available && o.raw.is_some())
                .unwrap_or(false)
        })
        .collect();

    if available.is_empty() {
        return Combined::no_models();
    }

    let weights = effective_weights(&available, selection.and_then(|s| s.weights.as_ref()));

    // Weighted raw sum; rounding happens exactly once, after combination.
    let raw: f64 = available
        .iter()
        .map(|kind| weights[kind] * outcomes[kind].raw.unwrap_or(0.0))
        .sum();
    let raw = raw.max(0.0);

    let confidence = combine_confidence(&available, &weights, outcomes);
    let distribution = combine_distribution(&available, &weights, outcomes);

    Combined {
        prediction: Some(round_half_up(raw)),
        confidence,
        raw_prediction: Some(raw),
        probability_distribution: distribution,
        models_used: available,
        weights,
        error: None,
    }
}

/// Restrict weights to the available models and renormalize to sum to 1.
/// Supplied weights missing an available model give it zero weight; a
/// zero-sum restriction falls back to equal weights over the subset.
fn effective_weights(
    available: &[ModelKind],
    supplied: Option<&BTreeMap<ModelKind, f64>>,
) -> BTreeMap<ModelKind, f64> {
    let defaults: BTreeMap<ModelKind, f64> = DEFAULT_WEIGHTS.iter().copied().collect();
    let source = supplied.unwrap_or(&defaults);

    let mut restricted: BTreeMap<ModelKind, f64> = available
        .iter()
        .map(|kind| (*kind, source.get(kind).copied().unwrap_or(0.0).max(0.0)))
        .collect();

    let total: f64 = restricted.values().sum();
    if total > 0.0 {
        for weight in restricted.values_mut() {
            *weight /= total;
        }
    } else {
        let equal = 1.0 / available.len() as f64;
        for weight in restricted.values_mut() {
            *weight = equal;
        }
    }
    restricted
}

/// Confidence is averaged only over models that reported one, reweighted
/// among themselves; a model without confidence drops out entirely.
fn combine_confidence(
    available: &[ModelKind],
    weights: &BTreeMap<ModelKind, f64>,
    outcomes: &BTreeMap<ModelKind, ModelOutcome>,
) -> Option<f64> {
    let with_confidence: Vec<(f64, f64)> = available
        .iter()
        .filter_map(|kind| outcomes[kind].confidence.map(|c| (weights[kind], c)))
        .collect();
    if with_confidence.is_empty() {
        return None;
    }
    let weight_sum: f64 = with_confidence.iter().map(|(w, _)| w).sum();
    if weight_sum > 0.0 {
        Some(
            with_confidence
                .iter()
                .map(|(w, c)| w * c)
                .sum::<f64>()
                / weight_sum,
        )
    } else {
        // Every confident model carries zero prediction weight; fall back
        // to a plain mean rather than dropping confidence entirely.
        Some(with_confidence.iter().map(|(_, c)| c).sum::<f64>() / with_confidence.len() as f64)
    }
}

/// Bucket-wise weighted sum over the models that supplied a distribution,
/// with the prediction weight of the others redistributed proportionally,
/// renormalized at the end to absorb floating drift.
fn combine_distribution(
    available: &[ModelKind],
    weights: &BTreeMap<ModelKind, f64>,
    outcomes: &BTreeMap<ModelKind, ModelOutcome>,
) -> Option<GoalDistribution> {
    let with_distribution: Vec<(f64, &GoalDistribution)> = available
        .iter()
        .filter_map(|kind| {
            outcomes[kind]
                .probability_distribution
                .as_ref()
                .map(|d| (weights[kind], d))
        })
        .collect();
    if with_distribution.is_empty() {
        return None;
    }

    let weight_sum: f64 = with_distribution.iter().map(|(w, _)| w).sum();
    let equal = 1.0 / with_distribution.len() as f64;

    let mut combined = GoalDistribution::zero();
    for (weight, dist) in &with_distribution {
        let share = if weight_sum > 0.0 {
            weight / weight_sum
        } else {
            equal
        };
        combined.add_weighted(dist, share);
    }
    Some(combined.normalized())
}
