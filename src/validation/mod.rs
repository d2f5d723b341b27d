//! Validation of stored predictions against actual match results.
//!
//! A batch, single-pass, read-only pipeline: joins predictions to actuals
//! by exact (player, date_index) key, computes per-comparison fields, and
//! aggregates accuracy statistics overall and per model. A join miss is
//! not an error; it means the player did not play that round.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::models::ModelKind;

/// One stored prediction, carrying both the integer prediction (accuracy
/// is judged on this) and the decimal prediction (error magnitude is
/// measured on this).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub player: String,
    pub date_index: u32,
    pub model: ModelKind,
    pub predicted_goals: i64,
    pub predicted_decimal: f64,
}

/// One actual match result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualResult {
    pub player: String,
    pub date_index: u32,
    pub goals: i64,
    pub total_shots: Option<f64>,
    pub shots_on_target: Option<f64>,
}

/// One prediction paired with at most one actual result. `is_accurate`
/// and `difference` are only meaningful when `did_play` is true; consumers
/// must branch on `did_play` first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationComparison {
    pub prediction: PredictionRecord,
    pub actual: Option<ActualResult>,
    pub did_play: bool,
    pub is_accurate: bool,
    pub difference: f64,
}

/// Join predictions to actuals. Exact key match only; duplicate actuals
/// for a key keep the first occurrence.
pub fn compare(
    predictions: &[PredictionRecord],
    actuals: &[ActualResult],
) -> Vec<ValidationComparison> {
    let mut by_key: HashMap<(&str, u32), &ActualResult> = HashMap::new();
    for actual in actuals {
        by_key
            .entry((actual.player.as_str(), actual.date_index))
            .or_insert(actual);
    }

    predictions
        .iter()
        .map(|prediction| {
            let actual = by_key
                .get(&(prediction.player.as_str(), prediction.date_index))
                .copied();
            match actual {
                Some(actual) => ValidationComparison {
                    did_play: true,
                    is_accurate: prediction.predicted_goals == actual.goals,
                    difference: actual.goals as f64 - prediction.predicted_decimal,
                    prediction: prediction.clone(),
                    actual: Some(actual.clone()),
                },
                None => ValidationComparison {
                    did_play: false,
                    is_accurate: false,
                    difference: 0.0,
                    prediction: prediction.clone(),
                    actual: None,
                },
            }
        })
        .collect()
}

/// Accuracy statistics over a set of comparisons. `accuracy_pct` and
/// `mean_abs_error` are defined as 0 when no matches were played.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccuracyStats {
    pub total: usize,
    pub played: usize,
    pub accurate: usize,
    pub accuracy_pct: f64,
    pub mean_abs_error: f64,
}

#[derive(Default)]
struct Accumulator {
    total: usize,
    played: usize,
    accurate: usize,
    abs_error_sum: f64,
}

impl Accumulator {
    fn add(&mut self, comparison: &ValidationComparison) {
        self.total += 1;
        if comparison.did_play {
            self.played += 1;
            self.abs_error_sum += comparison.difference.abs();
            if comparison.is_accurate {
                self.accurate += 1;
            }
        }
    }

    fn finish(&self) -> AccuracyStats {
        let (accuracy_pct, mean_abs_error) = if self.played > 0 {
            (
                self.accurate as f64 / self.played as f64 * 100.0,
                self.abs_error_sum / self.played as f64,
            )
        } else {
            (0.0, 0.0)
        };
        AccuracyStats {
            total: self.total,
            played: self.played,
            accurate: self.accurate,
            accuracy_pct,
            mean_abs_error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub overall: AccuracyStats,
    pub per_model: BTreeMap<ModelKind, AccuracyStats>,
    /// Best model by accuracy, ties broken by lower mean absolute error,
    /// then by lexical model name for determinism.
    pub best_model: Option<ModelKind>,
}

pub fn summarize(comparisons: &[ValidationComparison]) -> ValidationSummary {
    let mut overall = Accumulator::default();
    let mut per_model: BTreeMap<ModelKind, Accumulator> = BTreeMap::new();

    for comparison in comparisons {
        overall.add(comparison);
        per_model
            .entry(comparison.prediction.model)
            .or_default()
            .add(comparison);
    }

    let per_model: BTreeMap<ModelKind, AccuracyStats> = per_model
        .into_iter()
        .map(|(kind, acc)| (kind, acc.finish()))
        .collect();

    let best_model = rank_models(&per_model);

    ValidationSummary {
        overall: overall.finish(),
        per_model,
        best_model,
    }
}

fn rank_models(per_model: &BTreeMap<ModelKind, AccuracyStats>) -> Option<ModelKind> {
    let mut ranked: Vec<(&ModelKind, &AccuracyStats)> = per_model.iter().collect();
    ranked.sort_by(|(a_kind, a), (b_kind, b)| {
        b.accuracy_pct
            .partial_cmp(&a.accuracy_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.mean_abs_error
                    .partial_cmp(&b.mean_abs_error)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a_kind.as_str().cmp(b_kind.as_str()))
    });
    ranked.first().map(|(kind, _)| **kind)
}
