//! The adapter seam: one uniform interface over three structurally
//! different predictive models. Each adapter is independently fallible and
//! reports failure as data (`ModelOutcome.error`), never as an `Err` that
//! could abort the ensemble call.

use async_trait::async_trait;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use statrs::distribution::{Discrete, Poisson};

pub mod artifacts;
pub mod count;
pub mod seasonal;
pub mod sequence;

pub use count::CountModel;
pub use seasonal::SeasonalModel;
pub use sequence::SequenceModel;

use crate::engine::features::ResolvedFeatures;

/// Number of exact goal buckets (0..=4); everything above lands in "5+".
pub const EXACT_BUCKETS: usize = 5;

/// Error string for artifacts that failed to load at startup.
pub const ERR_MODEL_UNAVAILABLE: &str = "model_unavailable";

/// The three model families, in ensemble-weight order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Sequence,
    Seasonal,
    Count,
}

pub const MODEL_KINDS: [ModelKind; 3] = [ModelKind::Sequence, ModelKind::Seasonal, ModelKind::Count];

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Sequence => "sequence",
            ModelKind::Seasonal => "seasonal",
            ModelKind::Count => "count",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round half-up on the non-negative goal scale: 2.5 rounds to 3.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Probability distribution over goal-count buckets 0..=4 plus "5+".
/// Values are non-negative and sum to 1 within 1e-6 once normalized; the
/// overflow bucket always serializes last.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalDistribution {
    probs: [f64; EXACT_BUCKETS + 1],
}

impl GoalDistribution {
    pub fn new(probs: [f64; EXACT_BUCKETS + 1]) -> Self {
        Self { probs }
    }

    pub fn zero() -> Self {
        Self::new([0.0; EXACT_BUCKETS + 1])
    }

    /// Poisson PMF at `rate` over the exact buckets, tail mass in "5+".
    /// A non-positive rate degenerates to a point mass on zero goals.
    pub fn from_poisson(rate: f64) -> Self {
        let point_mass_on_zero = || {
            let mut probs = [0.0; EXACT_BUCKETS + 1];
            probs[0] = 1.0;
            Self::new(probs)
        };
        if !rate.is_finite() || rate <= 0.0 {
            return point_mass_on_zero();
        }
        let Ok(poisson) = Poisson::new(rate) else {
            return point_mass_on_zero();
        };
        let mut probs = [0.0; EXACT_BUCKETS + 1];
        let mut cumulative = 0.0;
        for (goals, slot) in probs.iter_mut().take(EXACT_BUCKETS).enumerate() {
            *slot = poisson.pmf(goals as u64);
            cumulative += *slot;
        }
        probs[EXACT_BUCKETS] = (1.0 - cumulative).max(0.0);
        Self::new(probs)
    }

    pub fn bucket_label(index: usize) -> String {
        if index >= EXACT_BUCKETS {
            format!("{EXACT_BUCKETS}+")
        } else {
            index.to_string()
        }
    }

    pub fn prob(&self, bucket: usize) -> f64 {
        self.probs[bucket.min(EXACT_BUCKETS)]
    }

    /// Mass assigned to an integer goal count; counts past the exact range
    /// read the overflow bucket.
    pub fn prob_for_count(&self, goals: i64) -> f64 {
        if goals < 0 {
            0.0
        } else {
            self.prob(goals as usize)
        }
    }

    pub fn add_weighted(&mut self, other: &GoalDistribution, weight: f64) {
        for (slot, p) in self.probs.iter_mut().zip(other.probs.iter()) {
            *slot += weight * p;
        }
    }

    pub fn sum(&self) -> f64 {
        self.probs.iter().sum()
    }

    /// Renormalize so the buckets sum to exactly 1.0, absorbing floating
    /// drift from weighted combination. A zero-mass distribution collapses
    /// to a point mass on zero goals.
    pub fn normalized(&self) -> Self {
        let total = self.sum();
        if total <= 0.0 {
            let mut probs = [0.0; EXACT_BUCKETS + 1];
            probs[0] = 1.0;
            return Self::new(probs);
        }
        let mut probs = self.probs;
        for p in probs.iter_mut() {
            *p /= total;
        }
        Self::new(probs)
    }
}

impl Serialize for GoalDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.probs.len()))?;
        for (index, p) in self.probs.iter().enumerate() {
            map.serialize_entry(&Self::bucket_label(index), p)?;
        }
        map.end()
    }
}

/// Serialize an optional distribution as an empty map when absent, so the
/// response field is always a well-formed object.
pub fn serialize_opt_distribution<S: Serializer>(
    value: &Option<GoalDistribution>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(dist) => dist.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

/// The outcome of one adapter for one request.
///
/// Invariant (enforced by the constructors): `available == false` implies
/// `prediction`, `confidence` and `raw` are all `None` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelOutcome {
    pub prediction: Option<i64>,
    pub confidence: Option<f64>,
    pub raw: Option<f64>,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability_distribution: Option<GoalDistribution>,
}

impl ModelOutcome {
    /// Artifact never loaded; reported once per request without detail
    /// (the load error itself goes to the startup log).
    pub fn unavailable() -> Self {
        Self::error_outcome(ERR_MODEL_UNAVAILABLE.to_string())
    }

    /// Runtime prediction failure, downgraded to data.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::error_outcome(format!("prediction_failed: {reason}"))
    }

    fn error_outcome(error: String) -> Self {
        Self {
            prediction: None,
            confidence: None,
            raw: None,
            available: false,
            error: Some(error),
            probability_distribution: None,
        }
    }

    /// Successful prediction: clamps the raw value to the non-negative
    /// goal scale, rounds half-up once, and clamps confidence into [0,1].
    pub fn success(raw: f64, confidence: f64, distribution: Option<GoalDistribution>) -> Self {
        let raw = raw.max(0.0);
        Self {
            prediction: Some(round_half_up(raw)),
            confidence: Some(confidence.clamp(0.0, 1.0)),
            raw: Some(raw),
            available: true,
            error: None,
            probability_distribution: distribution,
        }
    }
}

/// Uniform capability interface over the three model families. Prediction
/// is CPU-bound, so implementations run it under `spawn_blocking`; the
/// facade applies the per-adapter deadline on top.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Whether this model's artifact loaded for the given player.
    fn is_available(&self, player: &str) -> bool;

    /// (artifacts loaded, players in catalog), surfaced by `status()`.
    fn loaded_players(&self) -> (usize, usize);

    async fn predict(&self, features: &ResolvedFeatures) -> ModelOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn round_half_up_is_not_bankers_rounding() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.4999), 2);
        assert_eq!(round_half_up(0.5), 1);
        assert_eq!(round_half_up(0.0), 0);
        assert_eq!(round_half_up(1.5), 2);
    }

    #[test]
    fn poisson_distribution_sums_to_one() {
        for rate in [0.2, 0.9, 1.7, 3.4, 5.0] {
            let dist = GoalDistribution::from_poisson(rate);
            assert_relative_eq!(dist.sum(), 1.0, epsilon = 1e-6);
            for bucket in 0..=EXACT_BUCKETS {
                assert!(dist.prob(bucket) >= 0.0);
            }
        }
    }

    #[test]
    fn zero_rate_is_a_point_mass_on_zero_goals() {
        let dist = GoalDistribution::from_poisson(0.0);
        assert_relative_eq!(dist.prob(0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(dist.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn overflow_bucket_serializes_last() {
        let dist = GoalDistribution::from_poisson(1.2);
        let json = serde_json::to_string(&dist).unwrap();
        assert!(json.starts_with(r#"{"0":"#));
        assert!(json.contains(r#""5+":"#));
        let tail = json.rfind("\"5+\"").unwrap();
        for bucket in ["\"0\"", "\"1\"", "\"2\"", "\"3\"", "\"4\""] {
            assert!(json.find(bucket).unwrap() < tail);
        }
    }

    #[test]
    fn normalized_absorbs_drift() {
        let dist = GoalDistribution::new([0.3, 0.3, 0.2, 0.1, 0.05, 0.10001]);
        assert_relative_eq!(dist.normalized().sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn unavailable_outcome_upholds_invariant() {
        let outcome = ModelOutcome::unavailable();
        assert!(!outcome.available);
        assert_eq!(outcome.prediction, None);
        assert_eq!(outcome.confidence, None);
        assert_eq!(outcome.raw, None);
        assert_eq!(outcome.error.as_deref(), Some(ERR_MODEL_UNAVAILABLE));
    }

    #[test]
    fn failed_outcome_prefixes_reason() {
        let outcome = ModelOutcome::failed("timeout");
        assert_eq!(outcome.error.as_deref(), Some("prediction_failed: timeout"));
        assert!(!outcome.available);
    }

    #[test]
    fn success_clamps_and_rounds_once() {
        let outcome = ModelOutcome::success(-0.4, 1.7, None);
        assert_eq!(outcome.raw, Some(0.0));
        assert_eq!(outcome.prediction, Some(0));
        assert_eq!(outcome.confidence, Some(1.0));

        let outcome = ModelOutcome::success(2.5, 0.6, None);
        assert_eq!(outcome.prediction, Some(3));
    }
}
