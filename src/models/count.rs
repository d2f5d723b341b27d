//! Count model adapter.
//!
//! Wraps a Poisson regression (log link) over named match features. This
//! is the one model family that always produces a full probability
//! distribution: the exact PMF over 0..=4 goals with the tail mass in
//! "5+". Confidence is the PMF mass at the rounded point prediction.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use super::artifacts::ArtifactSet;
use super::{round_half_up, GoalDistribution, ModelAdapter, ModelKind, ModelOutcome};
use crate::engine::features::ResolvedFeatures;

const ARTIFACT_PREFIX: &str = "count";

/// Ceiling for the predicted rate; keeps a degenerate fit from pushing
/// the whole distribution into the overflow bucket.
const MAX_RATE: f64 = 5.0;

#[derive(Debug, Clone, Deserialize)]
pub struct CountArtifact {
    pub intercept: f64,
    /// Regressor names, matched by resolved-feature name.
    pub features: Vec<String>,
    pub coefs: Vec<f64>,
}

fn validate(artifact: &CountArtifact) -> Result<(), String> {
    if artifact.features.len() != artifact.coefs.len() {
        return Err(format!(
            "regressor arity mismatch: {} names, {} coefficients",
            artifact.features.len(),
            artifact.coefs.len()
        ));
    }
    Ok(())
}

pub struct CountModel {
    artifacts: Arc<ArtifactSet<CountArtifact>>,
}

impl CountModel {
    pub fn load(dir: &Path, players: &[String]) -> Self {
        Self::new(ArtifactSet::load(dir, ARTIFACT_PREFIX, players, validate))
    }

    pub fn new(artifacts: ArtifactSet<CountArtifact>) -> Self {
        Self {
            artifacts: Arc::new(artifacts),
        }
    }
}

#[async_trait]
impl ModelAdapter for CountModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Count
    }

    fn is_available(&self, player: &str) -> bool {
        self.artifacts.is_loaded(player)
    }

    fn loaded_players(&self) -> (usize, usize) {
        (self.artifacts.loaded_count(), self.artifacts.len())
    }

    async fn predict(&self, features: &ResolvedFeatures) -> ModelOutcome {
        let artifacts = Arc::clone(&self.artifacts);
        let features = features.clone();
        match tokio::task::spawn_blocking(move || evaluate(&artifacts, &features)).await {
            Ok(outcome) => outcome,
            Err(e) => ModelOutcome::failed(format_args!("adapter task aborted: {e}")),
        }
    }
}

fn evaluate(artifacts: &ArtifactSet<CountArtifact>, features: &ResolvedFeatures) -> ModelOutcome {
    let Some(artifact) = artifacts.artifact(&features.player) else {
        return ModelOutcome::unavailable();
    };

    let mut eta = artifact.intercept;
    for (name, coef) in artifact.features.iter().zip(&artifact.coefs) {
        eta += coef * features.feature(name);
    }

    let rate = eta.exp();
    if !rate.is_finite() {
        return ModelOutcome::failed("non-finite rate");
    }
    let rate = rate.min(MAX_RATE);

    let distribution = GoalDistribution::from_poisson(rate);
    let confidence = distribution.prob_for_count(round_half_up(rate));

    ModelOutcome::success(rate, confidence, Some(distribution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::HistoricalData;
    use crate::engine::features::{resolve, FEAT_HOME, FEAT_SHOTS_ON_TARGET};
    use crate::engine::PredictionRequest;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn artifact() -> CountArtifact {
        CountArtifact {
            intercept: -0.2,
            features: vec![FEAT_HOME.to_string(), FEAT_SHOTS_ON_TARGET.to_string()],
            coefs: vec![0.3, 0.15],
        }
    }

    fn model_for(player: &str, artifact: CountArtifact) -> CountModel {
        let mut states = HashMap::new();
        states.insert(player.to_string(), Ok(artifact));
        CountModel::new(ArtifactSet::from_states(states))
    }

    fn resolved(shots_on_target: Option<f64>) -> ResolvedFeatures {
        let data = HistoricalData::from_records(vec![]);
        let request = PredictionRequest {
            player_name: "Carlos_Bacca".to_string(),
            opponent: "Junior".to_string(),
            is_home: true,
            date: None,
            shots_on_target,
            total_shots: None,
            minutes: None,
            model_selection: None,
        };
        resolve(&data, &request)
    }

    #[test]
    fn validate_rejects_arity_mismatch() {
        let mut bad = artifact();
        bad.coefs.pop();
        assert!(validate(&bad).is_err());
        assert!(validate(&artifact()).is_ok());
    }

    #[tokio::test]
    async fn rate_confidence_and_distribution_are_consistent() {
        let model = model_for("Carlos_Bacca", artifact());
        let outcome = model.predict(&resolved(Some(4.0))).await;

        assert!(outcome.available);
        // eta = -0.2 + 0.3 + 0.6 = 0.7, rate = e^0.7
        let rate = 0.7f64.exp();
        assert_relative_eq!(outcome.raw.unwrap(), rate, epsilon = 1e-9);
        assert_eq!(outcome.prediction, Some(2));

        let dist = outcome.probability_distribution.as_ref().unwrap();
        assert_relative_eq!(dist.sum(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(
            outcome.confidence.unwrap(),
            dist.prob_for_count(2),
            epsilon = 1e-12
        );
    }

    #[tokio::test]
    async fn extreme_rates_are_clamped() {
        let extreme = CountArtifact {
            intercept: 4.0,
            features: vec![],
            coefs: vec![],
        };
        let model = model_for("Carlos_Bacca", extreme);
        let outcome = model.predict(&resolved(None)).await;
        assert_relative_eq!(outcome.raw.unwrap(), MAX_RATE, epsilon = 1e-12);
        let dist = outcome.probability_distribution.as_ref().unwrap();
        assert_relative_eq!(dist.sum(), 1.0, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn missing_artifact_is_model_unavailable() {
        let model = CountModel::new(ArtifactSet::from_states(HashMap::new()));
        let outcome = model.predict(&resolved(None)).await;
        assert!(!outcome.available);
        assert_eq!(
            outcome.error.as_deref(),
            Some(super::super::ERR_MODEL_UNAVAILABLE)
        );
    }
}
