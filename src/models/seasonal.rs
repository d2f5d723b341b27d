//! Seasonal model adapter.
//!
//! Wraps a seasonal time-series fit exported as an intercept plus
//! autoregressive coefficients over recent goal counts and coefficients
//! over exogenous match features. Confidence derives from the residual
//! variance of the fit; the distribution is approximated by a Poisson PMF
//! evaluated at the forecast mean.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use super::artifacts::ArtifactSet;
use super::{GoalDistribution, ModelAdapter, ModelKind, ModelOutcome};
use crate::engine::features::ResolvedFeatures;

const ARTIFACT_PREFIX: &str = "seasonal";

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonalArtifact {
    pub intercept: f64,
    /// AR coefficients; `ar[i]` applies to the goal count `i + 1` matches ago.
    pub ar: Vec<f64>,
    /// Exogenous regressor names, matched by resolved-feature name.
    pub exog_features: Vec<String>,
    pub exog_coefs: Vec<f64>,
    pub residual_std: f64,
}

fn validate(artifact: &SeasonalArtifact) -> Result<(), String> {
    if artifact.exog_features.len() != artifact.exog_coefs.len() {
        return Err(format!(
            "exogenous arity mismatch: {} names, {} coefficients",
            artifact.exog_features.len(),
            artifact.exog_coefs.len()
        ));
    }
    if !(artifact.residual_std >= 0.0) {
        return Err("residual_std must be non-negative".to_string());
    }
    Ok(())
}

pub struct SeasonalModel {
    artifacts: Arc<ArtifactSet<SeasonalArtifact>>,
}

impl SeasonalModel {
    pub fn load(dir: &Path, players: &[String]) -> Self {
        Self::new(ArtifactSet::load(dir, ARTIFACT_PREFIX, players, validate))
    }

    pub fn new(artifacts: ArtifactSet<SeasonalArtifact>) -> Self {
        Self {
            artifacts: Arc::new(artifacts),
        }
    }
}

#[async_trait]
impl ModelAdapter for SeasonalModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Seasonal
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

fn evaluate(artifacts: &ArtifactSet<SeasonalArtifact>, features: &ResolvedFeatures) -> ModelOutcome {
    let Some(artifact) = artifacts.artifact(&features.player) else {
        return ModelOutcome::unavailable();
    };

    let mut forecast = artifact.intercept;

    // AR terms over the most recent goal counts; lags past the start of
    // the player's history contribute nothing.
    let history_len = features.history.len();
    for (lag, coef) in artifact.ar.iter().enumerate() {
        if lag < history_len {
            forecast += coef * features.history[history_len - 1 - lag].goals as f64;
        }
    }

    for (name, coef) in artifact.exog_features.iter().zip(&artifact.exog_coefs) {
        forecast += coef * features.feature(name);
    }

    if !forecast.is_finite() {
        return ModelOutcome::failed("non-finite forecast");
    }

    let raw = forecast.max(0.0);
    let variance = artifact.residual_std * artifact.residual_std;
    let confidence = 1.0 / (1.0 + variance);
    let distribution = GoalDistribution::from_poisson(raw);

    ModelOutcome::success(raw, confidence, Some(distribution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{record, HistoricalData};
    use crate::engine::features::{resolve, FEAT_AVG_VS_OPPONENT, FEAT_HOME};
    use crate::engine::PredictionRequest;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn artifact() -> SeasonalArtifact {
        SeasonalArtifact {
            intercept: 0.3,
            ar: vec![0.4, 0.2],
            exog_features: vec![FEAT_HOME.to_string(), FEAT_AVG_VS_OPPONENT.to_string()],
            exog_coefs: vec![0.25, 0.5],
            residual_std: 0.7,
        }
    }

    fn model_for(player: &str, artifact: SeasonalArtifact) -> SeasonalModel {
        let mut states = HashMap::new();
        states.insert(player.to_string(), Ok(artifact));
        SeasonalModel::new(ArtifactSet::from_states(states))
    }

    fn resolved(data: &HistoricalData, player: &str) -> ResolvedFeatures {
        let request = PredictionRequest {
            player_name: player.to_string(),
            opponent: "Junior".to_string(),
            is_home: true,
            date: None,
            shots_on_target: None,
            total_shots: None,
            minutes: None,
            model_selection: None,
        };
        resolve(data, &request)
    }

    #[test]
    fn validate_rejects_exog_mismatch() {
        let mut bad = artifact();
        bad.exog_coefs.pop();
        assert!(validate(&bad).is_err());
        assert!(validate(&artifact()).is_ok());
    }

    #[tokio::test]
    async fn forecasts_from_ar_and_exogenous_terms() {
        let data = HistoricalData::from_records(vec![
            record("Dayro_Moreno", "2025-01-05", "Junior", 1, true),
            record("Dayro_Moreno", "2025-01-12", "Junior", 2, true),
        ]);
        let model = model_for("Dayro_Moreno", artifact());
        let outcome = model.predict(&resolved(&data, "Dayro_Moreno")).await;

        assert!(outcome.available);
        // avg_vs_opponent("Junior") = 1.5, home = 1.
        // 0.3 + 0.4*2 + 0.2*1 + 0.25*1 + 0.5*1.5 = 2.3
        assert_relative_eq!(outcome.raw.unwrap(), 2.3, epsilon = 1e-9);
        assert_eq!(outcome.prediction, Some(2));
        // variance 0.49 → confidence 1/1.49
        assert_relative_eq!(outcome.confidence.unwrap(), 1.0 / 1.49, epsilon = 1e-9);

        let dist = outcome.probability_distribution.expect("approximated PMF");
        assert_relative_eq!(dist.sum(), 1.0, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn empty_history_still_forecasts() {
        let data = HistoricalData::from_records(vec![]);
        let model = model_for("Ghost", artifact());
        let outcome = model.predict(&resolved(&data, "Ghost")).await;

        assert!(outcome.available);
        // No AR contribution, avg_vs_opponent 0: 0.3 + 0.25 = 0.55
        assert_relative_eq!(outcome.raw.unwrap(), 0.55, epsilon = 1e-9);
        assert_eq!(outcome.prediction, Some(1));
    }

    #[tokio::test]
    async fn missing_artifact_is_model_unavailable() {
        let data = HistoricalData::from_records(vec![]);
        let model = SeasonalModel::new(ArtifactSet::from_states(HashMap::new()));
        let outcome = model.predict(&resolved(&data, "Ghost")).await;
        assert!(!outcome.available);
        assert_eq!(
            outcome.error.as_deref(),
            Some(super::super::ERR_MODEL_UNAVAILABLE)
        );
    }
}
