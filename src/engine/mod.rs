//! The prediction service facade.
//!
//! Orchestrates resolver → adapters → combiner per request. The adapters
//! are logically independent and run concurrently, each under its own
//! deadline; the combiner waits for all of them to return or fail. All
//! preloaded state lives in one immutable `PredictionContext` built at
//! startup and shared by `Arc`; there is no module-level state.

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub mod ensemble;
pub mod features;

pub use ensemble::{combine, Combined, ModelSelection, DEFAULT_WEIGHTS, ERR_NO_MODELS};
pub use features::{FeatureOverrides, ResolvedFeatures};

use crate::config::Config;
use crate::data::{HistoricalData, MatchRecord};
use crate::models::{
    serialize_opt_distribution, CountModel, GoalDistribution, ModelAdapter, ModelKind,
    ModelOutcome, SeasonalModel, SequenceModel,
};

/// A single prediction request. Optional per-match values fall back to
/// historical averages during feature resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionRequest {
    pub player_name: String,
    pub opponent: String,
    pub is_home: bool,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub shots_on_target: Option<f64>,
    #[serde(default)]
    pub total_shots: Option<f64>,
    #[serde(default)]
    pub minutes: Option<f64>,
    #[serde(default)]
    pub model_selection: Option<ModelSelection>,
}

/// Input rejection, distinct from prediction failure: these are the only
/// errors a caller ever sees as errors. Everything downstream is data.
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("player_name is required")]
    MissingPlayerName,
    #[error("opponent is required")]
    MissingOpponent,
    #[error("unknown player: {0}")]
    UnknownPlayer(String),
    #[error("invalid model weights: {0}")]
    InvalidWeights(String),
}

/// Request echo attached to every result so callers can see what was
/// actually fed to the models.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionMetadata {
    pub opponent: String,
    pub opponent_normalized: String,
    pub is_home: bool,
    pub date: Option<NaiveDate>,
    /// The optional values exactly as requested.
    pub requested: FeatureOverrides,
    /// The values the models actually consumed.
    pub shots_on_target: f64,
    pub total_shots: f64,
    pub minutes: f64,
    /// Features substituted with defaults for lack of history.
    pub synthetic_features: Vec<String>,
    pub models_used: Vec<ModelKind>,
    /// Effective weights after restriction and renormalization.
    pub weights: BTreeMap<ModelKind, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The final response for one request. Constructed once, immutable, never
/// persisted by this service.
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleResult {
    pub player_name: String,
    pub prediction: Option<i64>,
    pub confidence: Option<f64>,
    pub raw_prediction: Option<f64>,
    pub model_predictions: BTreeMap<ModelKind, ModelOutcome>,
    #[serde(serialize_with = "serialize_opt_distribution")]
    pub probability_distribution: Option<GoalDistribution>,
    pub metadata: PredictionMetadata,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Online,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub status: StatusLevel,
    pub data_loaded: bool,
    pub players_available: usize,
    pub historical_data_rows: usize,
    /// Per model: "loaded/total players".
    pub models_availability: BTreeMap<ModelKind, String>,
    pub timestamp: DateTime<Utc>,
}

/// Everything the service needs, loaded once at startup and never mutated.
pub struct PredictionContext {
    pub data: HistoricalData,
    adapters: BTreeMap<ModelKind, Arc<dyn ModelAdapter>>,
    pub adapter_timeout: Duration,
}

impl PredictionContext {
    pub fn new(
        data: HistoricalData,
        adapters: Vec<Arc<dyn ModelAdapter>>,
        adapter_timeout: Duration,
    ) -> Self {
        let adapters = adapters.into_iter().map(|a| (a.kind(), a)).collect();
        Self {
            data,
            adapters,
            adapter_timeout,
        }
    }

    /// Build the production context from configuration: dataset first,
    /// then one artifact set per model family over the dataset's players.
    pub fn load(config: &Config) -> anyhow::Result<Self> {
        let data = HistoricalData::load(&config.history_file)?;
        let players = data.players();
        let adapters: Vec<Arc<dyn ModelAdapter>> = vec![
            Arc::new(SequenceModel::load(&config.artifacts_dir, &players)),
            Arc::new(SeasonalModel::load(&config.artifacts_dir, &players)),
            Arc::new(CountModel::load(&config.artifacts_dir, &players)),
        ];
        Ok(Self::new(
            data,
            adapters,
            Duration::from_millis(config.adapter_timeout_ms),
        ))
    }

    fn adapter(&self, kind: ModelKind) -> Option<&Arc<dyn ModelAdapter>> {
        self.adapters.get(&kind)
    }
}

#[derive(Clone)]
pub struct PredictionService {
    ctx: Arc<PredictionContext>,
}

impl PredictionService {
    pub fn new(ctx: Arc<PredictionContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PredictionContext {
        &self.ctx
    }

    /// Run the full pipeline for one request.
    pub async fn predict_player(
        &self,
        request: &PredictionRequest,
    ) -> Result<EnsembleResult, RequestError> {
        validate_request(request)?;
        if !self.ctx.data.has_player(&request.player_name) {
            return Err(RequestError::UnknownPlayer(request.player_name.clone()));
        }

        let features = features::resolve(&self.ctx.data, request);
        let selection = request.model_selection.as_ref();
        let requested: Vec<ModelKind> = selection
            .map(|s| {
                let mut kinds = s.models.clone();
                kinds.sort();
                kinds.dedup();
                kinds
            })
            .unwrap_or_else(|| crate::models::MODEL_KINDS.to_vec());

        let outcomes = self.invoke_adapters(&requested, &features).await;
        let combined = combine(&outcomes, selection);

        debug!(
            "Prediction for {}: {:?} (models: {:?})",
            request.player_name, combined.prediction, combined.models_used
        );

        Ok(EnsembleResult {
            player_name: request.player_name.clone(),
            prediction: combined.prediction,
            confidence: combined.confidence,
            raw_prediction: combined.raw_prediction,
            model_predictions: outcomes,
            probability_distribution: combined.probability_distribution,
            metadata: PredictionMetadata {
                opponent: features.opponent.clone(),
                opponent_normalized: features.opponent_normalized.clone(),
                is_home: features.is_home,
                date: features.date,
                requested: features.requested.clone(),
                shots_on_target: features.feature(features::FEAT_SHOTS_ON_TARGET),
                total_shots: features.feature(features::FEAT_TOTAL_SHOTS),
                minutes: features.feature(features::FEAT_MINUTES),
                synthetic_features: features.synthetic.clone(),
                models_used: combined.models_used,
                weights: combined.weights,
                error: combined.error,
            },
            timestamp: Utc::now(),
        })
    }

    /// Fan the requested adapters out concurrently, each under the
    /// configured deadline. A timed-out adapter contributes a
    /// `prediction_failed: timeout` outcome; its task is left to finish in
    /// the background and its result is discarded.
    async fn invoke_adapters(
        &self,
        requested: &[ModelKind],
        features: &ResolvedFeatures,
    ) -> BTreeMap<ModelKind, ModelOutcome> {
        let deadline = self.ctx.adapter_timeout;
        let calls = requested.iter().map(|&kind| {
            let adapter = self.ctx.adapter(kind).cloned();
            async move {
                let outcome = match adapter {
                    Some(adapter) => {
                        match tokio::time::timeout(deadline, adapter.predict(features)).await {
                            Ok(outcome) => outcome,
                            Err(_) => ModelOutcome::failed("timeout"),
                        }
                    }
                    None => ModelOutcome::unavailable(),
                };
                (kind, outcome)
            }
        });
        join_all(calls).await.into_iter().collect()
    }

    /// Startup-configuration health: per-model artifact coverage and
    /// whether the historical dataset loaded.
    pub fn status(&self) -> SystemStatus {
        let data_loaded = self.ctx.data.row_count() > 0;
        let mut models_availability = BTreeMap::new();
        let mut any_model_empty = false;
        for (kind, adapter) in &self.ctx.adapters {
            let (loaded, total) = adapter.loaded_players();
            if loaded == 0 {
                any_model_empty = true;
            }
            models_availability.insert(*kind, format!("{loaded}/{total} players"));
        }

        let status = if !data_loaded {
            StatusLevel::Error
        } else if any_model_empty || self.ctx.data.player_count() == 0 {
            StatusLevel::Warning
        } else {
            StatusLevel::Online
        };

        SystemStatus {
            status,
            data_loaded,
            players_available: self.ctx.data.player_count(),
            historical_data_rows: self.ctx.data.row_count(),
            models_availability,
            timestamp: Utc::now(),
        }
    }
}

fn validate_request(request: &PredictionRequest) -> Result<(), RequestError> {
    if request.player_name.trim().is_empty() {
        return Err(RequestError::MissingPlayerName);
    }
    if request.opponent.trim().is_empty() {
        return Err(RequestError::MissingOpponent);
    }
    if let Some(weights) = request
        .model_selection
        .as_ref()
        .and_then(|s| s.weights.as_ref())
    {
        for (kind, weight) in weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(RequestError::InvalidWeights(format!(
                    "weight for {kind} must be a non-negative number"
                )));
            }
        }
    }
    Ok(())
}

/// A player's recent history, newest first, as served by the
/// history endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerHistory {
    pub player_name: String,
    pub matches: Vec<MatchRecord>,
    pub total_matches: usize,
}

impl PredictionService {
    pub fn player_history(&self, player: &str, limit: usize) -> Option<PlayerHistory> {
        if !self.ctx.data.has_player(player) {
            return None;
        }
        let history = self.ctx.data.player_history(player);
        let total_matches = history.len();
        let matches = history.into_iter().rev().take(limit).cloned().collect();
        Some(PlayerHistory {
            player_name: player.to_string(),
            matches,
            total_matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record;
    use crate::models::artifacts::ArtifactSet;
    use crate::models::count::CountArtifact;
    use crate::models::ERR_MODEL_UNAVAILABLE;
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Instant;

    fn request(player: &str) -> PredictionRequest {
        PredictionRequest {
            player_name: player.to_string(),
            opponent: "Junior".to_string(),
            is_home: true,
            date: None,
            shots_on_target: Some(3.0),
            total_shots: Some(5.0),
            minutes: Some(90.0),
            model_selection: None,
        }
    }

    fn sample_data() -> HistoricalData {
        HistoricalData::from_records(vec![
            record("Carlos_Bacca", "2025-01-05", "Junior", 1, true),
            record("Carlos_Bacca", "2025-01-12", "Pereira", 0, false),
            record("Carlos_Bacca", "2025-01-19", "Tolima", 2, true),
        ])
    }

    fn count_adapter(player: &str) -> Arc<dyn ModelAdapter> {
        let mut states = HashMap::new();
        states.insert(
            player.to_string(),
            Ok(CountArtifact {
                intercept: 0.2,
                features: vec![],
                coefs: vec![],
            }),
        );
        Arc::new(CountModel::new(ArtifactSet::from_states(states)))
    }

    /// Adapter that never finishes inside any reasonable deadline.
    struct StalledModel(ModelKind);

    #[async_trait]
    impl ModelAdapter for StalledModel {
        fn kind(&self) -> ModelKind {
            self.0
        }
        fn is_available(&self, _player: &str) -> bool {
            true
        }
        fn loaded_players(&self) -> (usize, usize) {
            (1, 1)
        }
        async fn predict(&self, _features: &ResolvedFeatures) -> ModelOutcome {
            tokio::time::sleep(Duration::from_secs(30)).await;
            ModelOutcome::success(1.0, 1.0, None)
        }
    }

    fn service(adapters: Vec<Arc<dyn ModelAdapter>>, timeout_ms: u64) -> PredictionService {
        PredictionService::new(Arc::new(PredictionContext::new(
            sample_data(),
            adapters,
            Duration::from_millis(timeout_ms),
        )))
    }

    #[tokio::test]
    async fn missing_required_fields_are_rejected() {
        let svc = service(vec![count_adapter("Carlos_Bacca")], 1000);
        let mut req = request("Carlos_Bacca");
        req.player_name = "  ".to_string();
        assert_eq!(
            svc.predict_player(&req).await.unwrap_err(),
            RequestError::MissingPlayerName
        );

        let mut req = request("Carlos_Bacca");
        req.opponent = String::new();
        assert_eq!(
            svc.predict_player(&req).await.unwrap_err(),
            RequestError::MissingOpponent
        );
    }

    #[tokio::test]
    async fn unknown_player_is_rejected_before_resolution() {
        let svc = service(vec![count_adapter("Carlos_Bacca")], 1000);
        let err = svc.predict_player(&request("Nobody")).await.unwrap_err();
        assert_eq!(err, RequestError::UnknownPlayer("Nobody".to_string()));
    }

    #[tokio::test]
    async fn negative_weights_are_rejected() {
        let svc = service(vec![count_adapter("Carlos_Bacca")], 1000);
        let mut req = request("Carlos_Bacca");
        req.model_selection = Some(ModelSelection {
            models: vec![ModelKind::Count],
            weights: Some([(ModelKind::Count, -1.0)].into_iter().collect()),
        });
        assert!(matches!(
            svc.predict_player(&req).await.unwrap_err(),
            RequestError::InvalidWeights(_)
        ));
    }

    #[tokio::test]
    async fn single_model_result_is_well_formed() {
        let svc = service(vec![count_adapter("Carlos_Bacca")], 1000);
        let result = svc.predict_player(&request("Carlos_Bacca")).await.unwrap();

        // Only the count adapter exists; the other two report unavailable.
        assert_eq!(result.model_predictions.len(), 3);
        assert_eq!(
            result.model_predictions[&ModelKind::Sequence].error.as_deref(),
            Some(ERR_MODEL_UNAVAILABLE)
        );
        let count = &result.model_predictions[&ModelKind::Count];
        assert!(count.available);
        assert_eq!(result.prediction, count.prediction);
        assert_relative_eq!(
            result.confidence.unwrap(),
            count.confidence.unwrap(),
            epsilon = 1e-12
        );
        assert_eq!(result.metadata.models_used, vec![ModelKind::Count]);
        assert_relative_eq!(
            result.metadata.weights.values().sum::<f64>(),
            1.0,
            epsilon = 1e-6
        );
        let dist = result.probability_distribution.expect("distribution");
        assert_relative_eq!(dist.sum(), 1.0, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn no_models_available_is_a_valid_response() {
        let svc = service(vec![], 1000);
        let result = svc.predict_player(&request("Carlos_Bacca")).await.unwrap();
        assert_eq!(result.prediction, None);
        assert_eq!(result.confidence, None);
        assert_eq!(result.metadata.error.as_deref(), Some(ERR_NO_MODELS));
        assert!(result.probability_distribution.is_none());
    }

    #[tokio::test]
    async fn stalled_adapter_times_out_without_delaying_the_rest() {
        let svc = service(
            vec![Arc::new(StalledModel(ModelKind::Sequence)), count_adapter("Carlos_Bacca")],
            100,
        );
        let started = Instant::now();
        let result = svc.predict_player(&request("Carlos_Bacca")).await.unwrap();
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "fan-out must not wait for the stalled adapter"
        );

        assert_eq!(
            result.model_predictions[&ModelKind::Sequence].error.as_deref(),
            Some("prediction_failed: timeout")
        );
        // The healthy adapter still contributed.
        assert!(result.model_predictions[&ModelKind::Count].available);
        assert!(result.prediction.is_some());
    }

    #[tokio::test]
    async fn metadata_echoes_resolved_values() {
        let svc = service(vec![count_adapter("Carlos_Bacca")], 1000);
        let mut req = request("Carlos_Bacca");
        req.opponent = "ATLETICO JUNIOR".to_string();
        req.shots_on_target = None;
        let result = svc.predict_player(&req).await.unwrap();

        assert_eq!(result.metadata.opponent, "ATLETICO JUNIOR");
        assert_eq!(result.metadata.opponent_normalized, "Junior");
        assert_eq!(result.metadata.requested.shots_on_target, None);
        // Resolved from the sample history (2.0 per match).
        assert_relative_eq!(result.metadata.shots_on_target, 2.0, epsilon = 1e-9);
        assert_relative_eq!(result.metadata.minutes, 90.0, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn status_reports_coverage_and_level() {
        let svc = service(vec![count_adapter("Carlos_Bacca")], 1000);
        let status = svc.status();
        assert!(status.data_loaded);
        assert_eq!(status.players_available, 1);
        assert_eq!(status.historical_data_rows, 3);
        assert_eq!(
            status.models_availability[&ModelKind::Count],
            "1/1 players"
        );
        assert_eq!(status.status, StatusLevel::Online);

        // Empty dataset downgrades to error.
        let empty = PredictionService::new(Arc::new(PredictionContext::new(
            HistoricalData::from_records(vec![]),
            vec![],
            Duration::from_millis(100),
        )));
        assert_eq!(empty.status().status, StatusLevel::Error);
    }

    #[tokio::test]
    async fn player_history_is_newest_first_and_limited() {
        let svc = service(vec![count_adapter("Carlos_Bacca")], 1000);
        let history = svc.player_history("Carlos_Bacca", 2).unwrap();
        assert_eq!(history.total_matches, 3);
        assert_eq!(history.matches.len(), 2);
        assert!(history.matches[0].date > history.matches[1].date);
        assert!(svc.player_history("Nobody", 2).is_none());
    }
}
