//! JSON API over the prediction service. Thin glue: deserialization, the
//! error-to-status mapping, and nothing else.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::data::ValidationRecords;
use crate::engine::{PredictionRequest, PredictionService, RequestError};
use crate::validation;

#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
    pub validation: Arc<ValidationRecords>,
}

/// Build the Axum router for the service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/predict/player", post(predict_player_handler))
        .route("/api/status", get(status_handler))
        .route("/api/players", get(players_handler))
        .route("/api/teams", get(teams_handler))
        .route("/api/player/:name/history", get(history_handler))
        .route("/api/validation-data", get(validation_data_handler))
        .route("/api/validation-summary", get(validation_summary_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// POST /api/predict/player
///
/// Always returns a well-formed result object on 200, including the
/// `no_models_available` terminal outcome; only malformed input and
/// unknown players map to error statuses.
async fn predict_player_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .service
        .predict_player(&request)
        .await
        .map(Json)
        .map_err(|e| {
            let status = match e {
                RequestError::UnknownPlayer(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (status, e.to_string())
        })
}

/// GET /api/status
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.status())
}

/// GET /api/players
async fn players_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.context().data.players())
}

/// GET /api/teams
async fn teams_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.context().data.teams())
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

/// GET /api/player/{name}/history?limit=10
async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(10);
    state
        .service
        .player_history(&name, limit)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown player: {name}")))
}

/// GET /api/validation-data: the raw records, for callers that run their
/// own comparison.
async fn validation_data_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.validation.as_ref().clone())
}

/// GET /api/validation-summary: comparator output over the loaded
/// records.
async fn validation_summary_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let comparisons =
        validation::compare(&state.validation.predictions, &state.validation.actual_results);
    Json(validation::summarize(&comparisons))
}
