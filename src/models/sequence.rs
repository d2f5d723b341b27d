//! Sequence model adapter.
//!
//! Wraps a trained sequence head exported as a linear readout over a
//! robust-scaled window of recent matches: the artifact carries the window
//! length, the per-match feature list, robust center/scale parameters and
//! the flattened readout weights. Confidence derives from the width of the
//! 95% prediction interval implied by the artifact's residual std.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use super::artifacts::ArtifactSet;
use super::{ModelAdapter, ModelKind, ModelOutcome};
use crate::engine::features::{match_feature, ResolvedFeatures};

const ARTIFACT_PREFIX: &str = "sequence";

#[derive(Debug, Clone, Deserialize)]
pub struct SequenceArtifact {
    /// Number of most-recent matches fed to the readout.
    pub window: usize,
    /// Per-match feature names, in column order.
    pub features: Vec<String>,
    /// Robust scaler parameters, one per feature column.
    pub center: Vec<f64>,
    pub scale: Vec<f64>,
    /// Flattened readout weights, row-major over (window × features).
    pub weights: Vec<f64>,
    pub bias: f64,
    /// Residual standard deviation from training.
    pub residual_std: f64,
}

fn validate(artifact: &SequenceArtifact) -> Result<(), String> {
    if artifact.window == 0 {
        return Err("window must be at least 1".to_string());
    }
    if artifact.features.is_empty() {
        return Err("feature list is empty".to_string());
    }
    let n = artifact.features.len();
    if artifact.center.len() != n || artifact.scale.len() != n {
        return Err(format!(
            "scaler arity mismatch: {} features, {} center, {} scale",
            n,
            artifact.center.len(),
            artifact.scale.len()
        ));
    }
    if artifact.weights.len() != artifact.window * n {
        return Err(format!(
            "weight arity mismatch: expected {} got {}",
            artifact.window * n,
            artifact.weights.len()
        ));
    }
    if !(artifact.residual_std >= 0.0) {
        return Err("residual_std must be non-negative".to_string());
    }
    Ok(())
}

pub struct SequenceModel {
    artifacts: Arc<ArtifactSet<SequenceArtifact>>,
}

impl SequenceModel {
    pub fn load(dir: &Path, players: &[String]) -> Self {
        Self::new(ArtifactSet::load(dir, ARTIFACT_PREFIX, players, validate))
    }

    pub fn new(artifacts: ArtifactSet<SequenceArtifact>) -> Self {
        Self {
            artifacts: Arc::new(artifacts),
        }
    }
}

#[async_trait]
impl ModelAdapter for SequenceModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Sequence
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

fn evaluate(artifacts: &ArtifactSet<SequenceArtifact>, features: &ResolvedFeatures) -> ModelOutcome {
    let Some(artifact) = artifacts.artifact(&features.player) else {
        return ModelOutcome::unavailable();
    };

    if features.history.len() < artifact.window {
        return ModelOutcome::failed(format_args!(
            "insufficient history (have {}, need {})",
            features.history.len(),
            artifact.window
        ));
    }

    let window = &features.history[features.history.len() - artifact.window..];
    let mut raw = artifact.bias;
    for (step, record) in window.iter().enumerate() {
        for (col, name) in artifact.features.iter().enumerate() {
            let value = match_feature(record, name);
            let scaled = if artifact.scale[col].abs() > f64::EPSILON {
                (value - artifact.center[col]) / artifact.scale[col]
            } else {
                value - artifact.center[col]
            };
            raw += artifact.weights[step * artifact.features.len() + col] * scaled;
        }
    }

    if !raw.is_finite() {
        return ModelOutcome::failed("non-finite readout");
    }

    // 95% interval half-width maps onto [0,1]: a tight interval means a
    // confident point prediction.
    let half_width = 1.96 * artifact.residual_std;
    let confidence = 1.0 / (1.0 + half_width);

    ModelOutcome::success(raw, confidence, None)
}
