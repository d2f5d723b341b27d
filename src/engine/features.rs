//! Feature resolution: turns a request plus the player's history into the
//! concrete named feature vector the adapters consume. Total by contract:
//! absent overrides fall back to historical per-match averages, and a
//! player with no history at all gets flagged synthetic defaults.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::data::{normalize_team_name, HistoricalData, MatchRecord};
use crate::engine::PredictionRequest;

pub const FEAT_SHOTS_ON_TARGET: &str = "shots_on_target";
pub const FEAT_TOTAL_SHOTS: &str = "total_shots";
pub const FEAT_MINUTES: &str = "minutes";
pub const FEAT_HOME: &str = "home";
pub const FEAT_AWAY: &str = "away";
pub const FEAT_WEEKEND: &str = "weekend";
pub const FEAT_AVG_VS_OPPONENT: &str = "avg_vs_opponent";
pub const FEAT_RECENT_TREND: &str = "recent_trend";
pub const FEAT_GOALS_AVG_3: &str = "goals_avg_3";
pub const FEAT_GOALS_AVG_5: &str = "goals_avg_5";
pub const FEAT_GOALS_LAST_3: &str = "goals_last_3";
pub const FEAT_SCORED_LAST_MATCH: &str = "scored_last_match";

/// Minutes assumed for a player with no recorded history.
const DEFAULT_MINUTES: f64 = 90.0;

/// The optional per-match values exactly as the caller supplied them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureOverrides {
    pub shots_on_target: Option<f64>,
    pub total_shots: Option<f64>,
    pub minutes: Option<f64>,
}

/// The resolved input vector for one request: raw requested values, the
/// values actually fed to the models, and the history window the sequence
/// model reads. Owned per request; nothing here aliases shared state.
#[derive(Debug, Clone)]
pub struct ResolvedFeatures {
    pub player: String,
    pub opponent: String,
    pub opponent_normalized: String,
    pub is_home: bool,
    pub date: Option<NaiveDate>,
    pub requested: FeatureOverrides,
    pub values: BTreeMap<String, f64>,
    /// Names of features substituted with defaults because the player has
    /// no history to average over.
    pub synthetic: Vec<String>,
    /// Chronological match history for the player.
    pub history: Vec<MatchRecord>,
}

impl ResolvedFeatures {
    /// Named feature lookup; unknown names resolve to 0.0 so an artifact
    /// referencing a feature this resolver does not produce degrades
    /// instead of failing.
    pub fn feature(&self, name: &str) -> f64 {
        self.values.get(name).copied().unwrap_or(0.0)
    }
}

/// Resolve the full feature vector for a request. Never fails.
pub fn resolve(data: &HistoricalData, request: &PredictionRequest) -> ResolvedFeatures {
    let history: Vec<MatchRecord> = data
        .player_history(&request.player_name)
        .into_iter()
        .cloned()
        .collect();
    let opponent_normalized = normalize_team_name(&request.opponent);

    let mut values = BTreeMap::new();
    let mut synthetic = Vec::new();

    values.insert(FEAT_HOME.to_string(), if request.is_home { 1.0 } else { 0.0 });
    values.insert(FEAT_AWAY.to_string(), if request.is_home { 0.0 } else { 1.0 });
    values.insert(
        FEAT_WEEKEND.to_string(),
        request.date.map_or(0.0, |d| if is_weekend(d) { 1.0 } else { 0.0 }),
    );

    resolve_override(
        &mut values,
        &mut synthetic,
        FEAT_SHOTS_ON_TARGET,
        request.shots_on_target,
        historical_mean(&history, |r| r.shots_on_target),
        0.0,
    );
    resolve_override(
        &mut values,
        &mut synthetic,
        FEAT_TOTAL_SHOTS,
        request.total_shots,
        historical_mean(&history, |r| r.total_shots),
        0.0,
    );
    resolve_override(
        &mut values,
        &mut synthetic,
        FEAT_MINUTES,
        request.minutes,
        historical_mean(&history, |r| r.minutes),
        DEFAULT_MINUTES,
    );

    let goals: Vec<f64> = history.iter().map(|r| r.goals as f64).collect();
    values.insert(
        FEAT_AVG_VS_OPPONENT.to_string(),
        avg_vs_opponent(&history, &opponent_normalized),
    );
    values.insert(FEAT_RECENT_TREND.to_string(), recent_trend(&goals));
    values.insert(FEAT_GOALS_AVG_3.to_string(), tail_mean(&goals, 3));
    values.insert(FEAT_GOALS_AVG_5.to_string(), tail_mean(&goals, 5));
    values.insert(
        FEAT_GOALS_LAST_3.to_string(),
        goals.iter().rev().take(3).sum(),
    );
    values.insert(
        FEAT_SCORED_LAST_MATCH.to_string(),
        goals.last().copied().unwrap_or(0.0),
    );

    ResolvedFeatures {
        player: request.player_name.clone(),
        opponent: request.opponent.clone(),
        opponent_normalized,
        is_home: request.is_home,
        date: request.date,
        requested: FeatureOverrides {
            shots_on_target: request.shots_on_target,
            total_shots: request.total_shots,
            minutes: request.minutes,
        },
        values,
        synthetic,
        history,
    }
}

/// Per-match feature extraction used by the sequence model's window rows.
pub fn match_feature(record: &MatchRecord, name: &str) -> f64 {
    match name {
        "goals" => record.goals as f64,
        FEAT_SHOTS_ON_TARGET => record.shots_on_target.unwrap_or(0.0),
        FEAT_TOTAL_SHOTS => record.total_shots.unwrap_or(0.0),
        FEAT_MINUTES => record.minutes.unwrap_or(DEFAULT_MINUTES),
        FEAT_HOME => {
            if record.is_home {
                1.0
            } else {
                0.0
            }
        }
        FEAT_AWAY => {
            if record.is_home {
                0.0
            } else {
                1.0
            }
        }
        FEAT_WEEKEND => {
            if is_weekend(record.date) {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn resolve_override(
    values: &mut BTreeMap<String, f64>,
    synthetic: &mut Vec<String>,
    name: &str,
    requested: Option<f64>,
    historical: Option<f64>,
    fallback: f64,
) {
    let value = match (requested, historical) {
        (Some(v), _) => v,
        (None, Some(avg)) => avg,
        (None, None) => {
            synthetic.push(name.to_string());
            fallback
        }
    };
    values.insert(name.to_string(), value);
}

fn historical_mean<F>(history: &[MatchRecord], select: F) -> Option<f64>
where
    F: Fn(&MatchRecord) -> Option<f64>,
{
    let values: Vec<f64> = history.iter().filter_map(&select).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Mean goals against this opponent; players without that matchup fall
/// back to their recent mean, then to zero.
fn avg_vs_opponent(history: &[MatchRecord], opponent: &str) -> f64 {
    let vs: Vec<f64> = history
        .iter()
        .filter(|r| r.opponent == opponent)
        .map(|r| r.goals as f64)
        .collect();
    if !vs.is_empty() {
        return vs.iter().sum::<f64>() / vs.len() as f64;
    }
    let goals: Vec<f64> = history.iter().map(|r| r.goals as f64).collect();
    tail_mean(&goals, 5)
}

/// Ratio of last-5 scoring to the overall average; 1.0 when there is not
/// enough history to tell.
fn recent_trend(goals: &[f64]) -> f64 {
    if goals.len() < 5 {
        return 1.0;
    }
    let overall = goals.iter().sum::<f64>() / goals.len() as f64;
    if overall <= 0.0 {
        return 1.0;
    }
    tail_mean(goals, 5) / overall
}

fn tail_mean(values: &[f64], n: usize) -> f64 {
    let tail: Vec<f64> = values.iter().rev().take(n).copied().collect();
    if tail.is_empty() {
        0.0
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Fri | Weekday::Sat | Weekday::Sun)
}
