use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

pub mod names;
pub use names::normalize_team_name;

use crate::models::{ModelKind, MODEL_KINDS};
use crate::validation::{ActualResult, PredictionRecord};

/// One historical match for one player, as ingested from the dataset.
/// Opponent names are canonicalized at load time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub player: String,
    pub date: NaiveDate,
    /// Round index within the tournament, used as the validation join key.
    pub date_index: Option<u32>,
    pub opponent: String,
    pub goals: u32,
    pub shots_on_target: Option<f64>,
    pub total_shots: Option<f64>,
    pub minutes: Option<f64>,
    pub is_home: bool,
}

/// CSV row shape for the historical dataset. `is_home` is stored as 0/1.
#[derive(Debug, Deserialize)]
struct HistoryRow {
    player: String,
    date: NaiveDate,
    #[serde(default)]
    date_index: Option<u32>,
    opponent: String,
    goals: u32,
    #[serde(default)]
    shots_on_target: Option<f64>,
    #[serde(default)]
    total_shots: Option<f64>,
    #[serde(default)]
    minutes: Option<f64>,
    is_home: u8,
}

impl From<HistoryRow> for MatchRecord {
    fn from(row: HistoryRow) -> Self {
        MatchRecord {
            opponent: normalize_team_name(&row.opponent),
            player: row.player,
            date: row.date,
            date_index: row.date_index,
            goals: row.goals,
            shots_on_target: row.shots_on_target,
            total_shots: row.total_shots,
            minutes: row.minutes,
            is_home: row.is_home != 0,
        }
    }
}

/// The preloaded historical dataset. Built once at startup and only read
/// afterwards; a reload means rebuilding the whole context.
#[derive(Debug, Default)]
pub struct HistoricalData {
    records: Vec<MatchRecord>,
    /// Per-player record indices, sorted chronologically.
    by_player: HashMap<String, Vec<usize>>,
}

impl HistoricalData {
    /// Load the dataset from a CSV file. Rows that fail to parse are
    /// skipped with a warning rather than aborting the load.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("opening historical dataset {}", path.display()))?;

        let mut records = Vec::new();
        for (line, row) in reader.deserialize::<HistoryRow>().enumerate() {
            match row {
                Ok(row) => records.push(MatchRecord::from(row)),
                Err(e) => warn!("Skipping malformed history row {}: {}", line + 2, e),
            }
        }

        let data = Self::from_records(records);
        info!(
            "Historical dataset loaded: {} rows, {} players",
            data.row_count(),
            data.player_count()
        );
        Ok(data)
    }

    /// Build the dataset from already-materialized records.
    pub fn from_records(records: Vec<MatchRecord>) -> Self {
        let mut by_player: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            by_player.entry(record.player.clone()).or_default().push(idx);
        }
        for indices in by_player.values_mut() {
            indices.sort_by_key(|&i| (records[i].date, records[i].date_index));
        }
        Self { records, by_player }
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn player_count(&self) -> usize {
        self.by_player.len()
    }

    pub fn has_player(&self, player: &str) -> bool {
        self.by_player.contains_key(player)
    }

    /// All players present in the dataset, sorted for stable output.
    pub fn players(&self) -> Vec<String> {
        let mut players: Vec<String> = self.by_player.keys().cloned().collect();
        players.sort();
        players
    }

    /// All distinct (canonical) opponents, sorted.
    pub fn teams(&self) -> Vec<String> {
        let teams: BTreeSet<&str> = self.records.iter().map(|r| r.opponent.as_str()).collect();
        teams.into_iter().map(str::to_string).collect()
    }

    /// A player's matches in chronological order. Empty for unknown players.
    pub fn player_history(&self, player: &str) -> Vec<&MatchRecord> {
        self.by_player
            .get(player)
            .map(|indices| indices.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }
}

/// Stored predictions plus actual results, as served to the comparator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationRecords {
    pub predictions: Vec<PredictionRecord>,
    pub actual_results: Vec<ActualResult>,
}

#[derive(Debug, Deserialize)]
struct PredictionRow {
    player: String,
    date_index: u32,
    predicted_goals: i64,
    predicted_decimal: f64,
}

#[derive(Debug, Deserialize)]
struct ActualRow {
    player: String,
    date_index: u32,
    goals: i64,
    #[serde(default)]
    total_shots: Option<f64>,
    #[serde(default)]
    shots_on_target: Option<f64>,
}

/// Load stored prediction CSVs (one per model, `predictions_<model>.csv`)
/// and the actual-results CSV from the validation directory. Missing files
/// degrade to empty sets: validation is an offline feature and must not
/// keep the service from starting.
pub fn load_validation_records(dir: &Path) -> ValidationRecords {
    let mut records = ValidationRecords::default();

    for kind in MODEL_KINDS {
        let path = dir.join(format!("predictions_{}.csv", kind.as_str()));
        if !path.exists() {
            warn!("Prediction file not found, skipping: {}", path.display());
            continue;
        }
        match load_prediction_file(&path, kind) {
            Ok(mut rows) => records.predictions.append(&mut rows),
            Err(e) => warn!("Failed to load {}: {}", path.display(), e),
        }
    }

    let actuals_path = dir.join("actual_results.csv");
    if actuals_path.exists() {
        match load_actuals_file(&actuals_path) {
            Ok(rows) => records.actual_results = rows,
            Err(e) => warn!("Failed to load {}: {}", actuals_path.display(), e),
        }
    } else {
        warn!("Actual-results file not found: {}", actuals_path.display());
    }

    info!(
        "Validation records loaded: {} predictions, {} actual results",
        records.predictions.len(),
        records.actual_results.len()
    );
    records
}

fn load_prediction_file(path: &Path, model: ModelKind) -> Result<Vec<PredictionRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for row in reader.deserialize::<PredictionRow>() {
        let row = row?;
        out.push(PredictionRecord {
            player: row.player,
            date_index: row.date_index,
            model,
            predicted_goals: row.predicted_goals,
            predicted_decimal: row.predicted_decimal,
        });
    }
    Ok(out)
}

fn load_actuals_file(path: &Path) -> Result<Vec<ActualResult>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for row in reader.deserialize::<ActualRow>() {
        let row = row?;
        out.push(ActualResult {
            player: row.player,
            date_index: row.date_index,
            goals: row.goals,
            total_shots: row.total_shots,
            shots_on_target: row.shots_on_target,
        });
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) fn record(
    player: &str,
    date: &str,
    opponent: &str,
    goals: u32,
    is_home: bool,
) -> MatchRecord {
    MatchRecord {
        player: player.to_string(),
        date: date.parse().unwrap(),
        date_index: None,
        opponent: normalize_team_name(opponent),
        goals,
        shots_on_target: Some(2.0),
        total_shots: Some(4.0),
        minutes: Some(90.0),
        is_home,
    }
}
