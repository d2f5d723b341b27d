//! Per-player model artifact loading.
//!
//! Artifacts are JSON files named `{kind}_{player}.json` in the artifacts
//! directory. Loading happens once at startup; a missing or malformed file
//! is recorded as a per-player load error and surfaced through adapter
//! availability and `status()`, never as a startup failure. The service
//! stays up and serves reduced-capability ensembles.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Per-player load state: the parsed artifact, or why it is unusable.
pub type LoadState<T> = Result<T, String>;

#[derive(Debug)]
pub struct ArtifactSet<T> {
    states: HashMap<String, LoadState<T>>,
}

impl<T: DeserializeOwned> ArtifactSet<T> {
    /// Load one artifact per player from `dir`, validating each parsed
    /// artifact with `validate` before accepting it.
    pub fn load<F>(dir: &Path, prefix: &str, players: &[String], validate: F) -> Self
    where
        F: Fn(&T) -> Result<(), String>,
    {
        let mut states = HashMap::with_capacity(players.len());
        for player in players {
            let path = dir.join(format!("{prefix}_{player}.json"));
            let state = load_one(&path, &validate);
            match &state {
                Ok(_) => debug!("Loaded {} artifact for {}", prefix, player),
                Err(e) => warn!("{} artifact unusable for {}: {}", prefix, player, e),
            }
            states.insert(player.clone(), state);
        }
        Self { states }
    }

    pub fn from_states(states: HashMap<String, LoadState<T>>) -> Self {
        Self { states }
    }

    pub fn artifact(&self, player: &str) -> Option<&T> {
        self.states.get(player).and_then(|s| s.as_ref().ok())
    }

    pub fn is_loaded(&self, player: &str) -> bool {
        self.artifact(player).is_some()
    }

    pub fn loaded_count(&self) -> usize {
        self.states.values().filter(|s| s.is_ok()).count()
    }

    /// Catalog size: players we attempted to load an artifact for.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

fn load_one<T, F>(path: &Path, validate: &F) -> LoadState<T>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Result<(), String>,
{
    if !path.exists() {
        return Err(format!("artifact not found: {}", path.display()));
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let artifact: T = serde_json::from_str(&contents)
        .map_err(|e| format!("failed to parse {}: {}", path.display(), e))?;
    validate(&artifact)?;
    Ok(artifact)
}
