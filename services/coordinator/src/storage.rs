//! Durable JSON persistence for published models and round archives.
//!
//! The data is append-only; each append rewrites the whole file so the
//! on-disk state stays a single valid JSON document that survives
//! process restarts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use medfed_core::{AggregatedModel, FederationError, ModelStore, RoundArchive};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

const MODELS_FILE: &str = "models.json";
const ROUNDS_FILE: &str = "rounds.json";

pub struct JsonModelStore {
    dir: PathBuf,
    models: Mutex<Vec<AggregatedModel>>,
    rounds: Mutex<Vec<RoundArchive>>,
}

impl JsonModelStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, FederationError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| FederationError::StoreUnavailable(e.to_string()))?;
        let models = load_json(&dir.join(MODELS_FILE))?;
        let rounds = load_json(&dir.join(ROUNDS_FILE))?;
        Ok(Self {
            dir,
            models: Mutex::new(models),
            rounds: Mutex::new(rounds),
        })
    }

    pub fn model_count(&self) -> usize {
        self.models.lock().len()
    }

    pub fn latest_model(&self) -> Option<AggregatedModel> {
        self.models.lock().last().cloned()
    }

    fn persist<T: Serialize>(&self, name: &str, items: &[T]) -> Result<(), FederationError> {
        let json = serde_json::to_string_pretty(items)
            .map_err(|e| FederationError::StoreUnavailable(e.to_string()))?;
        fs::write(self.dir.join(name), json)
            .map_err(|e| FederationError::StoreUnavailable(e.to_string()))
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FederationError> {
    match fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data).map_err(|e| {
            FederationError::StoreUnavailable(format!("corrupt {}: {e}", path.display()))
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(FederationError::StoreUnavailable(e.to_string())),
    }
}

impl ModelStore for JsonModelStore {
    fn append_model(&self, model: &AggregatedModel) -> Result<(), FederationError> {
        let mut models = self.models.lock();
        models.push(model.clone());
        self.persist(MODELS_FILE, &models)
    }

    fn archive_round(&self, archive: &RoundArchive) -> Result<(), FederationError> {
        let mut rounds = self.rounds.lock();
        rounds.push(archive.clone());
        self.persist(ROUNDS_FILE, &rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use medfed_core::RoundOutcome;

    fn model(round: u64) -> AggregatedModel {
        AggregatedModel {
            round,
            coefficients: vec![vec![vec![1.0 / 3.0, 0.25]]],
            intercept: vec![-0.125],
            total_samples: 100,
            contributor_count: 3,
            aggregated_at: Utc::now(),
        }
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = JsonModelStore::open(dir.path()).unwrap();
            store.append_model(&model(1)).unwrap();
            store.append_model(&model(2)).unwrap();
            store
                .archive_round(&RoundArchive {
                    round: 1,
                    contributions: vec![],
                    outcome: RoundOutcome::Failed {
                        reason: "empty".into(),
                    },
                    closed_at: Utc::now(),
                })
                .unwrap();
        }

        let reopened = JsonModelStore::open(dir.path()).unwrap();
        assert_eq!(reopened.model_count(), 2);
        let latest = reopened.latest_model().unwrap();
        assert_eq!(latest.round, 2);
        // Full double precision survives the JSON round trip.
        assert_eq!(latest.coefficients[0][0][0], 1.0 / 3.0);
    }
}
