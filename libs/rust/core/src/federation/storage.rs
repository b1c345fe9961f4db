//! Persistence seam: append-only model history and round archives.
//!
//! The core defines what must survive a restart (published models and
//! resolved rounds); the storage mechanism belongs to the collaborator
//! behind this trait.

use parking_lot::RwLock;

use super::error::FederationError;
use super::model::AggregatedModel;
use super::round::RoundArchive;

pub trait ModelStore: Send + Sync {
    fn append_model(&self, model: &AggregatedModel) -> Result<(), FederationError>;
    fn archive_round(&self, archive: &RoundArchive) -> Result<(), FederationError>;
}

#[derive(Default)]
pub struct InMemoryStore {
    models: RwLock<Vec<AggregatedModel>>,
    rounds: RwLock<Vec<RoundArchive>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn models(&self) -> Vec<AggregatedModel> {
        self.models.read().clone()
    }

    pub fn rounds(&self) -> Vec<RoundArchive> {
        self.rounds.read().clone()
    }
}

impl ModelStore for InMemoryStore {
    fn append_model(&self, model: &AggregatedModel) -> Result<(), FederationError> {
        self.models.write().push(model.clone());
        Ok(())
    }

    fn archive_round(&self, archive: &RoundArchive) -> Result<(), FederationError> {
        self.rounds.write().push(archive.clone());
        Ok(())
    }
}
