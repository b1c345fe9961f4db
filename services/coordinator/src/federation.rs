//! Wiring between the participant registry, the durable store and the
//! round coordinator.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use medfed_core::{
    AggregationMethod, InMemoryRegistry, ParticipantRegistry, RoundCoordinator, RoundId,
};
use tracing::info;

use crate::settings::Settings;
use crate::storage::JsonModelStore;

pub struct FederationModule {
    coordinator: Arc<RoundCoordinator>,
    registry: Arc<InMemoryRegistry>,
    settings: Settings,
}

impl FederationModule {
    pub fn new(settings: &Settings) -> Result<Self> {
        let registry = Arc::new(InMemoryRegistry::new());
        for name in &settings.seed_participants {
            registry.register(name, Utc::now());
        }
        let store = Arc::new(JsonModelStore::open(&settings.data_dir)?);
        let coordinator = Arc::new(RoundCoordinator::new(
            registry.clone(),
            store,
            AggregationMethod::FedAvg,
            settings.model_shape.clone(),
        )?);
        info!("federation_module_initialized");
        Ok(Self {
            coordinator,
            registry,
            settings: settings.clone(),
        })
    }

    pub fn coordinator(&self) -> &Arc<RoundCoordinator> {
        &self.coordinator
    }

    pub fn participant_count(&self) -> usize {
        self.registry
            .list_active_participants()
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn start_first_round(&self) -> Result<RoundId> {
        let round = self
            .coordinator
            .start_round(self.settings.completion_policy(), Utc::now())?;
        Ok(round)
    }

    /// One scheduler tick. Aggregation can be heavy for wide models, so
    /// it runs on the blocking pool instead of the async executor.
    pub async fn tick(&self) -> Result<bool> {
        let coordinator = self.coordinator.clone();
        let now = Utc::now();
        let resolved = tokio::task::spawn_blocking(move || coordinator.try_close_round(now))
            .await??;
        Ok(resolved)
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("federation_module_shutdown");
        Ok(())
    }
}
