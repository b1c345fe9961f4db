//! Coordinator service: opens aggregation rounds, resolves them on a
//! scheduler tick and publishes the global model history. Contribution
//! submission arrives through the in-process coordinator API; the HTTP
//! surface in front of it is a separate concern.

mod federation;
mod settings;
mod storage;

use anyhow::Result;
use medfed_core::CoordinatorPhase;
use tracing::{error, info, warn};

use crate::federation::FederationModule;
use crate::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let settings = Settings::load()?;
    info!(target: "coordinator-service", "Starting coordinator service");

    let module = FederationModule::new(&settings)?;
    if module.participant_count() == 0 {
        warn!("no participants registered; the first round waits for the registry to fill");
    }
    let round = module.start_first_round()?;
    info!(round, "first_round_started");

    let mut tick =
        tokio::time::interval(std::time::Duration::from_secs(settings.tick_interval_secs));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                match module.tick().await {
                    Ok(true) => {
                        if let Some(model) = module.coordinator().get_latest_model() {
                            info!(
                                round = model.round,
                                contributors = model.contributor_count,
                                total_samples = model.total_samples,
                                "global_model_published"
                            );
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(error = %e, "round_resolution_failed");
                        if module.coordinator().phase() == CoordinatorPhase::Halted {
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown_signal_received");
                break;
            }
        }
    }
    module.shutdown().await
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
