//! Runtime settings: file-based with environment overrides.

use chrono::Duration;
use config::{Config, Environment, File};
use medfed_core::{CompletionPolicy, LayerShape, ModelShape};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    WaitForAll,
    QuorumOrTimeout,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tick_interval_secs: u64,
    pub policy: PolicyKind,
    pub quorum: f64,
    pub round_timeout_secs: i64,
    pub data_dir: String,
    pub model_shape: ModelShape,
    /// Stand-in for the external hospital registry until the HTTP
    /// surface lands: participants seeded at boot.
    pub seed_participants: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            policy: PolicyKind::QuorumOrTimeout,
            quorum: 0.5,
            round_timeout_secs: 300,
            data_dir: "data".into(),
            // One logistic layer over eight clinical features.
            model_shape: ModelShape {
                layers: vec![LayerShape { rows: 1, cols: 8 }],
                intercept_len: 1,
            },
            seed_participants: Vec::new(),
        }
    }
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let cfg = Config::builder()
            .add_source(File::with_name("config/coordinator").required(false))
            .add_source(Environment::with_prefix("MEDFED").separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn completion_policy(&self) -> CompletionPolicy {
        match self.policy {
            PolicyKind::WaitForAll => CompletionPolicy::WaitForAll,
            PolicyKind::QuorumOrTimeout => CompletionPolicy::QuorumOrTimeout {
                quorum: self.quorum,
                timeout: Duration::seconds(self.round_timeout_secs),
            },
        }
    }
}
