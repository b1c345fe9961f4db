//! Typed entities exchanged between participants and the coordinator.
//!
//! Everything here is plain data: contributions are immutable once
//! accepted by a round, aggregated models are immutable once published.
//! All numeric payloads are f64 so serialization round-trips without
//! precision loss.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::FederationError;

pub type RoundId = u64;

/// Opaque participant identity. The external registry owns the mapping
/// to a real hospital; the core only needs equality and a total order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerShape {
    pub rows: usize,
    pub cols: usize,
}

/// Dimensions of a model: one rectangular coefficient matrix per layer
/// plus a flat intercept vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelShape {
    pub layers: Vec<LayerShape>,
    pub intercept_len: usize,
}

impl ModelShape {
    pub fn validate(&self) -> Result<(), FederationError> {
        if self.layers.is_empty() {
            return Err(FederationError::InvalidShape(
                "model shape declares no layers".into(),
            ));
        }
        if self.layers.iter().any(|l| l.rows == 0 || l.cols == 0) {
            return Err(FederationError::InvalidShape(
                "model shape contains a zero-sized layer".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ModelShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, l) in self.layers.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}x{}", l.rows, l.cols)?;
        }
        write!(f, "]+b{}", self.intercept_len)
    }
}

/// Training quality reported by the participant alongside its weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub accuracy: f64,
    pub loss: f64,
}

/// One participant's submitted model parameters for one round.
///
/// Coefficients are indexed `[layer][row][col]`; the intercept is one
/// flat vector. Owned exclusively by the round that accepted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightContribution {
    pub participant_id: ParticipantId,
    pub round: RoundId,
    pub coefficients: Vec<Vec<Vec<f64>>>,
    pub intercept: Vec<f64>,
    pub sample_count: u64,
    pub submitted_at: DateTime<Utc>,
    pub metrics: TrainingMetrics,
}

impl WeightContribution {
    /// Derives the shape of this contribution, rejecting ragged
    /// matrices rather than guessing dimensions.
    pub fn shape(&self) -> Result<ModelShape, FederationError> {
        let mut layers = Vec::with_capacity(self.coefficients.len());
        for matrix in &self.coefficients {
            let rows = matrix.len();
            let cols = matrix.first().map(|r| r.len()).unwrap_or(0);
            if matrix.iter().any(|row| row.len() != cols) {
                return Err(FederationError::InvalidShape(
                    "ragged coefficient matrix".into(),
                ));
            }
            layers.push(LayerShape { rows, cols });
        }
        let shape = ModelShape {
            layers,
            intercept_len: self.intercept.len(),
        };
        shape.validate()?;
        Ok(shape)
    }
}

/// The coordinator's published result for one round. Append-only
/// history; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedModel {
    pub round: RoundId,
    pub coefficients: Vec<Vec<Vec<f64>>>,
    pub intercept: Vec<f64>,
    pub total_samples: u64,
    pub contributor_count: usize,
    pub aggregated_at: DateTime<Utc>,
}
