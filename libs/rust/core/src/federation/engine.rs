//! Sample-weighted federated averaging (McMahan-style FedAvg).
//!
//! Each coefficient and intercept entry is averaged element-wise,
//! weighted by the contribution's sample count and normalized by the
//! total sample count. Uniform averaging would bias the global model
//! toward small datasets, so the weighting is exact, never approximated.
//!
//! Accumulation always runs over contributions sorted by participant
//! id: the same multiset of contributions produces bit-identical
//! output regardless of submission order.

use chrono::{DateTime, Utc};

use super::error::FederationError;
use super::model::{AggregatedModel, WeightContribution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMethod {
    FedAvg,
}

/// Pure function over its inputs; no state beyond the chosen method.
#[derive(Debug, Clone, Copy)]
pub struct AggregationEngine {
    method: AggregationMethod,
}

impl AggregationEngine {
    pub fn new(method: AggregationMethod) -> Self {
        Self { method }
    }

    pub fn aggregate(
        &self,
        contributions: &[WeightContribution],
        now: DateTime<Utc>,
    ) -> Result<AggregatedModel, FederationError> {
        match self.method {
            AggregationMethod::FedAvg => self.fed_avg(contributions, now),
        }
    }

    fn fed_avg(
        &self,
        contributions: &[WeightContribution],
        now: DateTime<Utc>,
    ) -> Result<AggregatedModel, FederationError> {
        if contributions.is_empty() {
            return Err(FederationError::EmptyAggregation);
        }

        let mut ordered: Vec<&WeightContribution> = contributions.iter().collect();
        ordered.sort_by_key(|c| c.participant_id);

        // Defensive re-check: the round should already guarantee shape
        // consistency, but the engine must not assume it.
        let shape = ordered[0].shape()?;
        for c in &ordered[1..] {
            let actual = c.shape()?;
            if actual != shape {
                return Err(FederationError::ShapeMismatch {
                    expected: shape,
                    actual,
                });
            }
        }

        let total_samples: u64 = ordered.iter().map(|c| c.sample_count).sum();
        if total_samples == 0 {
            // A weighted average over zero samples is undefined.
            return Err(FederationError::EmptyAggregation);
        }

        let mut coefficients: Vec<Vec<Vec<f64>>> = shape
            .layers
            .iter()
            .map(|l| vec![vec![0.0; l.cols]; l.rows])
            .collect();
        let mut intercept = vec![0.0; shape.intercept_len];

        for c in &ordered {
            let weight = c.sample_count as f64;
            for (layer, matrix) in c.coefficients.iter().enumerate() {
                for (row, values) in matrix.iter().enumerate() {
                    for (col, v) in values.iter().enumerate() {
                        coefficients[layer][row][col] += v * weight;
                    }
                }
            }
            for (i, v) in c.intercept.iter().enumerate() {
                intercept[i] += v * weight;
            }
        }

        let norm = total_samples as f64;
        for matrix in &mut coefficients {
            for row in matrix {
                for v in row {
                    *v /= norm;
                }
            }
        }
        for v in &mut intercept {
            *v /= norm;
        }

        Ok(AggregatedModel {
            round: ordered[0].round,
            coefficients,
            intercept,
            total_samples,
            contributor_count: ordered.len(),
            aggregated_at: now,
        })
    }
}
