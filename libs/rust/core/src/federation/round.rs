//! Round lifecycle: contribution collection and readiness policy.
//!
//! Status transitions are monotone: Open -> Aggregating -> Closed.
//! Readiness is pure policy evaluation over injected time, so deadline
//! behavior is deterministic under test.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::FederationError;
use super::model::{AggregatedModel, ModelShape, ParticipantId, RoundId, WeightContribution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundStatus {
    Open,
    Aggregating,
    Closed,
}

/// When may a round stop waiting for contributions. Supplied by the
/// caller at round-open time, never hardcoded.
#[derive(Debug, Clone)]
pub enum CompletionPolicy {
    /// Every expected participant must submit.
    WaitForAll,
    /// A fraction of the expected set suffices once the deadline
    /// (opened_at + timeout) has elapsed.
    QuorumOrTimeout { quorum: f64, timeout: Duration },
}

/// How a round resolved. A failed aggregation still closes the round;
/// the failure record is retained in its place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RoundOutcome {
    Published(AggregatedModel),
    Failed { reason: String },
}

/// Serializable record of a resolved round, for the archive store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundArchive {
    pub round: RoundId,
    pub contributions: Vec<WeightContribution>,
    pub outcome: RoundOutcome,
    pub closed_at: DateTime<Utc>,
}

/// One coordination cycle. Owns its contributions exclusively; at most
/// one per participant, last write wins.
#[derive(Debug)]
pub struct AggregationRound {
    number: RoundId,
    expected: BTreeSet<ParticipantId>,
    shape: ModelShape,
    policy: CompletionPolicy,
    contributions: BTreeMap<ParticipantId, WeightContribution>,
    status: RoundStatus,
    opened_at: DateTime<Utc>,
    outcome: Option<RoundOutcome>,
    closed_at: Option<DateTime<Utc>>,
}

impl AggregationRound {
    pub fn open(
        number: RoundId,
        expected: BTreeSet<ParticipantId>,
        shape: ModelShape,
        policy: CompletionPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, FederationError> {
        shape.validate()?;
        Ok(Self {
            number,
            expected,
            shape,
            policy,
            contributions: BTreeMap::new(),
            status: RoundStatus::Open,
            opened_at: now,
            outcome: None,
            closed_at: None,
        })
    }

    /// Accepts a contribution while the round is open. Returns whether
    /// this replaced a prior submission from the same participant.
    pub fn submit(&mut self, contribution: WeightContribution) -> Result<bool, FederationError> {
        if self.status != RoundStatus::Open {
            return Err(FederationError::InvalidTransition {
                round: self.number,
                required: RoundStatus::Open,
                actual: self.status,
            });
        }
        if !self.expected.contains(&contribution.participant_id) {
            return Err(FederationError::UnknownParticipant {
                participant: contribution.participant_id,
                round: self.number,
            });
        }
        let actual = contribution.shape()?;
        if actual != self.shape {
            return Err(FederationError::ShapeMismatch {
                expected: self.shape.clone(),
                actual,
            });
        }
        let replaced = self
            .contributions
            .insert(contribution.participant_id, contribution)
            .is_some();
        if replaced {
            debug!(round = self.number, "contribution_replaced");
        }
        Ok(replaced)
    }

    /// Policy evaluation over injected time. A round with zero
    /// contributions is never ready, whatever the policy says.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        if self.status != RoundStatus::Open || self.contributions.is_empty() {
            return false;
        }
        if self.contributions.len() >= self.expected.len() {
            return true;
        }
        match self.policy {
            CompletionPolicy::WaitForAll => false,
            CompletionPolicy::QuorumOrTimeout { quorum, timeout } => {
                let fraction = self.contributions.len() as f64 / self.expected.len() as f64;
                fraction >= quorum && now >= self.opened_at + timeout
            }
        }
    }

    pub fn begin_aggregation(&mut self) -> Result<(), FederationError> {
        if self.status != RoundStatus::Open {
            return Err(FederationError::InvalidTransition {
                round: self.number,
                required: RoundStatus::Open,
                actual: self.status,
            });
        }
        self.status = RoundStatus::Aggregating;
        Ok(())
    }

    pub fn close(
        &mut self,
        outcome: RoundOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), FederationError> {
        if self.status == RoundStatus::Closed {
            return Err(FederationError::InvalidTransition {
                round: self.number,
                required: RoundStatus::Aggregating,
                actual: RoundStatus::Closed,
            });
        }
        self.status = RoundStatus::Closed;
        self.outcome = Some(outcome);
        self.closed_at = Some(now);
        Ok(())
    }

    pub fn number(&self) -> RoundId {
        self.number
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn policy(&self) -> &CompletionPolicy {
        &self.policy
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn expected_count(&self) -> usize {
        self.expected.len()
    }

    pub fn contribution_count(&self) -> usize {
        self.contributions.len()
    }

    pub fn outcome(&self) -> Option<&RoundOutcome> {
        self.outcome.as_ref()
    }

    /// Contributions in participant-id order (the fixed accumulation
    /// order the engine relies on for reproducibility).
    pub fn contributions_sorted(&self) -> Vec<WeightContribution> {
        self.contributions.values().cloned().collect()
    }

    /// Consumes a closed round into its archival record.
    pub fn into_archive(self) -> Result<RoundArchive, FederationError> {
        if self.status != RoundStatus::Closed {
            return Err(FederationError::InvalidTransition {
                round: self.number,
                required: RoundStatus::Closed,
                actual: self.status,
            });
        }
        let outcome = self.outcome.unwrap_or(RoundOutcome::Failed {
            reason: "round closed without an outcome".into(),
        });
        Ok(RoundArchive {
            round: self.number,
            contributions: self.contributions.into_values().collect(),
            outcome,
            closed_at: self.closed_at.unwrap_or_else(Utc::now),
        })
    }
}
