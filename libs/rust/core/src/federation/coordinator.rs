//! Round orchestration state machine.
//!
//! Phases: NoActiveRound -> RoundOpen -> (resolve) -> RoundOpen | Halted.
//! While round N aggregates, round N+1 is already open: `try_close_round`
//! detaches the ready round and opens its successor inside one critical
//! section, then runs the engine outside the lock so submissions are
//! never blocked by aggregation. A failed aggregation closes the round
//! with a failure record; it never stops the next round.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus::{
    exponential_buckets, register_histogram, register_int_counter, Histogram, IntCounter,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::engine::{AggregationEngine, AggregationMethod};
use super::error::FederationError;
use super::model::{AggregatedModel, ModelShape, RoundId, WeightContribution};
use super::registry::ParticipantRegistry;
use super::round::{AggregationRound, CompletionPolicy, RoundOutcome, RoundStatus};
use super::storage::ModelStore;

struct FedMetrics {
    contributions_total: IntCounter,
    contributions_rejected_total: IntCounter,
    rounds_published_total: IntCounter,
    rounds_failed_total: IntCounter,
    aggregation_latency_ms: Histogram,
}

static FED_METRICS: Lazy<FedMetrics> = Lazy::new(|| FedMetrics {
    contributions_total: register_int_counter!(
        "fed_contributions_total",
        "Weight contributions accepted into a round"
    )
    .expect("metric registration"),
    contributions_rejected_total: register_int_counter!(
        "fed_contributions_rejected_total",
        "Weight contributions rejected at validation"
    )
    .expect("metric registration"),
    rounds_published_total: register_int_counter!(
        "fed_rounds_published_total",
        "Rounds closed with a published global model"
    )
    .expect("metric registration"),
    rounds_failed_total: register_int_counter!(
        "fed_rounds_failed_total",
        "Rounds closed with a failure record"
    )
    .expect("metric registration"),
    aggregation_latency_ms: register_histogram!(
        "fed_aggregation_latency_ms",
        "Latency of the aggregation step in milliseconds",
        exponential_buckets(0.5, 2.0, 12).expect("latency buckets")
    )
    .expect("metric registration"),
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorPhase {
    NoActiveRound,
    RoundOpen,
    Halted,
}

/// Error record retained when a round resolves without a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundFailure {
    pub round: RoundId,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Read-only view of the active round, for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSnapshot {
    pub round: RoundId,
    pub status: RoundStatus,
    pub submitted: usize,
    pub expected: usize,
    pub opened_at: DateTime<Utc>,
}

struct CoordinatorState {
    phase: CoordinatorPhase,
    active: Option<AggregationRound>,
    next_round: RoundId,
    published: Vec<AggregatedModel>,
    failures: Vec<RoundFailure>,
}

pub struct RoundCoordinator {
    registry: Arc<dyn ParticipantRegistry>,
    store: Arc<dyn ModelStore>,
    engine: AggregationEngine,
    model_shape: ModelShape,
    state: RwLock<CoordinatorState>,
}

impl RoundCoordinator {
    pub fn new(
        registry: Arc<dyn ParticipantRegistry>,
        store: Arc<dyn ModelStore>,
        method: AggregationMethod,
        model_shape: ModelShape,
    ) -> Result<Self, FederationError> {
        model_shape.validate()?;
        Ok(Self {
            registry,
            store,
            engine: AggregationEngine::new(method),
            model_shape,
            state: RwLock::new(CoordinatorState {
                phase: CoordinatorPhase::NoActiveRound,
                active: None,
                next_round: 1,
                published: Vec::new(),
                failures: Vec::new(),
            }),
        })
    }

    /// Snapshots the active participant set and opens the next round.
    pub fn start_round(
        &self,
        policy: CompletionPolicy,
        now: DateTime<Utc>,
    ) -> Result<RoundId, FederationError> {
        let mut st = self.state.write();
        if let Some(round) = &st.active {
            return Err(FederationError::RoundAlreadyOpen(round.number()));
        }
        if st.phase == CoordinatorPhase::Halted {
            return Err(FederationError::RegistryUnavailable(
                "coordinator is halted; no new rounds can be created".into(),
            ));
        }
        self.open_round_locked(&mut st, policy, now)
    }

    fn open_round_locked(
        &self,
        st: &mut CoordinatorState,
        policy: CompletionPolicy,
        now: DateTime<Utc>,
    ) -> Result<RoundId, FederationError> {
        let expected = match self.registry.list_active_participants() {
            Ok(expected) => expected,
            Err(e) => {
                st.phase = CoordinatorPhase::Halted;
                error!(error = %e, "registry_unavailable_coordinator_halted");
                return Err(e);
            }
        };
        let number = st.next_round;
        let round = AggregationRound::open(
            number,
            expected,
            self.model_shape.clone(),
            policy,
            now,
        )?;
        info!(
            round = number,
            expected = round.expected_count(),
            "round_opened"
        );
        st.active = Some(round);
        st.phase = CoordinatorPhase::RoundOpen;
        st.next_round = number + 1;
        Ok(number)
    }

    /// Validates and records one contribution against the active round.
    /// Rejections leave round state untouched and are never silent.
    pub fn submit_contribution(
        &self,
        contribution: WeightContribution,
    ) -> Result<(), FederationError> {
        let mut st = self.state.write();
        let Some(round) = st.active.as_mut() else {
            FED_METRICS.contributions_rejected_total.inc();
            return Err(FederationError::NoActiveRound);
        };
        if contribution.round != round.number() {
            FED_METRICS.contributions_rejected_total.inc();
            // A submission tagged for an earlier round arrived after
            // that round resolved; one tagged for a later round has no
            // open round to land in.
            if contribution.round < round.number() {
                return Err(FederationError::InvalidTransition {
                    round: contribution.round,
                    required: RoundStatus::Open,
                    actual: RoundStatus::Closed,
                });
            }
            return Err(FederationError::NoActiveRound);
        }
        match round.submit(contribution) {
            Ok(replaced) => {
                FED_METRICS.contributions_total.inc();
                info!(
                    round = round.number(),
                    submitted = round.contribution_count(),
                    expected = round.expected_count(),
                    replaced,
                    "contribution_accepted"
                );
                Ok(())
            }
            Err(e) => {
                FED_METRICS.contributions_rejected_total.inc();
                Err(e)
            }
        }
    }

    /// Resolves the active round if its completion policy says so.
    ///
    /// Returns Ok(true) when a round was resolved (published or failed),
    /// Ok(false) when nothing was ready. The only error path is a
    /// registry outage while opening the successor round, which halts
    /// the coordinator after the current round is archived.
    pub fn try_close_round(&self, now: DateTime<Utc>) -> Result<bool, FederationError> {
        // Critical section: readiness check, detach, successor open.
        // A submission can never interleave between "ready" and "detached".
        let (mut round, successor) = {
            let mut st = self.state.write();
            let ready = st.active.as_ref().is_some_and(|r| r.is_ready(now));
            if !ready {
                return Ok(false);
            }
            let Some(mut round) = st.active.take() else {
                return Ok(false);
            };
            round.begin_aggregation()?;
            st.phase = CoordinatorPhase::NoActiveRound;
            let successor = self.open_round_locked(&mut st, round.policy().clone(), now);
            (round, successor)
        };

        // Aggregation runs outside the lock; round N+1 is already
        // accepting submissions while round N resolves.
        let contributions = round.contributions_sorted();
        let started = Instant::now();
        let outcome = match self.engine.aggregate(&contributions, now) {
            Ok(model) => {
                FED_METRICS
                    .aggregation_latency_ms
                    .observe(started.elapsed().as_secs_f64() * 1000.0);
                RoundOutcome::Published(model)
            }
            Err(e) => {
                warn!(round = round.number(), error = %e, "aggregation_failed");
                RoundOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        round.close(outcome.clone(), now)?;
        let number = round.number();

        {
            let mut st = self.state.write();
            match &outcome {
                RoundOutcome::Published(model) => {
                    // Concurrent closers can finish out of round order
                    // when an earlier round aggregates slowly; insert
                    // by round number so the history stays monotone and
                    // get_latest_model always sees the newest round.
                    let pos = st
                        .published
                        .partition_point(|m| m.round < model.round);
                    st.published.insert(pos, model.clone());
                    FED_METRICS.rounds_published_total.inc();
                    info!(
                        round = number,
                        contributors = model.contributor_count,
                        total_samples = model.total_samples,
                        "round_published"
                    );
                }
                RoundOutcome::Failed { reason } => {
                    st.failures.push(RoundFailure {
                        round: number,
                        reason: reason.clone(),
                        recorded_at: now,
                    });
                    FED_METRICS.rounds_failed_total.inc();
                }
            }
        }

        // Durable history; a failed write is logged, not fatal, since
        // the in-memory history remains authoritative for this process.
        match round.into_archive() {
            Ok(archive) => {
                if let RoundOutcome::Published(model) = &archive.outcome {
                    if let Err(e) = self.store.append_model(model) {
                        warn!(round = number, error = %e, "model_persist_failed");
                    }
                }
                if let Err(e) = self.store.archive_round(&archive) {
                    warn!(round = number, error = %e, "round_archive_failed");
                }
            }
            Err(e) => warn!(round = number, error = %e, "round_archive_skipped"),
        }

        successor?;
        Ok(true)
    }

    /// Most recently published global model, if any round has succeeded.
    pub fn get_latest_model(&self) -> Option<AggregatedModel> {
        self.state.read().published.last().cloned()
    }

    pub fn published_history(&self) -> Vec<AggregatedModel> {
        self.state.read().published.clone()
    }

    pub fn failures(&self) -> Vec<RoundFailure> {
        self.state.read().failures.clone()
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.state.read().phase
    }

    pub fn round_status(&self) -> Option<RoundSnapshot> {
        self.state.read().active.as_ref().map(|r| RoundSnapshot {
            round: r.number(),
            status: r.status(),
            submitted: r.contribution_count(),
            expected: r.expected_count(),
            opened_at: r.opened_at(),
        })
    }

    pub fn current_round(&self) -> Option<RoundId> {
        self.state.read().active.as_ref().map(|r| r.number())
    }

    pub fn model_shape(&self) -> &ModelShape {
        &self.model_shape
    }
}
