//! Coordination core for the medfed federated-learning backend.
//!
//! Independent hospitals train locally and submit weight contributions;
//! the coordinator collects them into rounds and publishes a
//! sample-weighted global model. Everything here is in-process: the
//! HTTP surface, credential handling and relational persistence live in
//! the services that consume this crate.

pub mod federation;

pub use federation::{
    AggregatedModel, AggregationEngine, AggregationMethod, AggregationRound, CompletionPolicy,
    CoordinatorPhase, FederationError, InMemoryRegistry, InMemoryStore, LayerShape, ModelShape,
    ModelStore, Participant, ParticipantId, ParticipantRegistry, RoundArchive, RoundCoordinator,
    RoundFailure, RoundId, RoundOutcome, RoundSnapshot, RoundStatus, TrainingMetrics,
    WeightContribution,
};
