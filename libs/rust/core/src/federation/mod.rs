//! Federated weight-aggregation core: round lifecycle, completion
//! policy, sample-weighted averaging and coordination.

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod round;
pub mod storage;

pub use coordinator::{CoordinatorPhase, RoundCoordinator, RoundFailure, RoundSnapshot};
pub use engine::{AggregationEngine, AggregationMethod};
pub use error::FederationError;
pub use model::{
    AggregatedModel, LayerShape, ModelShape, ParticipantId, RoundId, TrainingMetrics,
    WeightContribution,
};
pub use registry::{InMemoryRegistry, Participant, ParticipantRegistry};
pub use round::{AggregationRound, CompletionPolicy, RoundArchive, RoundOutcome, RoundStatus};
pub use storage::{InMemoryStore, ModelStore};
