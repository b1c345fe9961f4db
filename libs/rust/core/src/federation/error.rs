//! Error taxonomy for the federation core.
//!
//! Every variant is recoverable at the coordinator boundary: validation
//! errors are returned synchronously to the submitter, aggregation
//! failures are recorded against the round, and collaborator outages
//! halt new round creation without touching closed history.

use thiserror::Error;

use super::model::{ModelShape, ParticipantId, RoundId};
use super::round::RoundStatus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FederationError {
    #[error("participant {participant} is not expected in round {round}")]
    UnknownParticipant {
        participant: ParticipantId,
        round: RoundId,
    },

    #[error("contribution shape {actual} does not match round shape {expected}")]
    ShapeMismatch {
        expected: ModelShape,
        actual: ModelShape,
    },

    #[error("round {round} is {actual:?} but the operation requires {required:?}")]
    InvalidTransition {
        round: RoundId,
        required: RoundStatus,
        actual: RoundStatus,
    },

    #[error("round {0} is already open")]
    RoundAlreadyOpen(RoundId),

    #[error("no round is currently open")]
    NoActiveRound,

    #[error("cannot aggregate an empty contribution set")]
    EmptyAggregation,

    #[error("invalid model shape: {0}")]
    InvalidShape(String),

    #[error("participant registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("model store unavailable: {0}")]
    StoreUnavailable(String),
}
