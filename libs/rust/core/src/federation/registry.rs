//! Participant registry seam.
//!
//! Hospital identity, credentials and persistence live in an external
//! registry; the core only consumes two queries from it. The in-memory
//! implementation backs the service wiring and tests.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::FederationError;
use super::model::ParticipantId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub registered_at: DateTime<Utc>,
    pub active: bool,
}

/// What the coordinator needs from the registry collaborator. Fallible
/// because a permanently unavailable registry is the one condition that
/// halts new round creation.
pub trait ParticipantRegistry: Send + Sync {
    fn list_active_participants(&self) -> Result<BTreeSet<ParticipantId>, FederationError>;
    fn exists(&self, id: &ParticipantId) -> Result<bool, FederationError>;
}

#[derive(Default)]
pub struct InMemoryRegistry {
    participants: RwLock<HashMap<ParticipantId, Participant>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, display_name: &str, now: DateTime<Utc>) -> ParticipantId {
        let id = ParticipantId::generate();
        self.participants.write().insert(
            id,
            Participant {
                id,
                display_name: display_name.to_string(),
                registered_at: now,
                active: true,
            },
        );
        info!(participant = %id, name = display_name, "participant_registered");
        id
    }

    /// Name correction is the only mutation allowed on identity.
    pub fn rename(&self, id: &ParticipantId, display_name: &str) -> bool {
        match self.participants.write().get_mut(id) {
            Some(p) => {
                p.display_name = display_name.to_string();
                true
            }
            None => false,
        }
    }

    /// Participants are never deleted, only soft-disabled.
    pub fn set_active(&self, id: &ParticipantId, active: bool) -> bool {
        match self.participants.write().get_mut(id) {
            Some(p) => {
                p.active = active;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &ParticipantId) -> Option<Participant> {
        self.participants.read().get(id).cloned()
    }
}

impl ParticipantRegistry for InMemoryRegistry {
    fn list_active_participants(&self) -> Result<BTreeSet<ParticipantId>, FederationError> {
        Ok(self
            .participants
            .read()
            .values()
            .filter(|p| p.active)
            .map(|p| p.id)
            .collect())
    }

    fn exists(&self, id: &ParticipantId) -> Result<bool, FederationError> {
        Ok(self.participants.read().contains_key(id))
    }
}
