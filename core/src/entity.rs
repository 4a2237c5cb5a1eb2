//! Chat entity model shared across the framework.
//!
//! Entities are the already-resolved handles a converter may bind an
//! argument to: guild members, channels, roles. They carry only the
//! identity data a cache lookup can supply — nothing here talks to a
//! transport.
use serde::{Deserialize, Serialize};

/// Numeric snowflake-style identifier.
pub type EntityId = u64;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: EntityId,
    pub name: String,
    pub guild_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: EntityId,
    pub name: String,
    pub guild_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: EntityId,
    pub name: String,
    pub guild_id: EntityId,
}

impl Member {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), guild_id: None }
    }

    pub fn in_guild(id: EntityId, name: impl Into<String>, guild_id: EntityId) -> Self {
        Self { id, name: name.into(), guild_id: Some(guild_id) }
    }
}

impl Channel {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), guild_id: None }
    }
}

impl Role {
    pub fn new(id: EntityId, name: impl Into<String>, guild_id: EntityId) -> Self {
        Self { id, name: name.into(), guild_id }
    }
}
