//! Collaborator traits.
//!
//! The parsing core never performs I/O of its own: entity lookups go
//! through `EntityResolver` (a view over already-cached state) and
//! outbound replies go through `ReplySink` (fire-and-forget from the
//! core's perspective). Both can be backed by a real gateway or by the
//! in-memory implementations in this crate.
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::entity::{Channel, EntityId, Member, Role};

// ---------------------------------------------------------------------------
// Entity resolver
// ---------------------------------------------------------------------------

/// Cache-only entity lookups. Implementations must not make new network
/// calls; anything not already cached is simply not found.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Human-readable resolver name for logging.
    fn name(&self) -> &str;

    async fn member_by_id(&self, id: EntityId) -> Option<Member>;
    async fn member_by_name(&self, name: &str) -> Option<Member>;
    async fn channel_by_id(&self, id: EntityId) -> Option<Channel>;
    async fn channel_by_name(&self, name: &str) -> Option<Channel>;
    async fn role_by_id(&self, id: EntityId) -> Option<Role>;
    async fn role_by_name(&self, name: &str) -> Option<Role>;
}

// ---------------------------------------------------------------------------
// Reply sink
// ---------------------------------------------------------------------------

/// Outbound reply channel used by command bodies and error handlers.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Human-readable sink name for logging.
    fn name(&self) -> &str;

    async fn send(&self, content: &str) -> Result<()>;
}

/// In-memory sink that records everything sent through it.
#[derive(Debug, Default)]
pub struct BufferSink {
    sent: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sink poisoned").clone()
    }
}

#[async_trait]
impl ReplySink for BufferSink {
    fn name(&self) -> &str {
        "buffer"
    }

    async fn send(&self, content: &str) -> Result<()> {
        self.sent.lock().expect("sink poisoned").push(content.to_string());
        Ok(())
    }
}
