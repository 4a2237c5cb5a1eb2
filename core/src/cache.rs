//! In-memory entity cache.
//!
//! `CachedEntities` is the canonical `EntityResolver`: a snapshot of
//! whatever members/channels/roles the surrounding gateway has already
//! seen. Lookups are by exact id or case-insensitive name.
use async_trait::async_trait;

use crate::entity::{Channel, EntityId, Member, Role};
use crate::traits::EntityResolver;

#[derive(Debug, Default, Clone)]
pub struct CachedEntities {
    members: Vec<Member>,
    channels: Vec<Channel>,
    roles: Vec<Role>,
}

impl CachedEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }
}

#[async_trait]
impl EntityResolver for CachedEntities {
    fn name(&self) -> &str {
        "cached-entities"
    }

    async fn member_by_id(&self, id: EntityId) -> Option<Member> {
        self.members.iter().find(|m| m.id == id).cloned()
    }

    async fn member_by_name(&self, name: &str) -> Option<Member> {
        self.members.iter().find(|m| m.name.eq_ignore_ascii_case(name)).cloned()
    }

    async fn channel_by_id(&self, id: EntityId) -> Option<Channel> {
        self.channels.iter().find(|c| c.id == id).cloned()
    }

    async fn channel_by_name(&self, name: &str) -> Option<Channel> {
        self.channels.iter().find(|c| c.name.eq_ignore_ascii_case(name)).cloned()
    }

    async fn role_by_id(&self, id: EntityId) -> Option<Role> {
        self.roles.iter().find(|r| r.id == id).cloned()
    }

    async fn role_by_name(&self, name: &str) -> Option<Role> {
        self.roles.iter().find(|r| r.name.eq_ignore_ascii_case(name)).cloned()
    }
}
