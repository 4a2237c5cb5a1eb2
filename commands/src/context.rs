//! Invocation context: everything one command invocation owns.
//!
//! A `Context` is created per inbound message and discarded once
//! dispatch completes; nothing in it is shared across invocations. The
//! state bag carries values between checks, hooks, and the body.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use herald_core::{Arguments, Channel, EntityId, EntityResolver, Member, ReplySink};

use crate::command::Command;

pub struct Context {
    pub author: Member,
    pub channel: Channel,
    pub guild_id: Option<EntityId>,
    /// Raw message text, already stripped of any prefix marker.
    pub raw: String,
    /// Set once the registry resolves the command path.
    pub command: Option<Arc<Command>>,
    /// Bound arguments, set once resolution succeeds.
    pub args: Arguments,
    pub resolver: Arc<dyn EntityResolver>,
    pub sink: Arc<dyn ReplySink>,
    state: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl Context {
    pub fn new(
        author: Member,
        channel: Channel,
        raw: impl Into<String>,
        resolver: Arc<dyn EntityResolver>,
        sink: Arc<dyn ReplySink>,
    ) -> Self {
        let guild_id = author.guild_id.or(channel.guild_id);
        Self {
            author,
            channel,
            guild_id,
            raw: raw.into(),
            command: None,
            args: Arguments::new(),
            resolver,
            sink,
            state: Mutex::new(BTreeMap::new()),
        }
    }

    /// Qualified name of the resolved command, or `"?"` before
    /// resolution. Logging only.
    pub fn command_name(&self) -> String {
        self.command
            .as_ref()
            .map(|c| c.qualified_name())
            .unwrap_or_else(|| "?".to_string())
    }

    /// Stash a value for later pipeline stages.
    pub fn set_state(&self, key: impl Into<String>, value: serde_json::Value) {
        if let Ok(mut state) = self.state.lock() {
            state.insert(key.into(), value);
        }
    }

    pub fn state(&self, key: &str) -> Option<serde_json::Value> {
        self.state.lock().ok().and_then(|state| state.get(key).cloned())
    }

    /// Send a reply through the sink.
    pub async fn reply(&self, content: &str) -> Result<()> {
        self.sink.send(content).await
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("author", &self.author.name)
            .field("channel", &self.channel.name)
            .field("raw", &self.raw)
            .field("command", &self.command_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::test_context;

    #[test]
    fn state_bag_round_trips() {
        let ctx = test_context();
        ctx.set_state("elevated", serde_json::json!(true));
        assert_eq!(ctx.state("elevated"), Some(serde_json::json!(true)));
        assert_eq!(ctx.state("missing"), None);
    }

    #[tokio::test]
    async fn reply_goes_through_sink() {
        let ctx = test_context();
        ctx.reply("pong").await.unwrap();
    }
}
