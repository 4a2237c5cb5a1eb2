//! Shared fixtures for the inline test modules.

use std::sync::Arc;

use herald_core::{BufferSink, CachedEntities, Channel, Member, Role};

use crate::command::{Command, FnCallback, Parameter};
use crate::context::Context;

fn resolver() -> Arc<CachedEntities> {
    Arc::new(
        CachedEntities::new()
            .with_member(Member::in_guild(1, "alice", 100))
            .with_member(Member::in_guild(2, "bob", 100))
            .with_channel(Channel::new(10, "general"))
            .with_role(Role::new(5, "admin", 100)),
    )
}

/// Context for a guild message authored by alice.
pub(crate) fn test_context() -> Context {
    test_context_with_sink().0
}

pub(crate) fn test_context_with_sink() -> (Context, Arc<BufferSink>) {
    let sink = Arc::new(BufferSink::new());
    let ctx = Context::new(
        Member::in_guild(1, "alice", 100),
        Channel::new(10, "general"),
        "",
        resolver(),
        Arc::clone(&sink) as Arc<dyn herald_core::ReplySink>,
    );
    (ctx, sink)
}

/// Context for a direct message, no guild on either side.
pub(crate) fn dm_context() -> Context {
    Context::new(
        Member::new(1, "alice"),
        Channel::new(10, "general"),
        "",
        resolver(),
        Arc::new(BufferSink::new()),
    )
}

/// Command with the given parameters and a callback that does nothing.
pub(crate) fn noop_command(params: Vec<Parameter>) -> Arc<Command> {
    let mut builder =
        Command::builder("noop").callback(FnCallback::new(|_: &Context| Ok(())));
    for param in params {
        builder = builder.param(param);
    }
    builder.build().expect("noop command must assemble")
}
