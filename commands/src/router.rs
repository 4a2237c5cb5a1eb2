//! Error routing.
//!
//! Every failed invocation ends up here exactly once. Routing prefers
//! the command's local handler, then the global handler, then a default
//! that logs and notifies the author through the reply sink.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::context::Context;
use crate::errors::CommandError;

/// Receives errors after an invocation fails. Handlers are observers;
/// they cannot resurrect the invocation.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, ctx: &Context, error: &CommandError);
}

/// Adapter for synchronous handler closures.
pub struct FnErrorHandler<F> {
    name: String,
    f: F,
}

impl<F> FnErrorHandler<F>
where
    F: Fn(&Context, &CommandError) + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F> ErrorHandler for FnErrorHandler<F>
where
    F: Fn(&Context, &CommandError) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: &Context, error: &CommandError) {
        (self.f)(ctx, error)
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ErrorRouter {
    global: Option<Arc<dyn ErrorHandler>>,
}

impl ErrorRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global(&mut self, handler: Arc<dyn ErrorHandler>) {
        self.global = Some(handler);
    }

    /// Dispatch `error` to the most specific handler available.
    pub async fn route(&self, ctx: &Context, error: &CommandError) {
        if let Some(command) = &ctx.command {
            if let Some(handler) = &command.error_handler {
                handler.handle(ctx, error).await;
                return;
            }
        }
        if let Some(handler) = &self.global {
            handler.handle(ctx, error).await;
            return;
        }
        self.default_handler(ctx, error).await;
    }

    async fn default_handler(&self, ctx: &Context, error: &CommandError) {
        error!("[Router] command '{}' failed ({}): {error}", ctx.command_name(), error.kind());
        let notice = if error.is_user_error() {
            error.to_string()
        } else {
            "Something went wrong while running that command.".to_string()
        };
        if let Err(send_err) = ctx.reply(&notice).await {
            warn!("[Router] failed to notify author: {send_err}");
        }
    }
}

impl std::fmt::Debug for ErrorRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRouter").field("global", &self.global.is_some()).finish()
    }
}
