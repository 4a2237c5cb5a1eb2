//! Invocation pipeline.
//!
//! One message in, one report out. The dispatcher resolves the command
//! path, binds arguments, runs checks outermost-first, charges the
//! cooldown, then invokes the hooks and body. Every failure is routed
//! through the error router exactly once before the report is returned.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::checks::{Check, CheckOutcome};
use crate::context::Context;
use crate::cooldowns::now;
use crate::errors::CommandError;
use crate::registry::CommandRegistry;
use crate::resolver::resolve_arguments;
use crate::router::{ErrorHandler, ErrorRouter};
use crate::view::StringView;

/// Where an invocation stopped. States only ever advance; a report
/// carries the last state reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    /// Resolution or argument binding has not completed.
    Pending,
    ChecksRunning,
    ChecksFailed,
    ChecksPassed,
    Invoking,
    InvokeFailed,
    Completed,
}

#[derive(Debug)]
pub struct InvocationReport {
    pub state: InvocationState,
    pub error: Option<CommandError>,
}

impl InvocationReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.state, InvocationState::Completed)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Dispatcher {
    registry: CommandRegistry,
    global_checks: Vec<Arc<dyn Check>>,
    router: ErrorRouter,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("global_checks", &self.global_checks.len())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Add a check that gates every command.
    pub fn add_check(&mut self, check: impl Check + 'static) {
        self.global_checks.push(Arc::new(check));
    }

    pub fn on_error(&mut self, handler: Arc<dyn ErrorHandler>) {
        self.router.set_global(handler);
    }

    /// Run one invocation end to end. `ctx.raw` holds the message text
    /// with any prefix already stripped.
    pub async fn dispatch(&self, ctx: &mut Context) -> InvocationReport {
        match self.run(ctx).await {
            Ok(state) => InvocationReport { state, error: None },
            Err((state, error)) => {
                self.router.route(ctx, &error).await;
                InvocationReport { state, error: Some(error) }
            }
        }
    }

    async fn run(
        &self,
        ctx: &mut Context,
    ) -> Result<InvocationState, (InvocationState, CommandError)> {
        use InvocationState::*;

        let mut view = StringView::new(&ctx.raw);
        let command =
            self.registry.resolve(&mut view).map_err(|e| (Pending, e))?;
        ctx.command = Some(Arc::clone(&command));

        if !command.enabled {
            return Err((Pending, CommandError::DisabledCommand(command.name.clone())));
        }

        ctx.args = resolve_arguments(ctx, &command, &mut view)
            .await
            .map_err(|e| (Pending, e))?;

        debug!("[Dispatch] '{}' entering {:?}", command.qualified_name(), ChecksRunning);
        let mut gates: Vec<&Arc<dyn Check>> = self.global_checks.iter().collect();
        let ancestors = command.ancestors();
        for ancestor in &ancestors {
            gates.extend(ancestor.checks.iter());
        }
        gates.extend(command.checks.iter());
        for check in gates {
            if let CheckOutcome::Fail(error) = check.run(ctx).await {
                debug!("[Dispatch] check '{}' rejected '{}'", check.name(), ctx.command_name());
                return Err((ChecksFailed, error));
            }
        }
        debug!("[Dispatch] '{}' entering {:?}", command.qualified_name(), ChecksPassed);

        if let Some(cooldown) = &command.cooldown {
            if let Some(retry_after) = cooldown.update_rate_limit(ctx, now()) {
                return Err((ChecksFailed, CommandError::CommandOnCooldown { retry_after }));
            }
        }
        // Held until this function returns, which is after the
        // after-invoke hook.
        let _slot = match &command.max_concurrency {
            Some(limit) => Some(limit.acquire(ctx).map_err(|e| (ChecksFailed, e))?),
            None => None,
        };

        debug!("[Dispatch] '{}' entering {:?}", command.qualified_name(), Invoking);
        info!("[Dispatch] invoking '{}'", command.qualified_name());
        if let Some(hook) = &command.before_invoke {
            if let Err(source) = hook.run(ctx).await {
                // The body never started, so the after hook stays off.
                return Err((
                    InvokeFailed,
                    CommandError::CommandInvokeError { command: command.name.clone(), source },
                ));
            }
        }

        let body = command.callback.invoke(ctx).await;

        // The after hook is the cleanup slot; it runs even when the body
        // failed.
        let after = match &command.after_invoke {
            Some(hook) => hook.run(ctx).await,
            None => Ok(()),
        };

        if let Err(source) = body {
            return Err((
                InvokeFailed,
                CommandError::CommandInvokeError { command: command.name.clone(), source },
            ));
        }
        if let Err(source) = after {
            return Err((
                InvokeFailed,
                CommandError::CommandInvokeError { command: command.name.clone(), source },
            ));
        }
        Ok(Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;

    use async_trait::async_trait;

    use crate::checks::FnCheck;
    use crate::command::{Callback, Command, FnCallback, FnHook, Parameter};
    use crate::convert::{ConverterSpec, TargetType};
    use crate::cooldowns::BucketType;
    use crate::router::FnErrorHandler;
    use crate::testutil::{test_context, test_context_with_sink};

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn trace() -> Trace {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn mark(trace: &Trace, step: &'static str) {
        trace.lock().unwrap().push(step);
    }

    #[test]
    fn state_labels_are_stable() {
        use InvocationState::*;
        let labels: Vec<serde_json::Value> =
            [Pending, ChecksRunning, ChecksFailed, ChecksPassed, Invoking, InvokeFailed, Completed]
                .iter()
                .map(|s| serde_json::to_value(s).unwrap())
                .collect();
        assert_eq!(
            labels,
            vec![
                json!("pending"),
                json!("checks_running"),
                json!("checks_failed"),
                json!("checks_passed"),
                json!("invoking"),
                json!("invoke_failed"),
                json!("completed"),
            ]
        );
    }

    #[tokio::test]
    async fn add_command_binds_and_invokes() {
        let mut dispatcher = Dispatcher::new();
        let cmd = Command::builder("add")
            .param(Parameter::positional("a", ConverterSpec::Direct(TargetType::Int)))
            .param(Parameter::positional("b", ConverterSpec::Direct(TargetType::Int)))
            .callback(FnCallback::new(|ctx: &Context| {
                let sum = ctx.args.int_of("a").unwrap() + ctx.args.int_of("b").unwrap();
                ctx.set_state("sum", json!(sum));
                Ok(())
            }))
            .build()
            .unwrap();
        dispatcher.registry_mut().register(cmd).unwrap();

        let mut ctx = test_context();
        ctx.raw = "add 3 4".into();
        let report = dispatcher.dispatch(&mut ctx).await;
        assert!(report.succeeded(), "{report:?}");
        assert_eq!(ctx.state("sum"), Some(json!(7)));
    }

    #[tokio::test]
    async fn parse_failure_is_routed_and_reported_pending() {
        let mut dispatcher = Dispatcher::new();
        let cmd = Command::builder("add")
            .param(Parameter::positional("a", ConverterSpec::Direct(TargetType::Int)))
            .callback(FnCallback::new(|_: &Context| Ok(())))
            .build()
            .unwrap();
        dispatcher.registry_mut().register(cmd).unwrap();

        let (mut ctx, sink) = test_context_with_sink();
        ctx.raw = "add banana".into();
        let report = dispatcher.dispatch(&mut ctx).await;
        assert_eq!(report.state, InvocationState::Pending);
        assert_eq!(report.error.as_ref().unwrap().kind(), "bad_argument");
        // Default routing replies user errors verbatim.
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn checks_run_outermost_first_and_gate_the_body() {
        let steps = trace();
        let mut dispatcher = Dispatcher::new();
        let g = Arc::clone(&steps);
        dispatcher.add_check(FnCheck::new("global", move |_| {
            mark(&g, "global");
            true
        }));

        let (p, l, body) = (Arc::clone(&steps), Arc::clone(&steps), Arc::clone(&steps));
        let cmd = Command::builder("parent")
            .check(FnCheck::new("parent_check", move |_| {
                mark(&p, "parent");
                true
            }))
            .callback(FnCallback::new(|_: &Context| Ok(())))
            .subcommand(
                Command::builder("child")
                    .check(FnCheck::new("local", move |_| {
                        mark(&l, "local");
                        false
                    }))
                    .callback(FnCallback::new(move |_: &Context| {
                        mark(&body, "body");
                        Ok(())
                    })),
            )
            .build()
            .unwrap();
        dispatcher.registry_mut().register(cmd).unwrap();

        let mut ctx = test_context();
        ctx.raw = "parent child".into();
        let report = dispatcher.dispatch(&mut ctx).await;
        assert_eq!(report.state, InvocationState::ChecksFailed);
        assert!(
            matches!(report.error, Some(CommandError::CheckFailure { ref check, .. }) if check == "local")
        );
        assert_eq!(*steps.lock().unwrap(), vec!["global", "parent", "local"]);
    }

    #[tokio::test]
    async fn after_hook_runs_when_the_body_fails() {
        let steps = trace();
        let (before, after) = (Arc::clone(&steps), Arc::clone(&steps));
        let mut dispatcher = Dispatcher::new();
        let cmd = Command::builder("boom")
            .before_invoke(FnHook::new("setup", move |_| {
                mark(&before, "before");
                Ok(())
            }))
            .after_invoke(FnHook::new("teardown", move |_| {
                mark(&after, "after");
                Ok(())
            }))
            .callback(FnCallback::new(|_: &Context| Err(anyhow::anyhow!("kaboom"))))
            .build()
            .unwrap();
        dispatcher.registry_mut().register(cmd).unwrap();

        let mut ctx = test_context();
        ctx.raw = "boom".into();
        let report = dispatcher.dispatch(&mut ctx).await;
        assert_eq!(report.state, InvocationState::InvokeFailed);
        assert_eq!(report.error.as_ref().unwrap().kind(), "command_invoke_error");
        assert_eq!(*steps.lock().unwrap(), vec!["before", "after"]);
    }

    #[tokio::test]
    async fn before_hook_failure_skips_body_and_after_hook() {
        let steps = trace();
        let (body, after) = (Arc::clone(&steps), Arc::clone(&steps));
        let mut dispatcher = Dispatcher::new();
        let cmd = Command::builder("guarded")
            .before_invoke(FnHook::new("setup", |_| Err(anyhow::anyhow!("no resources"))))
            .after_invoke(FnHook::new("teardown", move |_| {
                mark(&after, "after");
                Ok(())
            }))
            .callback(FnCallback::new(move |_: &Context| {
                mark(&body, "body");
                Ok(())
            }))
            .build()
            .unwrap();
        dispatcher.registry_mut().register(cmd).unwrap();

        let mut ctx = test_context();
        ctx.raw = "guarded".into();
        let report = dispatcher.dispatch(&mut ctx).await;
        assert_eq!(report.state, InvocationState::InvokeFailed);
        assert!(steps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cooldown_rejects_the_second_burst_call() {
        let mut dispatcher = Dispatcher::new();
        let cmd = Command::builder("spam")
            .cooldown(1, 60.0, BucketType::User)
            .callback(FnCallback::new(|_: &Context| Ok(())))
            .build()
            .unwrap();
        dispatcher.registry_mut().register(cmd).unwrap();

        let mut ctx = test_context();
        ctx.raw = "spam".into();
        assert!(dispatcher.dispatch(&mut ctx).await.succeeded());

        let mut ctx = test_context();
        ctx.raw = "spam".into();
        let report = dispatcher.dispatch(&mut ctx).await;
        assert_eq!(report.state, InvocationState::ChecksFailed);
        match report.error {
            Some(CommandError::CommandOnCooldown { retry_after }) => assert!(retry_after > 0.0),
            other => panic!("expected cooldown error, got {other:?}"),
        }
    }

    /// Body that parks until released, so a second invocation can
    /// overlap it.
    struct ParkedCallback {
        gate: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl Callback for ParkedCallback {
        async fn invoke(&self, _ctx: &Context) -> anyhow::Result<()> {
            self.gate.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrency_limit_rejects_overlapping_invocations() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let mut dispatcher = Dispatcher::new();
        let cmd = Command::builder("slow")
            .max_concurrency(1, BucketType::User)
            .callback(ParkedCallback { gate: Arc::clone(&gate) })
            .build()
            .unwrap();
        dispatcher.registry_mut().register(cmd).unwrap();

        let mut first = test_context();
        first.raw = "slow".into();
        let mut second = test_context();
        second.raw = "slow".into();

        let (one, two) = tokio::join!(dispatcher.dispatch(&mut first), async {
            // Let the first invocation reach its body and park there.
            tokio::task::yield_now().await;
            let report = dispatcher.dispatch(&mut second).await;
            gate.notify_one();
            report
        });
        assert!(one.succeeded(), "{one:?}");
        assert_eq!(two.state, InvocationState::ChecksFailed);
        assert_eq!(two.error.as_ref().unwrap().kind(), "max_concurrency_reached");
    }

    #[tokio::test]
    async fn concurrency_slot_is_released_after_completion() {
        let mut dispatcher = Dispatcher::new();
        let cmd = Command::builder("quick")
            .max_concurrency(1, BucketType::User)
            .callback(FnCallback::new(|_: &Context| Ok(())))
            .build()
            .unwrap();
        dispatcher.registry_mut().register(cmd).unwrap();

        for _ in 0..3 {
            let mut ctx = test_context();
            ctx.raw = "quick".into();
            assert!(dispatcher.dispatch(&mut ctx).await.succeeded());
        }
    }

    #[tokio::test]
    async fn disabled_command_never_reaches_checks() {
        let steps = trace();
        let gate = Arc::clone(&steps);
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_check(FnCheck::new("global", move |_| {
            mark(&gate, "global");
            true
        }));
        let cmd = Command::builder("legacy")
            .disabled()
            .callback(FnCallback::new(|_: &Context| Ok(())))
            .build()
            .unwrap();
        dispatcher.registry_mut().register(cmd).unwrap();

        let mut ctx = test_context();
        ctx.raw = "legacy".into();
        let report = dispatcher.dispatch(&mut ctx).await;
        assert_eq!(report.state, InvocationState::Pending);
        assert_eq!(report.error.as_ref().unwrap().kind(), "disabled_command");
        assert!(steps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_command_reaches_the_default_router() {
        let dispatcher = Dispatcher::new();
        let (mut ctx, sink) = test_context_with_sink();
        ctx.raw = "missing".into();
        let report = dispatcher.dispatch(&mut ctx).await;
        assert_eq!(report.state, InvocationState::Pending);
        assert_eq!(report.error.as_ref().unwrap().kind(), "command_not_found");
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn local_error_handler_wins_over_global() {
        let steps = trace();
        let (local, global) = (Arc::clone(&steps), Arc::clone(&steps));
        let mut dispatcher = Dispatcher::new();
        dispatcher.on_error(Arc::new(FnErrorHandler::new(
            "global",
            move |_: &Context, _: &CommandError| mark(&global, "global"),
        )));
        let cmd = Command::builder("boom")
            .on_error(FnErrorHandler::new("local", move |_: &Context, _: &CommandError| {
                mark(&local, "local");
            }))
            .callback(FnCallback::new(|_: &Context| Err(anyhow::anyhow!("kaboom"))))
            .build()
            .unwrap();
        dispatcher.registry_mut().register(cmd).unwrap();

        let mut ctx = test_context();
        ctx.raw = "boom".into();
        dispatcher.dispatch(&mut ctx).await;
        assert_eq!(*steps.lock().unwrap(), vec!["local"]);
    }
}
