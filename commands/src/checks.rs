//! Checks: predicates gating whether a command may run.
//!
//! A check either passes or fails with a typed error; a predicate that
//! merely returns `false` is normalized into a generic `CheckFailure`
//! naming the predicate, so "false" and "raised" collapse into one
//! outcome at the boundary.
use async_trait::async_trait;

use crate::context::Context;
use crate::errors::CommandError;

#[derive(Debug)]
pub enum CheckOutcome {
    Pass,
    Fail(CommandError),
}

impl CheckOutcome {
    /// Fold a bare boolean into an outcome, attributing the failure to
    /// the named predicate.
    pub fn from_bool(check: &str, ok: bool) -> Self {
        if ok {
            CheckOutcome::Pass
        } else {
            CheckOutcome::Fail(CommandError::CheckFailure {
                check: check.to_string(),
                reason: "predicate returned false".to_string(),
            })
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, CheckOutcome::Pass)
    }
}

#[async_trait]
pub trait Check: Send + Sync {
    /// Human-readable check name for logging and failure attribution.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &Context) -> CheckOutcome;
}

/// Synchronous boolean predicate adapter.
pub struct FnCheck {
    name: String,
    predicate: Box<dyn Fn(&Context) -> bool + Send + Sync>,
}

impl FnCheck {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&Context) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), predicate: Box::new(predicate) }
    }
}

#[async_trait]
impl Check for FnCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &Context) -> CheckOutcome {
        CheckOutcome::from_bool(&self.name, (self.predicate)(ctx))
    }
}

/// Require the invocation to originate from a guild.
pub fn guild_only() -> FnCheck {
    FnCheck::new("guild_only", |ctx| ctx.guild_id.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{dm_context, test_context};

    #[tokio::test]
    async fn bool_false_normalizes_to_check_failure() {
        let check = FnCheck::new("never", |_| false);
        match check.run(&test_context()).await {
            CheckOutcome::Fail(CommandError::CheckFailure { check, .. }) => {
                assert_eq!(check, "never");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn guild_only_inspects_context() {
        assert!(guild_only().run(&test_context()).await.passed());
        assert!(!guild_only().run(&dm_context()).await.passed());
    }
}
