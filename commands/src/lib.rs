//! Text-command parsing and dispatch.
//!
//! Messages come in as raw text; this crate tokenizes them, resolves the
//! command path through a registry of subcommand trees, converts each
//! token against the command's declared parameters (with union
//! alternatives, optional backtracking, greedy capture and a `name:
//! value` flag grammar), gates the invocation behind checks and
//! cooldowns, and routes every failure through a single error router.

pub mod checks;
pub mod command;
pub mod context;
pub mod convert;
pub mod cooldowns;
pub mod errors;
pub mod flags;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod view;

#[cfg(test)]
pub(crate) mod testutil;

pub use checks::{guild_only, Check, CheckOutcome, FnCheck};
pub use command::{
    Callback, Command, CommandBuilder, FnCallback, FnHook, LifecycleHook, Parameter,
    ParameterKind, ParserOptions,
};
pub use context::Context;
pub use convert::{Converter, ConverterSpec, TargetType};
pub use cooldowns::{BucketType, Cooldown, CooldownMapping, MaxConcurrency};
pub use errors::CommandError;
pub use flags::{FlagGroupSpec, FlagSpec, Multiplicity, TupleArity};
pub use pipeline::{Dispatcher, InvocationReport, InvocationState};
pub use registry::CommandRegistry;
pub use router::{ErrorHandler, ErrorRouter, FnErrorHandler};
pub use view::{quote, StringView, Token};
