//! Error taxonomy for the command pipeline.
//!
//! Every failure an invocation can produce is one variant of
//! `CommandError`, so handlers can match broadly or narrowly. No variant
//! is fatal to the process; each is scoped to a single invocation.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    /// A direct converter rejected its token.
    #[error("bad argument for \"{param}\": expected {expected}, got \"{given}\"")]
    BadArgument {
        param: String,
        expected: String,
        given: String,
    },

    /// Every candidate of a union failed. `attempts` keeps the ordered
    /// (candidate, failure) pairs for diagnostics.
    #[error("no candidate for \"{param}\" could convert \"{given}\"")]
    BadUnionArgument {
        param: String,
        given: String,
        attempts: Vec<(String, String)>,
    },

    /// Converted value is not in the allowed literal set.
    #[error("\"{given}\" is not a valid choice for \"{param}\" (allowed: {})", allowed.join(", "))]
    BadLiteralArgument {
        param: String,
        given: String,
        allowed: Vec<String>,
    },

    #[error("missing required argument: {0}")]
    MissingRequiredArgument(String),

    #[error("too many arguments passed to \"{command}\"")]
    TooManyArguments { command: String },

    /// The tokenizer could not find a closing quote.
    #[error("unterminated quoted string starting at \"{fragment}\"")]
    UnexpectedQuote { fragment: String },

    #[error("unknown flag: \"{0}\"")]
    UnknownFlag(String),

    #[error("missing required flag: \"{0}\"")]
    MissingRequiredFlag(String),

    /// A recognized flag token with no value tokens after it.
    #[error("flag \"{0}\" was given no value")]
    MissingFlagValue(String),

    #[error("flag \"{flag}\" expects {expected} values, got {got}")]
    TupleArityMismatch {
        flag: String,
        expected: usize,
        got: usize,
    },

    /// A check returned false or raised. Never wrapped further.
    #[error("check \"{check}\" failed: {reason}")]
    CheckFailure { check: String, reason: String },

    #[error("command is on cooldown, retry in {retry_after:.2}s")]
    CommandOnCooldown { retry_after: f64 },

    #[error("too many concurrent uses of this command (limit {limit})")]
    MaxConcurrencyReached { limit: u32 },

    #[error("command not found: \"{0}\"")]
    CommandNotFound(String),

    #[error("command \"{0}\" is disabled")]
    DisabledCommand(String),

    /// The command body itself raised. Always preserves the cause.
    #[error("command \"{command}\" raised an error")]
    CommandInvokeError {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    /// Registration-time invariant violation.
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CommandError {
    /// Stable kind label for logging and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::BadArgument { .. } => "bad_argument",
            CommandError::BadUnionArgument { .. } => "bad_union_argument",
            CommandError::BadLiteralArgument { .. } => "bad_literal_argument",
            CommandError::MissingRequiredArgument(_) => "missing_required_argument",
            CommandError::TooManyArguments { .. } => "too_many_arguments",
            CommandError::UnexpectedQuote { .. } => "unexpected_quote",
            CommandError::UnknownFlag(_) => "unknown_flag",
            CommandError::MissingRequiredFlag(_) => "missing_required_flag",
            CommandError::MissingFlagValue(_) => "missing_flag_value",
            CommandError::TupleArityMismatch { .. } => "tuple_arity_mismatch",
            CommandError::CheckFailure { .. } => "check_failure",
            CommandError::CommandOnCooldown { .. } => "command_on_cooldown",
            CommandError::MaxConcurrencyReached { .. } => "max_concurrency_reached",
            CommandError::CommandNotFound(_) => "command_not_found",
            CommandError::DisabledCommand(_) => "disabled_command",
            CommandError::CommandInvokeError { .. } => "command_invoke_error",
            CommandError::ConfigError(_) => "config_error",
            CommandError::Other(_) => "other",
        }
    }

    /// True for failures caused by what the user typed, as opposed to
    /// broken registration or a failing command body.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            CommandError::CommandInvokeError { .. }
                | CommandError::ConfigError(_)
                | CommandError::Other(_)
        )
    }
}
