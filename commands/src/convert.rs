//! Converter specs and token conversion.
//!
//! A `ConverterSpec` tree is built explicitly at registration time: the
//! mapping from declared type to spec variant is a finite, checked
//! table. Conversion itself is pure except for entity and custom
//! targets, which may consult the invocation context's cached state
//! (never a live lookup).
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use herald_core::{EntityId, Value};

use crate::context::Context;
use crate::errors::CommandError;
use crate::flags::FlagGroupSpec;

// ---------------------------------------------------------------------------
// Target types
// ---------------------------------------------------------------------------

/// The finite table of direct conversion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Str,
    Int,
    Float,
    Bool,
    Member,
    Channel,
    Role,
}

impl TargetType {
    pub fn label(&self) -> &'static str {
        match self {
            TargetType::Str => "str",
            TargetType::Int => "int",
            TargetType::Float => "float",
            TargetType::Bool => "bool",
            TargetType::Member => "member",
            TargetType::Channel => "channel",
            TargetType::Role => "role",
        }
    }

    /// `Str` accepts any token, so it can never fail.
    pub fn never_fails(&self) -> bool {
        matches!(self, TargetType::Str)
    }
}

// ---------------------------------------------------------------------------
// Custom converters
// ---------------------------------------------------------------------------

/// Injected converter collaborator: one method, token in, value out.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Human-readable converter name for logging and error messages.
    fn name(&self) -> &str;

    async fn convert(&self, ctx: &Context, raw: &str) -> Result<Value, CommandError>;
}

// ---------------------------------------------------------------------------
// Spec tree
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum ConverterSpec {
    Direct(TargetType),
    /// Candidates tried strictly left to right; first success wins.
    Union(Vec<ConverterSpec>),
    /// Attempt `inner` without consuming on failure; bind `default` then.
    Optional { inner: Box<ConverterSpec>, default: Value },
    /// Convert with `target`, then require membership in `allowed`.
    Literal { target: TargetType, allowed: Vec<Value> },
    /// Consume as many convertible tokens as possible.
    Greedy(Box<ConverterSpec>),
    /// Flag sub-grammar over a keyword-rest segment.
    FlagGroup(FlagGroupSpec),
    Custom(Arc<dyn Converter>),
}

impl fmt::Debug for ConverterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConverterSpec({})", self.describe())
    }
}

impl ConverterSpec {
    pub fn optional(inner: ConverterSpec, default: impl Into<Value>) -> Self {
        ConverterSpec::Optional { inner: Box::new(inner), default: default.into() }
    }

    pub fn greedy(inner: ConverterSpec) -> Self {
        ConverterSpec::Greedy(Box::new(inner))
    }

    pub fn literal(target: TargetType, allowed: Vec<Value>) -> Self {
        ConverterSpec::Literal { target, allowed }
    }

    /// Short description used in error messages and logs.
    pub fn describe(&self) -> String {
        match self {
            ConverterSpec::Direct(t) => t.label().to_string(),
            ConverterSpec::Union(specs) => {
                let parts: Vec<String> = specs.iter().map(|s| s.describe()).collect();
                format!("union[{}]", parts.join(", "))
            }
            ConverterSpec::Optional { inner, .. } => format!("optional[{}]", inner.describe()),
            ConverterSpec::Literal { allowed, .. } => {
                let parts: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                format!("literal[{}]", parts.join(", "))
            }
            ConverterSpec::Greedy(inner) => format!("greedy[{}]", inner.describe()),
            ConverterSpec::FlagGroup(_) => "flags".to_string(),
            ConverterSpec::Custom(c) => c.name().to_string(),
        }
    }

    /// Registration-time invariants, checked recursively when a command
    /// is finalized. `at` names the parameter for the error message.
    pub(crate) fn validate(&self, at: &str) -> Result<(), CommandError> {
        let reject_degenerate = |spec: &ConverterSpec, inside: &str| match spec {
            ConverterSpec::Optional { .. } => Err(CommandError::ConfigError(format!(
                "parameter \"{at}\": {inside} may not contain an optional converter"
            ))),
            ConverterSpec::Greedy(_) => Err(CommandError::ConfigError(format!(
                "parameter \"{at}\": {inside} may not contain a greedy converter"
            ))),
            ConverterSpec::Direct(t) if t.never_fails() => Err(CommandError::ConfigError(
                format!("parameter \"{at}\": {inside} may not contain the never-failing str type"),
            )),
            ConverterSpec::FlagGroup(_) => Err(CommandError::ConfigError(format!(
                "parameter \"{at}\": {inside} may not contain a flag group"
            ))),
            _ => Ok(()),
        };

        match self {
            ConverterSpec::Union(specs) => {
                if specs.is_empty() {
                    return Err(CommandError::ConfigError(format!(
                        "parameter \"{at}\": union has no candidates"
                    )));
                }
                for spec in specs {
                    reject_degenerate(spec, "a union")?;
                    spec.validate(at)?;
                }
                Ok(())
            }
            ConverterSpec::Greedy(inner) => {
                reject_degenerate(inner, "greedy")?;
                inner.validate(at)
            }
            ConverterSpec::Optional { inner, .. } => inner.validate(at),
            ConverterSpec::Literal { allowed, .. } => {
                if allowed.is_empty() {
                    return Err(CommandError::ConfigError(format!(
                        "parameter \"{at}\": literal has an empty allowed set"
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Accepted boolean spellings.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "t" | "1" | "enable" | "on" => Some(true),
        "no" | "n" | "false" | "f" | "0" | "disable" | "off" => Some(false),
        _ => None,
    }
}

/// Extract an id from mention syntax (`<@id>`, `<@!id>`, `<#id>`,
/// `<@&id>`) or a bare digit run.
fn mention_id(raw: &str, prefixes: &[&str]) -> Option<EntityId> {
    if let Ok(id) = raw.parse::<EntityId>() {
        return Some(id);
    }
    let inner = raw.strip_prefix('<')?.strip_suffix('>')?;
    for prefix in prefixes {
        if let Some(digits) = inner.strip_prefix(prefix) {
            return digits.parse::<EntityId>().ok();
        }
    }
    None
}

fn bad_argument(param: &str, expected: &str, given: &str) -> CommandError {
    CommandError::BadArgument {
        param: param.to_string(),
        expected: expected.to_string(),
        given: given.to_string(),
    }
}

async fn convert_direct(
    ctx: &Context,
    target: TargetType,
    param: &str,
    raw: &str,
) -> Result<Value, CommandError> {
    match target {
        TargetType::Str => Ok(Value::Str(raw.to_string())),
        TargetType::Int => raw
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| bad_argument(param, "int", raw)),
        TargetType::Float => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| bad_argument(param, "float", raw)),
        TargetType::Bool => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| bad_argument(param, "bool", raw)),
        TargetType::Member => {
            let found = match mention_id(raw, &["@!", "@"]) {
                Some(id) => ctx.resolver.member_by_id(id).await,
                None => ctx.resolver.member_by_name(raw).await,
            };
            found.map(Value::Member).ok_or_else(|| bad_argument(param, "member", raw))
        }
        TargetType::Channel => {
            let found = match mention_id(raw, &["#"]) {
                Some(id) => ctx.resolver.channel_by_id(id).await,
                None => ctx.resolver.channel_by_name(raw.trim_start_matches('#')).await,
            };
            found.map(Value::Channel).ok_or_else(|| bad_argument(param, "channel", raw))
        }
        TargetType::Role => {
            let found = match mention_id(raw, &["@&"]) {
                Some(id) => ctx.resolver.role_by_id(id).await,
                None => ctx.resolver.role_by_name(raw).await,
            };
            found.map(Value::Role).ok_or_else(|| bad_argument(param, "role", raw))
        }
    }
}

/// Convert a single token against a scalar spec. Structural specs
/// (`Optional`, `Greedy`, `FlagGroup`) are handled by the resolver and
/// are a configuration error here.
pub async fn convert_one(
    ctx: &Context,
    spec: &ConverterSpec,
    param: &str,
    raw: &str,
) -> Result<Value, CommandError> {
    match spec {
        ConverterSpec::Direct(target) => convert_direct(ctx, *target, param, raw).await,
        ConverterSpec::Literal { target, allowed } => {
            let value = convert_direct(ctx, *target, param, raw).await.map_err(|_| {
                CommandError::BadLiteralArgument {
                    param: param.to_string(),
                    given: raw.to_string(),
                    allowed: allowed.iter().map(|v| v.to_string()).collect(),
                }
            })?;
            if allowed.contains(&value) {
                Ok(value)
            } else {
                Err(CommandError::BadLiteralArgument {
                    param: param.to_string(),
                    given: raw.to_string(),
                    allowed: allowed.iter().map(|v| v.to_string()).collect(),
                })
            }
        }
        ConverterSpec::Union(candidates) => {
            let mut attempts = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                match Box::pin(convert_one(ctx, candidate, param, raw)).await {
                    Ok(value) => return Ok(value),
                    Err(err) => attempts.push((candidate.describe(), err.to_string())),
                }
            }
            Err(CommandError::BadUnionArgument {
                param: param.to_string(),
                given: raw.to_string(),
                attempts,
            })
        }
        ConverterSpec::Custom(converter) => converter.convert(ctx, raw).await,
        ConverterSpec::Optional { .. } | ConverterSpec::Greedy(_) | ConverterSpec::FlagGroup(_) => {
            Err(CommandError::ConfigError(format!(
                "parameter \"{param}\": {} cannot convert a single token",
                spec.describe()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;

    #[tokio::test]
    async fn direct_scalar_conversions() {
        let ctx = test_context();
        let int = ConverterSpec::Direct(TargetType::Int);
        assert_eq!(convert_one(&ctx, &int, "n", "42").await.unwrap(), Value::Int(42));
        assert_eq!(
            convert_one(&ctx, &int, "n", "nope").await.unwrap_err().kind(),
            "bad_argument"
        );

        let boolean = ConverterSpec::Direct(TargetType::Bool);
        assert_eq!(convert_one(&ctx, &boolean, "b", "on").await.unwrap(), Value::Bool(true));
        assert_eq!(convert_one(&ctx, &boolean, "b", "No").await.unwrap(), Value::Bool(false));
    }

    #[tokio::test]
    async fn member_by_mention_id_and_name() {
        let ctx = test_context();
        let member = ConverterSpec::Direct(TargetType::Member);
        for raw in ["<@1>", "<@!1>", "1", "alice"] {
            let value = convert_one(&ctx, &member, "who", raw).await.unwrap();
            assert_eq!(value.as_member().unwrap().name, "alice", "input {raw}");
        }
        assert_eq!(
            convert_one(&ctx, &member, "who", "nobody").await.unwrap_err().kind(),
            "bad_argument"
        );
    }

    #[tokio::test]
    async fn union_is_left_biased() {
        let ctx = test_context();
        // "1" converts as both int and member id; int is listed first.
        let spec = ConverterSpec::Union(vec![
            ConverterSpec::Direct(TargetType::Int),
            ConverterSpec::Direct(TargetType::Member),
        ]);
        assert_eq!(convert_one(&ctx, &spec, "x", "1").await.unwrap(), Value::Int(1));

        let reversed = ConverterSpec::Union(vec![
            ConverterSpec::Direct(TargetType::Member),
            ConverterSpec::Direct(TargetType::Int),
        ]);
        let value = convert_one(&ctx, &reversed, "x", "1").await.unwrap();
        assert_eq!(value.kind(), "member");
    }

    #[tokio::test]
    async fn union_failure_lists_attempts() {
        let ctx = test_context();
        let spec = ConverterSpec::Union(vec![
            ConverterSpec::Direct(TargetType::Int),
            ConverterSpec::Direct(TargetType::Member),
        ]);
        let err = convert_one(&ctx, &spec, "x", "zzz").await.unwrap_err();
        match err {
            CommandError::BadUnionArgument { attempts, .. } => {
                let names: Vec<&str> = attempts.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["int", "member"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn literal_membership() {
        let ctx = test_context();
        let spec = ConverterSpec::literal(
            TargetType::Str,
            vec![Value::from("buy"), Value::from("sell")],
        );
        assert_eq!(convert_one(&ctx, &spec, "side", "buy").await.unwrap(), Value::from("buy"));
        let err = convert_one(&ctx, &spec, "side", "hold").await.unwrap_err();
        assert_eq!(err.kind(), "bad_literal_argument");
        assert!(err.to_string().contains("buy, sell"));
    }

    #[test]
    fn validation_rejects_degenerate_nesting() {
        let optional_int =
            ConverterSpec::optional(ConverterSpec::Direct(TargetType::Int), Value::Int(0));

        let union = ConverterSpec::Union(vec![optional_int.clone()]);
        assert_eq!(union.validate("p").unwrap_err().kind(), "config_error");

        let greedy_str = ConverterSpec::greedy(ConverterSpec::Direct(TargetType::Str));
        assert_eq!(greedy_str.validate("p").unwrap_err().kind(), "config_error");

        let greedy_greedy =
            ConverterSpec::greedy(ConverterSpec::greedy(ConverterSpec::Direct(TargetType::Int)));
        assert_eq!(greedy_greedy.validate("p").unwrap_err().kind(), "config_error");

        let fine = ConverterSpec::greedy(ConverterSpec::Direct(TargetType::Int));
        assert!(fine.validate("p").is_ok());
    }
}
