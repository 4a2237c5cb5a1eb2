//! Command model: parameters, options, and the builder that freezes them.
//!
//! A `Command` is assembled via `CommandBuilder` and immutable once
//! built: parameters, checks and hooks are declared up front and
//! validated in one place. Sub-commands are nested builders; the built
//! tree links children with `Arc` and parents with `Weak`.
use std::fmt;
use std::sync::{Arc, Weak};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use herald_core::Value;

use crate::checks::Check;
use crate::context::Context;
use crate::convert::ConverterSpec;
use crate::cooldowns::{BucketType, CooldownMapping, MaxConcurrency};
use crate::errors::CommandError;
use crate::router::ErrorHandler;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-command parsing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserOptions {
    /// Hand keyword-rest segments over verbatim, quoting uninterpreted.
    pub rest_is_raw: bool,
    /// Separator between a flag name and its value.
    pub flag_delimiter: char,
    pub case_insensitive_flags: bool,
    pub ignore_unknown_flags: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            rest_is_raw: false,
            flag_delimiter: ':',
            case_insensitive_flags: true,
            ignore_unknown_flags: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// One token.
    Positional,
    /// All remaining tokens, converted element-wise.
    Variadic,
    /// The whole raw remainder as a single segment.
    KeywordRest,
}

/// Fallback for a parameter with no token: a fixed value or a producer
/// evaluated against the invocation context.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Producer(Arc<dyn Fn(&Context) -> Value + Send + Sync>),
}

impl DefaultValue {
    pub(crate) fn resolve(&self, ctx: &Context) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Producer(f) => f(ctx),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => write!(f, "DefaultValue({v:?})"),
            DefaultValue::Producer(_) => write!(f, "DefaultValue(<producer>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub spec: ConverterSpec,
    pub default: Option<DefaultValue>,
}

impl Parameter {
    pub fn positional(name: impl Into<String>, spec: ConverterSpec) -> Self {
        Self { name: name.into(), kind: ParameterKind::Positional, spec, default: None }
    }

    pub fn variadic(name: impl Into<String>, spec: ConverterSpec) -> Self {
        Self { name: name.into(), kind: ParameterKind::Variadic, spec, default: None }
    }

    pub fn rest(name: impl Into<String>, spec: ConverterSpec) -> Self {
        Self { name: name.into(), kind: ParameterKind::KeywordRest, spec, default: None }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn with_default_producer(
        mut self,
        f: impl Fn(&Context) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(DefaultValue::Producer(Arc::new(f)));
        self
    }
}

// ---------------------------------------------------------------------------
// Callback and lifecycle hooks
// ---------------------------------------------------------------------------

/// The command body. Bound arguments are available on the context.
#[async_trait]
pub trait Callback: Send + Sync {
    async fn invoke(&self, ctx: &Context) -> Result<()>;
}

/// Synchronous callback adapter for simple bodies.
pub struct FnCallback<F> {
    f: F,
}

impl<F> FnCallback<F>
where
    F: Fn(&Context) -> Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Callback for FnCallback<F>
where
    F: Fn(&Context) -> Result<()> + Send + Sync,
{
    async fn invoke(&self, ctx: &Context) -> Result<()> {
        (self.f)(ctx)
    }
}

/// Before/after-invoke hook.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// Human-readable hook name for logging.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &Context) -> Result<()>;
}

/// Synchronous hook adapter.
pub struct FnHook {
    name: String,
    f: Box<dyn Fn(&Context) -> Result<()> + Send + Sync>,
}

impl FnHook {
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&Context) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), f: Box::new(f) }
    }
}

#[async_trait]
impl LifecycleHook for FnHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &Context) -> Result<()> {
        (self.f)(ctx)
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub params: Vec<Parameter>,
    pub options: ParserOptions,
    pub enabled: bool,
    pub(crate) callback: Arc<dyn Callback>,
    pub(crate) checks: Vec<Arc<dyn Check>>,
    pub(crate) before_invoke: Option<Arc<dyn LifecycleHook>>,
    pub(crate) after_invoke: Option<Arc<dyn LifecycleHook>>,
    pub(crate) error_handler: Option<Arc<dyn ErrorHandler>>,
    pub(crate) cooldown: Option<CooldownMapping>,
    pub(crate) max_concurrency: Option<MaxConcurrency>,
    pub(crate) parent: Option<Weak<Command>>,
    pub(crate) children: Vec<Arc<Command>>,
}

impl Command {
    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder::new(name)
    }

    /// Does `name` match this command's name or one of its aliases?
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn child(&self, name: &str) -> Option<Arc<Command>> {
        self.children.iter().find(|c| c.answers_to(name)).cloned()
    }

    /// Ancestor chain ordered root → immediate parent.
    pub fn ancestors(&self) -> Vec<Arc<Command>> {
        let mut chain = Vec::new();
        let mut cursor = self.parent.clone();
        while let Some(weak) = cursor {
            let Some(parent) = weak.upgrade() else { break };
            cursor = parent.parent.clone();
            chain.push(parent);
        }
        chain.reverse();
        chain
    }

    /// Fully qualified name, e.g. `"config set"`.
    pub fn qualified_name(&self) -> String {
        let mut parts: Vec<String> =
            self.ancestors().iter().map(|c| c.name.clone()).collect();
        parts.push(self.name.clone());
        parts.join(" ")
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("params", &self.params)
            .field("enabled", &self.enabled)
            .field("checks", &self.checks.len())
            .field("children", &self.children.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct CommandBuilder {
    name: String,
    aliases: Vec<String>,
    description: String,
    params: Vec<Parameter>,
    options: ParserOptions,
    enabled: bool,
    callback: Option<Arc<dyn Callback>>,
    checks: Vec<Arc<dyn Check>>,
    before_invoke: Option<Arc<dyn LifecycleHook>>,
    after_invoke: Option<Arc<dyn LifecycleHook>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    cooldown: Option<(u32, f64, BucketType)>,
    max_concurrency: Option<(u32, BucketType)>,
    children: Vec<CommandBuilder>,
}

impl CommandBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            params: Vec::new(),
            options: ParserOptions::default(),
            enabled: true,
            callback: None,
            checks: Vec::new(),
            before_invoke: None,
            after_invoke: None,
            error_handler: None,
            cooldown: None,
            max_concurrency: None,
            children: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn rest_is_raw(mut self) -> Self {
        self.options.rest_is_raw = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn callback(mut self, callback: impl Callback + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn check(mut self, check: impl Check + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn before_invoke(mut self, hook: impl LifecycleHook + 'static) -> Self {
        self.before_invoke = Some(Arc::new(hook));
        self
    }

    pub fn after_invoke(mut self, hook: impl LifecycleHook + 'static) -> Self {
        self.after_invoke = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn cooldown(mut self, rate: u32, per: f64, bucket: BucketType) -> Self {
        self.cooldown = Some((rate, per, bucket));
        self
    }

    /// Cap simultaneous in-flight invocations per bucket.
    pub fn max_concurrency(mut self, number: u32, bucket: BucketType) -> Self {
        self.max_concurrency = Some((number, bucket));
        self
    }

    pub fn subcommand(mut self, child: CommandBuilder) -> Self {
        self.children.push(child);
        self
    }

    /// Validate everything and freeze the command tree.
    pub fn build(mut self) -> Result<Arc<Command>, CommandError> {
        self.prepare()?;
        Ok(self.assemble(None))
    }

    /// Registration-time validation plus flag-matcher compilation,
    /// recursive over sub-commands.
    fn prepare(&mut self) -> Result<(), CommandError> {
        let cfg = |msg: String| Err(CommandError::ConfigError(msg));

        for name in std::iter::once(&self.name).chain(self.aliases.iter()) {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return cfg(format!("command name \"{name}\" is empty or contains whitespace"));
            }
        }
        if self.callback.is_none() {
            return cfg(format!("command \"{}\" has no callback", self.name));
        }
        if matches!(self.cooldown, Some((0, _, _))) {
            return cfg(format!("command \"{}\": cooldown rate must be at least 1", self.name));
        }
        if matches!(self.max_concurrency, Some((0, _))) {
            return cfg(format!(
                "command \"{}\": max concurrency must be at least 1",
                self.name
            ));
        }

        let last = self.params.len().saturating_sub(1);
        let mut has_variadic = false;
        let mut has_rest = false;
        for (i, param) in self.params.iter().enumerate() {
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return cfg(format!("duplicate parameter name \"{}\"", param.name));
            }
            match param.kind {
                ParameterKind::Positional => {}
                ParameterKind::Variadic => {
                    if i != last {
                        return cfg(format!(
                            "variadic parameter \"{}\" must be last",
                            param.name
                        ));
                    }
                    has_variadic = true;
                }
                ParameterKind::KeywordRest => {
                    if i != last {
                        return cfg(format!(
                            "keyword-rest parameter \"{}\" must be last",
                            param.name
                        ));
                    }
                    has_rest = true;
                }
            }

            if param.kind != ParameterKind::Positional {
                match &param.spec {
                    ConverterSpec::Optional { .. } => {
                        return cfg(format!(
                            "parameter \"{}\": optional is only valid on positional parameters",
                            param.name
                        ));
                    }
                    ConverterSpec::Greedy(_) if param.kind == ParameterKind::Variadic => {
                        return cfg(format!(
                            "parameter \"{}\": variadic element spec may not be greedy",
                            param.name
                        ));
                    }
                    _ => {}
                }
            }
            if param.kind != ParameterKind::KeywordRest {
                if let ConverterSpec::FlagGroup(_) = &param.spec {
                    return cfg(format!(
                        "parameter \"{}\": flag groups are only valid on keyword-rest parameters",
                        param.name
                    ));
                }
            }

            param.spec.validate(&param.name)?;
        }
        for param in self.params.iter_mut() {
            if let ConverterSpec::FlagGroup(group) = &mut param.spec {
                group.compile(&self.options)?;
            }
        }
        // Both can only be last, so this is reachable only via duplicates
        // of the same kind slipping through; keep the invariant explicit.
        if has_variadic && has_rest {
            return cfg(format!(
                "command \"{}\" cannot have both variadic and keyword-rest parameters",
                self.name
            ));
        }

        for (i, child) in self.children.iter().enumerate() {
            for other in &self.children[..i] {
                let clash = other.name.eq_ignore_ascii_case(&child.name)
                    || other.aliases.iter().any(|a| a.eq_ignore_ascii_case(&child.name))
                    || child.aliases.iter().any(|a| {
                        other.name.eq_ignore_ascii_case(a)
                            || other.aliases.iter().any(|b| b.eq_ignore_ascii_case(a))
                    });
                if clash {
                    return cfg(format!(
                        "duplicate sub-command name or alias under \"{}\": \"{}\"",
                        self.name, child.name
                    ));
                }
            }
        }
        for child in &mut self.children {
            child.prepare()?;
        }
        Ok(())
    }

    /// Infallible after `prepare`: build the Arc tree with parent links.
    fn assemble(self, parent: Option<Weak<Command>>) -> Arc<Command> {
        let callback = self
            .callback
            .unwrap_or_else(|| Arc::new(FnCallback::new(|_: &Context| Ok(()))));
        let cooldown = self
            .cooldown
            .map(|(rate, per, bucket)| CooldownMapping::new(rate, per, bucket));
        let max_concurrency = self
            .max_concurrency
            .map(|(number, bucket)| MaxConcurrency::new(number, bucket));
        Arc::new_cyclic(|weak| Command {
            name: self.name,
            aliases: self.aliases,
            description: self.description,
            params: self.params,
            options: self.options,
            enabled: self.enabled,
            callback,
            checks: self.checks,
            before_invoke: self.before_invoke,
            after_invoke: self.after_invoke,
            error_handler: self.error_handler,
            cooldown,
            max_concurrency,
            parent,
            children: self
                .children
                .into_iter()
                .map(|child| child.assemble(Some(weak.clone())))
                .collect(),
        })
    }
}
