//! Flag sub-grammar: `name: value` pairs parsed out of a keyword-rest
//! segment.
//!
//! The matcher regex over declared names and aliases is compiled once
//! when the owning command is finalized, so parsing is a single pass
//! over quote-aware tokens: a run of value tokens extends up to the next
//! recognized flag token or end of input. Quoted tokens are never flag
//! candidates, so quoting a value escapes flag recognition.
use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use tracing::debug;

use herald_core::Value;

use crate::command::ParserOptions;
use crate::context::Context;
use crate::convert::{convert_one, ConverterSpec};
use crate::errors::CommandError;
use crate::view::{StringView, Token};

// ---------------------------------------------------------------------------
// Flag specs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleArity {
    Fixed(usize),
    Variadic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// Last occurrence wins; earlier ones are silently discarded.
    Single,
    /// Every occurrence converted independently, input order preserved.
    List,
    /// One occurrence whose value run is split into sub-tokens.
    Tuple(TupleArity),
    /// Key/value pairs merged into a map, last-write-wins.
    Dict,
}

#[derive(Debug, Clone)]
pub struct FlagSpec {
    pub name: String,
    pub aliases: Vec<String>,
    pub value: ConverterSpec,
    pub default: Option<Value>,
    pub multiplicity: Multiplicity,
    pub required: bool,
}

impl FlagSpec {
    pub fn new(name: impl Into<String>, value: ConverterSpec) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            value,
            default: None,
            multiplicity: Multiplicity::Single,
            required: false,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn list(mut self) -> Self {
        self.multiplicity = Multiplicity::List;
        self
    }

    pub fn tuple(mut self, arity: TupleArity) -> Self {
        self.multiplicity = Multiplicity::Tuple(arity);
        self
    }

    pub fn dict(mut self) -> Self {
        self.multiplicity = Multiplicity::Dict;
        self
    }
}

// ---------------------------------------------------------------------------
// Group spec + compiled matcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FlagGroupSpec {
    pub flags: Vec<FlagSpec>,
    matcher: Option<FlagMatcher>,
}

#[derive(Debug, Clone)]
struct FlagMatcher {
    /// `^(name|alias|...)<delim>(rest)$` over a single unquoted token.
    known: Regex,
    /// Generic flag shape, used to spot unknown flags.
    shape: Regex,
    /// Matched name (folded if case-insensitive) → flag index.
    index: HashMap<String, usize>,
    case_insensitive: bool,
    ignore_unknown: bool,
}

impl FlagGroupSpec {
    pub fn new(flags: Vec<FlagSpec>) -> Self {
        Self { flags, matcher: None }
    }

    /// Validate the group and build the token matcher. Called by
    /// `CommandBuilder::build` with the owning command's options.
    pub(crate) fn compile(&mut self, options: &ParserOptions) -> Result<(), CommandError> {
        if self.flags.is_empty() {
            return Err(CommandError::ConfigError("flag group has no flags".into()));
        }

        let fold = |name: &str| {
            if options.case_insensitive_flags {
                name.to_lowercase()
            } else {
                name.to_string()
            }
        };

        let mut index = HashMap::new();
        let mut alternates = Vec::new();
        for (i, flag) in self.flags.iter().enumerate() {
            match &flag.value {
                ConverterSpec::Optional { .. }
                | ConverterSpec::Greedy(_)
                | ConverterSpec::FlagGroup(_) => {
                    return Err(CommandError::ConfigError(format!(
                        "flag \"{}\": value spec must be a scalar converter",
                        flag.name
                    )));
                }
                other => other.validate(&flag.name)?,
            }
            for name in std::iter::once(&flag.name).chain(flag.aliases.iter()) {
                if name.is_empty() || name.contains(char::is_whitespace) {
                    return Err(CommandError::ConfigError(format!(
                        "flag name \"{name}\" is empty or contains whitespace"
                    )));
                }
                if index.insert(fold(name), i).is_some() {
                    return Err(CommandError::ConfigError(format!(
                        "duplicate flag name or alias: \"{name}\""
                    )));
                }
                alternates.push(regex::escape(name));
            }
        }

        let flag_prefix = if options.case_insensitive_flags { "(?i)" } else { "" };
        let delim = regex::escape(&options.flag_delimiter.to_string());
        let known = Regex::new(&format!(
            "{flag_prefix}^({}){delim}(.*)$",
            alternates.join("|")
        ))
        .map_err(|e| CommandError::ConfigError(format!("flag pattern: {e}")))?;
        let shape = Regex::new(&format!(r"^([A-Za-z0-9_\-]+){delim}(.*)$"))
            .map_err(|e| CommandError::ConfigError(format!("flag shape pattern: {e}")))?;

        self.matcher = Some(FlagMatcher {
            known,
            shape,
            index,
            case_insensitive: options.case_insensitive_flags,
            ignore_unknown: options.ignore_unknown_flags,
        });
        Ok(())
    }
}

impl FlagMatcher {
    /// If `token` starts a declared flag, return its index and any
    /// inline value text after the delimiter.
    fn match_known(&self, token: &Token) -> Option<(usize, Option<String>)> {
        if token.was_quoted {
            return None;
        }
        let caps = self.known.captures(&token.text)?;
        let mut name = caps[1].to_string();
        if self.case_insensitive {
            name = name.to_lowercase();
        }
        let idx = *self.index.get(&name)?;
        let rest = caps[2].to_string();
        Some((idx, (!rest.is_empty()).then_some(rest)))
    }

    /// A bare `word:` token that names no declared flag. Tokens with
    /// trailing text after the delimiter (URLs, timestamps) stay value
    /// text.
    fn match_unknown(&self, token: &Token) -> Option<String> {
        if token.was_quoted {
            return None;
        }
        let caps = self.shape.captures(&token.text)?;
        if !caps[2].is_empty() {
            return None;
        }
        Some(caps[1].to_string())
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// One flag occurrence: which flag, and the value tokens of its run.
struct Occurrence {
    flag: usize,
    values: Vec<Token>,
}

/// Parse a keyword-rest segment against a compiled flag group. With
/// `raw` set, quoting is not interpreted (the `rest_is_raw` path).
pub async fn parse_flags(
    ctx: &Context,
    text: &str,
    group: &FlagGroupSpec,
    raw: bool,
) -> Result<BTreeMap<String, Value>, CommandError> {
    let matcher = group
        .matcher
        .as_ref()
        .ok_or_else(|| CommandError::ConfigError("flag group was never compiled".into()))?;

    let tokens: Vec<Token> = if raw {
        text.split_whitespace()
            .map(|w| Token { text: w.to_string(), was_quoted: false })
            .collect()
    } else {
        StringView::new(text).collect_words()?
    };

    // Partition tokens into flag occurrences.
    let mut occurrences: Vec<Occurrence> = Vec::new();
    for token in tokens {
        if let Some((flag, inline)) = matcher.match_known(&token) {
            let mut occ = Occurrence { flag, values: Vec::new() };
            if let Some(inline) = inline {
                occ.values.push(Token { text: inline, was_quoted: token.was_quoted });
            }
            occurrences.push(occ);
            continue;
        }
        match occurrences.last_mut() {
            Some(occ) => {
                if let Some(name) = matcher.match_unknown(&token) {
                    if !matcher.ignore_unknown {
                        return Err(CommandError::UnknownFlag(name));
                    }
                }
                occ.values.push(token);
            }
            None => {
                // Text before the first recognized flag.
                if matcher.ignore_unknown {
                    continue;
                }
                let name = matcher.match_unknown(&token).unwrap_or(token.text);
                return Err(CommandError::UnknownFlag(name));
            }
        }
    }

    debug!(
        "[Flags] {} occurrence(s) across {} declared flag(s)",
        occurrences.len(),
        group.flags.len()
    );

    // Convert per declared flag.
    let mut out = BTreeMap::new();
    for (i, flag) in group.flags.iter().enumerate() {
        let runs: Vec<&Occurrence> = occurrences.iter().filter(|o| o.flag == i).collect();
        if runs.is_empty() {
            if flag.required {
                return Err(CommandError::MissingRequiredFlag(flag.name.clone()));
            }
            out.insert(
                flag.name.clone(),
                flag.default.clone().unwrap_or(Value::None),
            );
            continue;
        }
        // A flag token followed by no value tokens at all.
        if runs.iter().any(|run| run.values.is_empty()) {
            return Err(CommandError::MissingFlagValue(flag.name.clone()));
        }

        let value = match flag.multiplicity {
            Multiplicity::Single => {
                let run = runs.last().expect("non-empty runs");
                convert_one(ctx, &flag.value, &flag.name, &joined(run)).await?
            }
            Multiplicity::List => {
                let mut items = Vec::with_capacity(runs.len());
                for run in &runs {
                    items.push(convert_one(ctx, &flag.value, &flag.name, &joined(run)).await?);
                }
                Value::List(items)
            }
            Multiplicity::Tuple(arity) => {
                let run = runs.last().expect("non-empty runs");
                if let TupleArity::Fixed(expected) = arity {
                    if run.values.len() != expected {
                        return Err(CommandError::TupleArityMismatch {
                            flag: flag.name.clone(),
                            expected,
                            got: run.values.len(),
                        });
                    }
                }
                let mut items = Vec::with_capacity(run.values.len());
                for token in &run.values {
                    items.push(convert_one(ctx, &flag.value, &flag.name, &token.text).await?);
                }
                Value::List(items)
            }
            Multiplicity::Dict => {
                let mut map = BTreeMap::new();
                for run in &runs {
                    if run.values.len() != 2 {
                        return Err(CommandError::TupleArityMismatch {
                            flag: flag.name.clone(),
                            expected: 2,
                            got: run.values.len(),
                        });
                    }
                    let key = run.values[0].text.clone();
                    let value =
                        convert_one(ctx, &flag.value, &flag.name, &run.values[1].text).await?;
                    map.insert(key, value);
                }
                Value::Map(map)
            }
        };
        out.insert(flag.name.clone(), value);
    }

    Ok(out)
}

/// A run's tokens joined back into a single scalar value.
fn joined(occ: &Occurrence) -> String {
    let parts: Vec<&str> = occ.values.iter().map(|t| t.text.as_str()).collect();
    parts.join(" ")
}
