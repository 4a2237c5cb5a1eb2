//! Argument resolver: walks declared parameters against the token
//! stream.
//!
//! The walk is strictly sequential over one cursor. The only
//! backtracking point is an Optional positional parameter, which rewinds
//! exactly one token when its inner converter rejects; Greedy similarly
//! leaves its first failing token unconsumed for the next parameter.
use tracing::debug;

use herald_core::{Arguments, Value};

use crate::command::{Command, Parameter, ParameterKind};
use crate::context::Context;
use crate::convert::{convert_one, ConverterSpec};
use crate::errors::CommandError;
use crate::flags::parse_flags;
use crate::view::StringView;

/// Bind every declared parameter of `command` from `view`, which is
/// positioned just past the command path.
pub async fn resolve_arguments(
    ctx: &Context,
    command: &Command,
    view: &mut StringView,
) -> Result<Arguments, CommandError> {
    let mut args = Arguments::new();
    let mut absorbed_tail = false;

    for param in &command.params {
        match param.kind {
            ParameterKind::Positional => {
                let value = resolve_positional(ctx, param, view).await?;
                args.bind(&param.name, value);
            }
            ParameterKind::Variadic => {
                absorbed_tail = true;
                let mut items = Vec::new();
                while let Some(token) = view.get_quoted_word()? {
                    items.push(convert_one(ctx, &param.spec, &param.name, &token.text).await?);
                }
                args.bind(&param.name, Value::List(items));
            }
            ParameterKind::KeywordRest => {
                absorbed_tail = true;
                let value = resolve_rest(ctx, command, param, view).await?;
                args.bind(&param.name, value);
            }
        }
    }

    if !absorbed_tail {
        view.skip_ws();
        if !view.eof() {
            return Err(CommandError::TooManyArguments { command: command.name.clone() });
        }
    }

    debug!("[Resolve] {}: bound {} argument(s)", command.name, args.len());
    Ok(args)
}

async fn resolve_positional(
    ctx: &Context,
    param: &Parameter,
    view: &mut StringView,
) -> Result<Value, CommandError> {
    match &param.spec {
        ConverterSpec::Optional { inner, default } => match &**inner {
            // Optional greedy: zero captures is fine, the default binds.
            ConverterSpec::Greedy(elem) => {
                let items = greedy_capture(ctx, elem, &param.name, view).await?;
                if items.is_empty() {
                    Ok(default.clone())
                } else {
                    Ok(Value::List(items))
                }
            }
            inner => {
                view.skip_ws();
                if view.eof() {
                    return Ok(default.clone());
                }
                let checkpoint = view.checkpoint();
                let Some(token) = view.get_quoted_word()? else {
                    return Ok(default.clone());
                };
                match convert_one(ctx, inner, &param.name, &token.text).await {
                    Ok(value) => Ok(value),
                    Err(_) => {
                        // Leave the token for the next parameter.
                        view.rewind(checkpoint);
                        Ok(default.clone())
                    }
                }
            }
        },
        ConverterSpec::Greedy(elem) => {
            let items = greedy_capture(ctx, elem, &param.name, view).await?;
            if items.is_empty() {
                fallback(ctx, param)
            } else {
                Ok(Value::List(items))
            }
        }
        spec => {
            view.skip_ws();
            if view.eof() {
                return fallback(ctx, param);
            }
            match view.get_quoted_word()? {
                Some(token) => convert_one(ctx, spec, &param.name, &token.text).await,
                None => fallback(ctx, param),
            }
        }
    }
}

/// Consume the longest prefix of tokens `elem` can convert. The first
/// failing token stays in the stream.
async fn greedy_capture(
    ctx: &Context,
    elem: &ConverterSpec,
    param: &str,
    view: &mut StringView,
) -> Result<Vec<Value>, CommandError> {
    let mut items = Vec::new();
    loop {
        view.skip_ws();
        if view.eof() {
            break;
        }
        let checkpoint = view.checkpoint();
        let Some(token) = view.get_quoted_word()? else {
            break;
        };
        match convert_one(ctx, elem, param, &token.text).await {
            Ok(value) => items.push(value),
            Err(_) => {
                view.rewind(checkpoint);
                break;
            }
        }
    }
    Ok(items)
}

async fn resolve_rest(
    ctx: &Context,
    command: &Command,
    param: &Parameter,
    view: &mut StringView,
) -> Result<Value, CommandError> {
    let rest = if command.options.rest_is_raw {
        view.read_rest()
    } else {
        view.read_rest().trim().to_string()
    };

    match &param.spec {
        ConverterSpec::FlagGroup(group) => {
            let map = parse_flags(ctx, &rest, group, command.options.rest_is_raw).await?;
            Ok(Value::Map(map))
        }
        spec => {
            if rest.is_empty() {
                fallback(ctx, param)
            } else {
                convert_one(ctx, spec, &param.name, &rest).await
            }
        }
    }
}

fn fallback(ctx: &Context, param: &Parameter) -> Result<Value, CommandError> {
    match &param.default {
        Some(default) => Ok(default.resolve(ctx)),
        None => Err(CommandError::MissingRequiredArgument(param.name.clone())),
    }
}
