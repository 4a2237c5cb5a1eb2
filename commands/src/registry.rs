//! Command registry and name resolution.
//!
//! Lookups are case-insensitive over names and aliases. Resolution walks
//! the subcommand tree one token at a time; a token that matches no child
//! is left in the stream for the argument resolver.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::command::Command;
use crate::errors::CommandError;
use crate::view::StringView;

#[derive(Default)]
pub struct CommandRegistry {
    index: HashMap<String, Arc<Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root command under its name and every alias.
    pub fn register(&mut self, command: Arc<Command>) -> Result<(), CommandError> {
        let mut keys = vec![command.name.to_ascii_lowercase()];
        keys.extend(command.aliases.iter().map(|a| a.to_ascii_lowercase()));
        for key in &keys {
            if self.index.contains_key(key) {
                return Err(CommandError::ConfigError(format!(
                    "command name '{key}' is already registered"
                )));
            }
        }
        debug!("[Registry] registered '{}'", command.name);
        for key in keys {
            self.index.insert(key, Arc::clone(&command));
        }
        Ok(())
    }

    /// Remove a command and all of its aliases.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<Command>> {
        let command = self.index.remove(&name.to_ascii_lowercase())?;
        self.index.retain(|_, c| !Arc::ptr_eq(c, &command));
        Some(command)
    }

    pub fn find(&self, name: &str) -> Option<Arc<Command>> {
        self.index.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Command>> {
        self.index.values()
    }

    /// Consume the command path from `view`, descending into subcommands
    /// as long as the next token names a child. The view ends up
    /// positioned at the first argument token.
    pub fn resolve(&self, view: &mut StringView) -> Result<Arc<Command>, CommandError> {
        let first = match view.get_quoted_word()? {
            Some(token) => token,
            None => return Err(CommandError::CommandNotFound(String::new())),
        };
        let mut current = self
            .find(&first.text)
            .ok_or_else(|| CommandError::CommandNotFound(first.text.clone()))?;

        loop {
            view.skip_ws();
            let checkpoint = view.checkpoint();
            let next = match view.get_quoted_word() {
                Ok(Some(token)) => token,
                _ => {
                    view.rewind(checkpoint);
                    break;
                }
            };
            match current.child(&next.text) {
                Some(child) => current = child,
                None => {
                    view.rewind(checkpoint);
                    break;
                }
            }
        }
        Ok(current)
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry").field("commands", &self.index.len()).finish()
    }
}
