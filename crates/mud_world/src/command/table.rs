//! Command definitions and keyed command tables.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::context::CommandContext;
use crate::command::parser::ParsedCommand;
use crate::error::{CommandError, WorldError};

pub type CommandResult = Result<(), CommandError>;

type Handler = dyn Fn(&mut CommandContext<'_>, &ParsedCommand) -> CommandResult + Send + Sync;

/// A named, aliased command.
#[derive(Clone)]
pub struct Command {
    name: String,
    aliases: Vec<String>,
    help: String,
    handler: Arc<Handler>,
}

impl Command {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut CommandContext<'_>, &ParsedCommand) -> CommandResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            help: String::new(),
            handler: Arc::new(handler),
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    #[must_use]
    pub fn help_text(&self) -> &str {
        &self.help
    }

    /// Run the handler.
    ///
    /// # Errors
    ///
    /// Whatever the handler returns.
    pub fn run(&self, ctx: &mut CommandContext<'_>, parsed: &ParsedCommand) -> CommandResult {
        (self.handler)(ctx, parsed)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

/// A set of commands where every name and alias is unique, ignoring case.
#[derive(Debug, Default)]
pub struct CommandTable {
    commands: Vec<Arc<Command>>,
    names: HashMap<String, usize>,
    aliases: HashMap<String, usize>,
}

impl CommandTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateCommand`] if the command's name or any
    /// alias is already a name or alias in this table, or repeats within the
    /// command itself. The table is unchanged on error.
    pub fn add(&mut self, command: Command) -> Result<(), WorldError> {
        let name = command.name.to_lowercase();
        let aliases: Vec<String> = command.aliases.iter().map(|a| a.to_lowercase()).collect();

        let mut seen: Vec<&str> = Vec::with_capacity(aliases.len() + 1);
        for key in std::iter::once(&name).chain(aliases.iter()) {
            if self.is_taken(key) || seen.contains(&key.as_str()) {
                return Err(WorldError::DuplicateCommand(key.clone()));
            }
            seen.push(key.as_str());
        }

        let index = self.commands.len();
        self.names.insert(name, index);
        for alias in aliases {
            self.aliases.insert(alias, index);
        }
        self.commands.push(Arc::new(command));
        Ok(())
    }

    fn is_taken(&self, key: &str) -> bool {
        self.names.contains_key(key) || self.aliases.contains_key(key)
    }

    /// Find the command for a parsed line: exact name first, then alias.
    #[must_use]
    pub fn lookup(&self, parsed: &ParsedCommand) -> Option<Arc<Command>> {
        self.get(&parsed.command_str)
    }

    /// Find a command by name or alias, ignoring case.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Command>> {
        let key = key.to_lowercase();
        self.names
            .get(&key)
            .or_else(|| self.aliases.get(&key))
            .and_then(|index| self.commands.get(*index))
            .cloned()
    }

    /// Commands in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Command>> {
        self.commands.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
