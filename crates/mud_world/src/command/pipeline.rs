//! Input dispatch: parse, match exits, pick a command table, run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use mud_entity::EntityId;
use tracing::{debug, error};

use crate::command::context::CommandContext;
use crate::command::parser::{ParsedCommand, parse};
use crate::command::table::{Command, CommandTable};
use crate::error::CommandError;
use crate::store::EntityStore;

/// What the invoker sees when a handler fails unexpectedly.
pub const CRITICAL_ERROR: &str = "A critical error has occurred.";

/// The world-wide tables.
#[derive(Debug, Default)]
pub struct CommandTables {
    pub global: CommandTable,
    pub global_admin: CommandTable,
}

/// Outcome of [`handle_input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A command ran (successfully or not; failures were reported).
    Handled,
    /// Nothing matched; the caller decides what to say.
    NoMatch,
}

/// If the first word names an exit in the invoker's location, rewrite the
/// line as `go #<exit>`.
pub fn match_exit(store: &EntityStore, invoker: EntityId, parsed: &mut ParsedCommand) {
    if parsed.command_str.is_empty() {
        return;
    }
    let Some(here) = store.get(invoker).ok().and_then(|e| e.location()) else {
        return;
    };
    let exit = store
        .contents_of(here)
        .into_iter()
        .find(|e| e.kind().is_exit() && e.has_alias(&parsed.command_str))
        .and_then(|e| e.id());
    if let Some(exit) = exit {
        parsed.rewrite_as_go(exit);
    }
}

/// Pick the command for `parsed`, first hit wins:
///
/// 1. the location's local admin table (admins only),
/// 2. the location's local table,
/// 3. the global admin table (admins only),
/// 4. the global table.
#[must_use]
pub fn find_command(
    store: &EntityStore,
    tables: &CommandTables,
    invoker: EntityId,
    parsed: &ParsedCommand,
) -> Option<Arc<Command>> {
    let me = store.get(invoker).ok()?;
    let admin = me.admin;

    let local = me
        .location()
        .and_then(|here| store.get(here).ok())
        .and_then(|here| store.types().resolve(here.type_path()).ok());

    if let Some(def) = &local {
        if admin
            && let Some(found) = def
                .local_admin_commands()
                .and_then(|table| table.lookup(parsed))
        {
            return Some(found);
        }
        if let Some(found) = def.local_commands().and_then(|table| table.lookup(parsed)) {
            return Some(found);
        }
    }
    if admin && let Some(found) = tables.global_admin.lookup(parsed) {
        return Some(found);
    }
    tables.global.lookup(parsed)
}

/// Run one line of input as the context's invoker.
///
/// A [`CommandError::Fail`] is shown to the invoker verbatim. Any other error,
/// or a panic inside the handler, is logged and the invoker is told
/// [`CRITICAL_ERROR`].
pub fn handle_input(tables: &CommandTables, ctx: &mut CommandContext<'_>, text: &str) -> Dispatch {
    let invoker = ctx.invoker();
    let mut parsed = parse(text);
    match_exit(&*ctx.store, invoker, &mut parsed);

    let Some(command) = find_command(&*ctx.store, tables, invoker, &parsed) else {
        return Dispatch::NoMatch;
    };
    debug!(entity = %invoker, command = command.name(), "dispatching");

    match catch_unwind(AssertUnwindSafe(|| command.run(ctx, &parsed))) {
        Ok(Ok(())) => {}
        Ok(Err(CommandError::Fail(message))) => ctx.msg(message),
        Ok(Err(err)) => {
            error!(entity = %invoker, input = text, command = command.name(), error = %err, "command failed");
            ctx.msg(CRITICAL_ERROR);
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(entity = %invoker, input = text, command = command.name(), reason = %reason, "command panicked");
            ctx.msg(CRITICAL_ERROR);
        }
    }
    Dispatch::Handled
}
