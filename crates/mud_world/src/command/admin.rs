//! Admin-only commands.

use crate::command::builtin::{describe, label};
use crate::command::context::{CommandContext, Outbound};
use crate::command::parser::ParsedCommand;
use crate::command::table::{Command, CommandResult, CommandTable};
use crate::error::{CommandError, WorldError};

pub const SHUTDOWN_NOTICE: &str = "The world is shutting down.";

/// Add the admin commands to `table`.
///
/// # Errors
///
/// Returns [`WorldError::DuplicateCommand`] on a name clash.
pub fn register(table: &mut CommandTable) -> Result<(), WorldError> {
    table.add(
        Command::new("@teleport", teleport)
            .alias("@tel")
            .help("@teleport [<target>=]<destination>"),
    )?;
    table.add(Command::new("@destroy", destroy).help("@destroy[/cascade] <target>"))?;
    table.add(Command::new("@examine", examine).alias("@ex"))?;
    table.add(Command::new("@shutdown", shutdown))?;
    table.add(Command::new("@restart", restart))?;
    Ok(())
}

fn teleport(ctx: &mut CommandContext<'_>, parsed: &ParsedCommand) -> CommandResult {
    let args = parsed.args_text();
    let (target, destination) = match args.split_once('=') {
        Some((target, destination)) => (
            ctx.resolve_or_fail(target.trim())?,
            ctx.resolve_or_fail(destination.trim())?,
        ),
        None if !args.is_empty() => (ctx.invoker(), ctx.resolve_or_fail(&args)?),
        None => return Err(CommandError::fail("Teleport where?")),
    };

    let moving = ctx.store.get(target)?;
    if moving.kind().is_room() {
        return Err(CommandError::fail("Rooms cannot be moved."));
    }
    let name = moving.name.clone();
    let origin = moving.location();

    match ctx.store.move_to(target, Some(destination)) {
        Err(WorldError::SelfContainment(_)) => {
            return Err(CommandError::fail("Nothing can be put inside itself."));
        }
        moved => moved?,
    }
    if let Some(origin) = origin {
        ctx.emit_to_contents(origin, &format!("{name} vanishes."), &[target]);
    }
    ctx.emit_to_contents(destination, &format!("{name} appears."), &[target]);

    let admin = ctx.is_admin();
    let where_to = label(ctx.store.get(destination)?, admin);
    if target != ctx.invoker() {
        ctx.msg(format!("Teleported {name} to {where_to}."));
    }
    if ctx.store.get(target)?.kind().is_player() {
        let view = describe(&*ctx.store, target, destination, false)?;
        ctx.emit(target, view);
    }
    Ok(())
}

fn destroy(ctx: &mut CommandContext<'_>, parsed: &ParsedCommand) -> CommandResult {
    if parsed.arguments.is_empty() {
        return Err(CommandError::fail("Destroy what?"));
    }
    let target = ctx.resolve_or_fail(&parsed.args_text())?;
    if target == ctx.invoker() {
        return Err(CommandError::fail("You can't destroy yourself."));
    }
    let name = label(ctx.store.get(target)?, true);
    if ctx.is_connected(target) {
        return Err(CommandError::fail(format!(
            "{name} is connected; disconnect them first."
        )));
    }

    match ctx.store.destroy_staged(target, parsed.has_switch("cascade")) {
        Ok(removed) => {
            let extra = removed.len().saturating_sub(1);
            if extra > 0 {
                ctx.msg(format!("Destroyed {name} and {extra} linked exit(s)."));
            } else {
                ctx.msg(format!("Destroyed {name}."));
            }
            Ok(())
        }
        Err(WorldError::ZoneNotEmpty { members, .. }) => Err(CommandError::fail(format!(
            "{name} is the zone master of {members} entities. Use @destroy/cascade to clear them."
        ))),
        Err(err) => Err(err.into()),
    }
}

fn examine(ctx: &mut CommandContext<'_>, parsed: &ParsedCommand) -> CommandResult {
    let target = if parsed.arguments.is_empty() {
        ctx.invoker()
    } else {
        ctx.resolve_or_fail(&parsed.args_text())?
    };
    let entity = ctx.store.get(target)?;
    let reference = |id: Option<mud_entity::EntityId>| match id {
        Some(id) => ctx
            .store
            .get(id)
            .map_or_else(|_| id.to_string(), mud_entity::Entity::display_with_id),
        None => "-".to_string(),
    };

    let mut lines = vec![
        entity.display_with_id(),
        format!("Type: {} ({})", entity.type_path(), entity.kind()),
        format!("Location: {}", reference(entity.location())),
        format!("Zone: {}", reference(entity.zone)),
    ];
    if entity.kind().is_exit() {
        lines.push(format!("Destination: {}", reference(entity.destination)));
    }
    if !entity.aliases.is_empty() {
        lines.push(format!("Aliases: {}", entity.aliases.join(", ")));
    }
    if entity.admin {
        lines.push("Admin: yes".to_string());
    }
    lines.push(format!("Description: {}", entity.description));
    if let Some(inside) = &entity.internal_description {
        lines.push(format!("Inside: {inside}"));
    }
    for (key, value) in &entity.attributes {
        lines.push(format!("  {key} = {value}"));
    }
    let text = lines.join("\n");
    ctx.msg(text);
    Ok(())
}

fn shutdown(ctx: &mut CommandContext<'_>, _parsed: &ParsedCommand) -> CommandResult {
    let everyone: Vec<_> = ctx.connected().iter().copied().collect();
    for entity in everyone {
        ctx.emit(entity, SHUTDOWN_NOTICE);
    }
    ctx.push(Outbound::Shutdown);
    Ok(())
}

fn restart(ctx: &mut CommandContext<'_>, _parsed: &ParsedCommand) -> CommandResult {
    ctx.msg("Asking the proxy to restart.");
    ctx.push(Outbound::RestartProxy);
    Ok(())
}
