//! Commands everyone has.

use mud_entity::{Entity, EntityId};

use crate::command::context::{CommandContext, Outbound};
use crate::command::parser::{NOSPACE, ParsedCommand};
use crate::command::table::{Command, CommandResult, CommandTable};
use crate::error::{CommandError, WorldError};
use crate::store::EntityStore;

/// Add the global commands to `table`.
///
/// # Errors
///
/// Returns [`WorldError::DuplicateCommand`] if `table` already holds one of
/// the names.
pub fn register(table: &mut CommandTable) -> Result<(), WorldError> {
    table.add(Command::new("look", look).alias("l").help("look [target]"))?;
    table.add(Command::new("go", go).help("go <exit>"))?;
    table.add(Command::new("say", say).alias("'").help("say <text>"))?;
    table.add(Command::new("emote", emote).alias("pose").help("emote <text>"))?;
    table.add(Command::new("inventory", inventory).alias("i"))?;
    table.add(Command::new("who", who))?;
    table.add(Command::new("quit", quit))?;
    Ok(())
}

/// How `viewer` sees `target`: name, description and, unless `quiet`, what
/// it contains.
///
/// The internal description is used when the viewer is inside the target.
///
/// # Errors
///
/// Returns [`WorldError::NoSuchEntity`] if either entity is gone.
pub fn describe(
    store: &EntityStore,
    viewer: EntityId,
    target: EntityId,
    quiet: bool,
) -> Result<String, WorldError> {
    let me = store.get(viewer)?;
    let entity = store.get(target)?;
    let admin = me.admin;

    let mut lines = vec![label(entity, admin)];
    let description = if me.location() == Some(target) {
        entity
            .internal_description
            .as_deref()
            .unwrap_or(&entity.description)
    } else {
        &entity.description
    };
    if !description.is_empty() {
        lines.push(description.to_string());
    }
    if quiet {
        return Ok(lines.join("\n"));
    }

    let mut exits = Vec::new();
    let mut players = Vec::new();
    let mut things = Vec::new();
    for item in store.contents_of(target) {
        if item.id() == Some(viewer) {
            continue;
        }
        let name = label(item, admin);
        if item.kind().is_exit() {
            exits.push(name);
        } else if item.kind().is_player() {
            players.push(name);
        } else {
            things.push(name);
        }
    }
    if !exits.is_empty() {
        lines.push(format!("Exits: {}", exits.join(", ")));
    }
    if !players.is_empty() {
        lines.push(format!("Players: {}", players.join(", ")));
    }
    if !things.is_empty() {
        lines.push(format!("You see: {}", things.join(", ")));
    }
    Ok(lines.join("\n"))
}

/// The entity's name, with its id for admins.
#[must_use]
pub fn label(entity: &Entity, admin: bool) -> String {
    if admin {
        entity.display_with_id()
    } else {
        entity.name.clone()
    }
}

fn invoker_name(ctx: &CommandContext<'_>) -> Result<String, CommandError> {
    Ok(ctx.invoker_entity()?.name.clone())
}

fn look(ctx: &mut CommandContext<'_>, parsed: &ParsedCommand) -> CommandResult {
    let target = if parsed.arguments.is_empty() {
        ctx.location()
            .ok_or_else(|| CommandError::fail("You are nowhere."))?
    } else {
        ctx.resolve_or_fail(&parsed.args_text())?
    };
    let view = describe(&*ctx.store, ctx.invoker(), target, parsed.has_switch("quiet"))?;
    ctx.msg(view);
    Ok(())
}

fn go(ctx: &mut CommandContext<'_>, parsed: &ParsedCommand) -> CommandResult {
    if parsed.arguments.is_empty() {
        return Err(CommandError::fail("Go where?"));
    }
    let exit_id = ctx.resolve_or_fail(&parsed.args_text())?;
    let exit = ctx.store.get(exit_id)?;
    let here = ctx.location();
    if !exit.kind().is_exit() || exit.location() != here {
        return Err(CommandError::fail("You can't go that way."));
    }
    let exit_name = exit.name.clone();
    let destination = exit
        .destination
        .ok_or_else(|| CommandError::fail("That exit doesn't lead anywhere."))?;

    let me = ctx.invoker();
    let name = invoker_name(ctx)?;
    if let Some(here) = here {
        ctx.emit_to_contents(here, &format!("{name} leaves through {exit_name}."), &[me]);
    }
    ctx.store.move_to(me, Some(destination))?;
    ctx.emit_to_contents(destination, &format!("{name} arrives."), &[me]);

    let view = describe(&*ctx.store, me, destination, false)?;
    ctx.msg(view);
    Ok(())
}

fn say(ctx: &mut CommandContext<'_>, parsed: &ParsedCommand) -> CommandResult {
    if parsed.arguments.is_empty() {
        return Err(CommandError::fail("Say what?"));
    }
    let text = parsed.args_text();
    let name = invoker_name(ctx)?;
    ctx.msg(format!("You say, \"{text}\""));
    if let Some(here) = ctx.location() {
        let me = ctx.invoker();
        ctx.emit_to_contents(here, &format!("{name} says, \"{text}\""), &[me]);
    }
    Ok(())
}

fn emote(ctx: &mut CommandContext<'_>, parsed: &ParsedCommand) -> CommandResult {
    if parsed.arguments.is_empty() {
        return Err(CommandError::fail("Emote what?"));
    }
    let name = invoker_name(ctx)?;
    let text = parsed.args_text();
    let line = if parsed.has_switch(NOSPACE) {
        format!("{name}{text}")
    } else {
        format!("{name} {text}")
    };
    match ctx.location() {
        Some(here) => ctx.emit_to_contents(here, &line, &[]),
        None => ctx.msg(line),
    }
    Ok(())
}

fn inventory(ctx: &mut CommandContext<'_>, _parsed: &ParsedCommand) -> CommandResult {
    let admin = ctx.is_admin();
    let items: Vec<String> = ctx
        .store
        .contents_of(ctx.invoker())
        .into_iter()
        .map(|e| label(e, admin))
        .collect();
    if items.is_empty() {
        ctx.msg("You are not carrying anything.");
    } else {
        ctx.msg(format!("You are carrying:\n  {}", items.join("\n  ")));
    }
    Ok(())
}

fn who(ctx: &mut CommandContext<'_>, _parsed: &ParsedCommand) -> CommandResult {
    let admin = ctx.is_admin();
    let mut names: Vec<String> = ctx
        .connected()
        .iter()
        .filter_map(|id| ctx.store.get(*id).ok())
        .map(|e| label(e, admin))
        .collect();
    names.sort_by_key(|n| n.to_lowercase());
    let count = names.len();
    let noun = if count == 1 { "player" } else { "players" };
    ctx.msg(format!(
        "Players online:\n  {}\n{count} {noun} connected.",
        names.join("\n  ")
    ));
    Ok(())
}

fn quit(ctx: &mut CommandContext<'_>, _parsed: &ParsedCommand) -> CommandResult {
    ctx.msg("Goodbye.");
    let me = ctx.invoker();
    ctx.push(Outbound::Disconnect(me));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[tokio::test]
    async fn test_look_shows_room_and_contents() {
        let mut h = Harness::new().await;
        h.thing("brass lamp", h.hall).await;
        let lines = h.input(h.alice, "look");
        assert_eq!(lines.len(), 1);
        let view = &lines[0];
        assert!(view.starts_with("Great Hall\n"));
        assert!(view.contains("Exits: north"));
        assert!(view.contains("You see: brass lamp"));
        assert!(!view.contains("Alice"));
    }

    #[tokio::test]
    async fn test_look_inside_uses_internal_description() {
        let mut h = Harness::new().await;
        let hall = h.hall;
        h.store()
            .modify(hall, |e| e.internal_description = Some("Tapestries everywhere.".into()))
            .unwrap();
        let lines = h.input(h.alice, "l/quiet");
        assert_eq!(lines, vec!["Great Hall\nTapestries everywhere."]);
    }

    #[tokio::test]
    async fn test_exit_name_moves_player() {
        let mut h = Harness::new().await;
        h.connect(h.bob);
        let lines = h.input(h.alice, "north");
        assert_eq!(h.location_of(h.alice), Some(h.yard));
        assert!(lines.iter().any(|l| l.starts_with("Yard")));
        assert_eq!(h.lines_for(h.bob), vec!["Alice leaves through north."]);
    }

    #[tokio::test]
    async fn test_go_requires_an_exit_here() {
        let mut h = Harness::new().await;
        let lines = h.input(h.alice, "go me");
        assert_eq!(lines, vec!["You can't go that way."]);
        let lines = h.input(h.alice, "go");
        assert_eq!(lines, vec!["Go where?"]);
    }

    #[tokio::test]
    async fn test_say_reaches_connected_listeners() {
        let mut h = Harness::new().await;
        h.connect(h.bob);
        let lines = h.input(h.alice, "'hello there");
        assert_eq!(lines, vec!["You say, \"hello there\""]);
        assert_eq!(h.lines_for(h.bob), vec!["Alice says, \"hello there\""]);
    }

    #[tokio::test]
    async fn test_emote_nospace() {
        let mut h = Harness::new().await;
        let lines = h.input(h.alice, ";'s face is weird.");
        assert_eq!(lines, vec!["Alice's face is weird."]);
        let lines = h.input(h.alice, ":waves.");
        assert_eq!(lines, vec!["Alice waves."]);
    }

    #[tokio::test]
    async fn test_inventory_and_who() {
        let mut h = Harness::new().await;
        assert_eq!(h.input(h.alice, "i"), vec!["You are not carrying anything."]);
        h.thing("coin", h.alice).await;
        assert_eq!(h.input(h.alice, "inventory"), vec!["You are carrying:\n  coin"]);

        h.connect(h.bob);
        let lines = h.input(h.alice, "who");
        assert_eq!(lines, vec!["Players online:\n  Alice\n  Bob\n2 players connected."]);
    }

    #[tokio::test]
    async fn test_quit_disconnects() {
        let mut h = Harness::new().await;
        h.input(h.alice, "quit");
        assert!(h.outbound().contains(&Outbound::Disconnect(h.alice)));
    }
}
