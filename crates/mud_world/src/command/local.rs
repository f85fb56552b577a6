//! Command tables attached to particular entity types.

use mud_entity::Entity;

use crate::command::builtin::label;
use crate::command::context::CommandContext;
use crate::command::parser::ParsedCommand;
use crate::command::table::{Command, CommandResult, CommandTable};
use crate::error::{CommandError, WorldError};

/// `status` for anyone on a bridge.
///
/// # Errors
///
/// Returns [`WorldError::DuplicateCommand`] on a name clash.
pub fn bridge_commands() -> Result<CommandTable, WorldError> {
    let mut table = CommandTable::new();
    table.add(Command::new("status", bridge_status).help("status"))?;
    Ok(table)
}

/// Admin `status` on a bridge, with crew and raw attributes.
///
/// # Errors
///
/// Returns [`WorldError::DuplicateCommand`] on a name clash.
pub fn bridge_admin_commands() -> Result<CommandTable, WorldError> {
    let mut table = CommandTable::new();
    table.add(Command::new("status", bridge_status_admin).help("status"))?;
    Ok(table)
}

/// `berths` inside a hangar.
///
/// # Errors
///
/// Returns [`WorldError::DuplicateCommand`] on a name clash.
pub fn hangar_commands() -> Result<CommandTable, WorldError> {
    let mut table = CommandTable::new();
    table.add(Command::new("berths", berths).alias("docked"))?;
    Ok(table)
}

fn here<'c>(ctx: &'c CommandContext<'_>) -> Result<&'c Entity, CommandError> {
    let id = ctx
        .location()
        .ok_or_else(|| CommandError::fail("You are nowhere."))?;
    Ok(ctx.store.get(id)?)
}

/// The bridge's ship is its zone master, if any.
fn ship_name(ctx: &CommandContext<'_>, bridge: &Entity) -> String {
    bridge
        .zone
        .and_then(|ship| ctx.store.get(ship).ok())
        .map_or_else(|| bridge.name.clone(), |ship| ship.name.clone())
}

fn bridge_status(ctx: &mut CommandContext<'_>, _parsed: &ParsedCommand) -> CommandResult {
    let bridge = here(ctx)?;
    let line = format!("{}: all stations report ready.", ship_name(ctx, bridge));
    ctx.msg(line);
    Ok(())
}

fn bridge_status_admin(ctx: &mut CommandContext<'_>, _parsed: &ParsedCommand) -> CommandResult {
    let bridge = here(ctx)?;
    let Some(bridge_id) = bridge.id() else {
        return Err(CommandError::fail("This bridge has not been saved."));
    };
    let crew = ctx
        .store
        .contents_of(bridge_id)
        .into_iter()
        .filter(|e| e.kind().is_player())
        .count();

    let mut lines = vec![
        format!("{}: all stations report ready.", ship_name(ctx, bridge)),
        format!("Bridge {} crew aboard: {crew}", bridge.display_with_id()),
    ];
    for (key, value) in &bridge.attributes {
        lines.push(format!("  {key} = {value}"));
    }
    let text = lines.join("\n");
    ctx.msg(text);
    Ok(())
}

fn berths(ctx: &mut CommandContext<'_>, _parsed: &ParsedCommand) -> CommandResult {
    let hangar = here(ctx)?;
    if !hangar.kind().docks_vessels() {
        return Err(CommandError::fail("There are no berths here."));
    }
    let Some(hangar_id) = hangar.id() else {
        return Err(CommandError::fail("There are no berths here."));
    };
    let admin = ctx.is_admin();
    let vessels: Vec<String> = ctx
        .store
        .contents_of(hangar_id)
        .into_iter()
        .filter(|e| e.kind().is_vessel())
        .map(|e| label(e, admin))
        .collect();

    let text = if vessels.is_empty() {
        "No vessels are berthed here.".to_string()
    } else {
        format!("Berthed vessels:\n  {}", vessels.join("\n  "))
    };
    ctx.msg(text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use mud_entity::Attributes;

    use crate::testing::Harness;
    use crate::types::{BRIDGE, HANGAR, SHIP};

    #[tokio::test]
    async fn test_bridge_status_local_and_admin_override() {
        let mut h = Harness::new().await;
        let ship = h.create(SHIP, "Nimbus", Attributes::new()).await;
        let bridge = h.create(BRIDGE, "Bridge", Attributes::new()).await;
        h.store().modify(bridge, |e| e.zone = Some(ship)).unwrap();
        let alice = h.alice;
        h.store().move_to(alice, Some(bridge)).unwrap();

        assert_eq!(
            h.input(alice, "status"),
            vec!["Nimbus: all stations report ready."]
        );

        h.make_admin(alice);
        let lines = h.input(alice, "status");
        assert!(lines[0].contains("crew aboard: 1"));
    }

    #[tokio::test]
    async fn test_status_unknown_outside_bridge() {
        let mut h = Harness::new().await;
        assert_eq!(h.input(h.alice, "status"), vec![crate::world::NO_MATCH]);
    }

    #[tokio::test]
    async fn test_hangar_lists_berthed_vessels() {
        let mut h = Harness::new().await;
        let hangar = h.create(HANGAR, "Bay 7", Attributes::new()).await;
        let ship = h.create(SHIP, "Nimbus", Attributes::new()).await;
        let alice = h.alice;
        h.store().move_to(ship, Some(hangar)).unwrap();
        h.store().move_to(alice, Some(hangar)).unwrap();

        assert_eq!(h.input(alice, "berths"), vec!["Berthed vessels:\n  Nimbus"]);
        h.store().move_to(ship, None).unwrap();
        assert_eq!(h.input(alice, "docked"), vec!["No vessels are berthed here."]);
    }
}
