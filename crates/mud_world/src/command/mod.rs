//! Command pipeline.
//!
//! A line of input flows through [`parser`] into a [`ParsedCommand`], may be
//! rewritten into `go` if it names an exit, and is then dispatched to the
//! first matching [`Command`] across the local and global tables (see
//! [`pipeline::find_command`]). Handlers only touch the world through a
//! [`CommandContext`].

pub mod admin;
pub mod builtin;
pub mod context;
pub mod local;
pub mod parser;
pub mod pipeline;
pub mod resolve;
pub mod table;

pub use context::{CommandContext, Outbound};
pub use parser::{ParsedCommand, parse};
pub use pipeline::{CommandTables, Dispatch, handle_input};
pub use table::{Command, CommandResult, CommandTable};

use crate::error::WorldError;

/// The global and global-admin tables with every built-in command.
///
/// # Errors
///
/// Returns [`WorldError::DuplicateCommand`] if two built-ins collide.
pub fn default_tables() -> Result<CommandTables, WorldError> {
    let mut tables = CommandTables::default();
    builtin::register(&mut tables.global)?;
    admin::register(&mut tables.global_admin)?;
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables_build() {
        let tables = default_tables().unwrap();
        assert!(tables.global.get("l").is_some());
        assert!(tables.global.get("@tel").is_none());
        assert_eq!(tables.global_admin.get("@tel").unwrap().name(), "@teleport");
    }
}
