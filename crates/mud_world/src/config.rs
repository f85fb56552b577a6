//! World process configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mud_entity::EntityId;
use mud_net::connection::{DEFAULT_NATS_URL, DEFAULT_REQUEST_TIMEOUT};

/// Command-line flags, each overridable through the environment.
#[derive(Debug, Parser)]
#[command(name = "mud_world", about = "MUD world process: entity graph and command pipeline")]
pub struct Args {
    /// NATS server URL
    #[arg(short, long, env = "MUD_NATS_URL", default_value = DEFAULT_NATS_URL)]
    pub nats_url: String,

    /// Directory for entity records; in-memory storage when absent
    #[arg(short, long, env = "MUD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Room new players start in, e.g. `#1`
    #[arg(long, env = "MUD_START_ROOM")]
    pub start_room: Option<EntityId>,

    /// How long calls to the proxy wait for a reply
    #[arg(long, env = "MUD_RPC_TIMEOUT_MS", default_value_t = 5000)]
    pub rpc_timeout_ms: u64,
}

/// Resolved settings for the world process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldConfig {
    pub nats_url: String,
    pub data_dir: Option<PathBuf>,
    pub start_room: Option<EntityId>,
    pub rpc_timeout: Duration,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_NATS_URL.to_string(),
            data_dir: None,
            start_room: None,
            rpc_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl From<Args> for WorldConfig {
    fn from(args: Args) -> Self {
        Self {
            nats_url: args.nats_url,
            data_dir: args.data_dir,
            start_room: args.start_room,
            rpc_timeout: Duration::from_millis(args.rpc_timeout_ms),
        }
    }
}
