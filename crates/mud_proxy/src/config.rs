//! Proxy process configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mud_net::connection::{DEFAULT_NATS_URL, DEFAULT_REQUEST_TIMEOUT};

/// Default TCP address players connect to.
pub const DEFAULT_BIND: &str = "0.0.0.0:4000";

/// Default longest accepted input line, in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Command-line flags, each overridable through the environment.
#[derive(Debug, Parser)]
#[command(name = "mud_proxy", about = "MUD connection proxy")]
pub struct Args {
    /// Address to accept player connections on
    #[arg(short, long, env = "MUD_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// NATS server URL
    #[arg(short, long, env = "MUD_NATS_URL", default_value = DEFAULT_NATS_URL)]
    pub nats_url: String,

    /// JSON file holding accounts; in-memory when absent
    #[arg(short, long, env = "MUD_ACCOUNTS_FILE")]
    pub accounts_file: Option<PathBuf>,

    /// Disconnect sessions idle for longer than this
    #[arg(long, env = "MUD_IDLE_TIMEOUT_SECS", default_value_t = 3600)]
    pub idle_timeout_secs: u64,

    /// How often the idle sweep runs
    #[arg(long, env = "MUD_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    /// Secret mixed into every password hash
    #[arg(long, env = "MUD_PASSWORD_SECRET", default_value = "", hide_env_values = true)]
    pub password_secret: String,

    /// Directory new-account mail is written to; logged only when absent
    #[arg(long, env = "MUD_MAIL_OUTBOX")]
    pub mail_outbox: Option<PathBuf>,

    /// How long calls to the world wait for a reply
    #[arg(long, env = "MUD_RPC_TIMEOUT_MS", default_value_t = 5000)]
    pub rpc_timeout_ms: u64,

    /// Longest accepted input line, in bytes
    #[arg(long, env = "MUD_MAX_LINE_LEN", default_value_t = DEFAULT_MAX_LINE_LEN)]
    pub max_line_len: usize,
}

/// Resolved settings for the proxy process.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub bind: SocketAddr,
    pub nats_url: String,
    pub accounts_file: Option<PathBuf>,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub password_secret: String,
    pub mail_outbox: Option<PathBuf>,
    pub rpc_timeout: Duration,
    pub max_line_len: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 4000)),
            nats_url: DEFAULT_NATS_URL.to_string(),
            accounts_file: None,
            idle_timeout: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            password_secret: String::new(),
            mail_outbox: None,
            rpc_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("bind", &self.bind)
            .field("nats_url", &self.nats_url)
            .field("accounts_file", &self.accounts_file)
            .field("idle_timeout", &self.idle_timeout)
            .field("sweep_interval", &self.sweep_interval)
            .field("password_secret", &"<redacted>")
            .field("mail_outbox", &self.mail_outbox)
            .field("rpc_timeout", &self.rpc_timeout)
            .field("max_line_len", &self.max_line_len)
            .finish()
    }
}

impl From<Args> for ProxyConfig {
    fn from(args: Args) -> Self {
        Self {
            bind: args.bind,
            nats_url: args.nats_url,
            accounts_file: args.accounts_file,
            idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs.max(1)),
            password_secret: args.password_secret,
            mail_outbox: args.mail_outbox,
            rpc_timeout: Duration::from_millis(args.rpc_timeout_ms),
            max_line_len: args.max_line_len.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_flag_defaults() {
        let from_flags = ProxyConfig::from(Args::try_parse_from(["mud_proxy"]).unwrap());
        let expected = ProxyConfig::default();
        assert_eq!(from_flags.idle_timeout, expected.idle_timeout);
        assert_eq!(from_flags.sweep_interval, expected.sweep_interval);
        assert_eq!(from_flags.max_line_len, expected.max_line_len);
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = ProxyConfig {
            password_secret: "hunter2".to_string(),
            ..ProxyConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
