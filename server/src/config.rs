use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::chat::store::RetryPolicy;
use crate::ws::actor::Heartbeat;

const DEFAULT_CONFIG_PATH: &str = "./hubchat.toml";

/// Command-line flags. Only flags actually passed are serialized, so an
/// omitted flag never masks the TOML file or the environment.
#[derive(Parser, Serialize, Deserialize, Clone, Debug, Default)]
#[command(name = "hubchat-server", version, about = "Real-time direct messaging server")]
pub struct Cli {
    /// Port to listen on [default: 3000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file [default: ./hubchat.toml]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Data directory for persistent state (message DB, friends.json) [default: ./data]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Seconds between periodic flushes of the message store [default: 30]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_interval_secs: Option<u64>,

    /// Attempts per durable write before a mutation is reported as pending [default: 3]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_retries: Option<u32>,

    /// Base backoff in milliseconds between write attempts, doubled each retry [default: 50]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_backoff_ms: Option<u64>,

    /// Seconds between WebSocket pings [default: 30]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_secs: Option<u64>,

    /// Seconds to wait for a pong before dropping the connection [default: 10]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pong_timeout_secs: Option<u64>,
}

/// Effective server configuration after all layers are merged.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub data_dir: String,
    pub flush_interval_secs: u64,
    pub persist_retries: u32,
    pub persist_backoff_ms: u64,
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: DEFAULT_CONFIG_PATH.to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            flush_interval_secs: 30,
            persist_retries: 3,
            persist_backoff_ms: 50,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (HUBCHAT_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_cli(Cli::parse())
    }

    /// Merge every layer on top of already-parsed CLI flags.
    pub fn from_cli(cli: Cli) -> Result<Self, figment::Error> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("HUBCHAT_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.persist_retries.max(1),
            backoff: Duration::from_millis(self.persist_backoff_ms),
        }
    }

    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs.max(1)),
        }
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# hubchat server configuration
# Place this file at ./hubchat.toml or specify with --config <path>
# All settings can be overridden via environment variables (HUBCHAT_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the message database and friends.json
# data_dir = "./data"

# ---- Durability ----

# Periodic flush interval in seconds (writes are also flushed on every
# mutating call and on shutdown)
# flush_interval_secs = 30

# Attempts per durable write before the mutation is reported as pending
# persist_retries = 3

# Base backoff between attempts in milliseconds, doubled per retry
# persist_backoff_ms = 50

# ---- Connections ----

# Seconds between WebSocket pings
# ping_interval_secs = 30

# Seconds to wait for a pong before the connection is dropped
# pong_timeout_secs = 10
"#
    .to_string()
}
