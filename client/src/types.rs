//! Configuration consumed by the client runtime.
//!
//! Deserialized from the `[client]` table of the config file; every field
//! has a default so an empty table is valid.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::Deserialize;

/// Default window for the startup handshake.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 60;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

const DEFAULT_ENGINE_COMMAND: &str = "automation-engine";

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

const fn default_startup_timeout_secs() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_SECS
}

const fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_engine_command() -> String {
    DEFAULT_ENGINE_COMMAND.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Fixed engine port. `None` lets the OS pick a free loopback port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Address the transport connects to.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    /// How long the transport keeps retrying the initial connect.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ClientConfig {
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: None,
            host: default_host(),
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            engine: EngineConfig::default(),
        }
    }
}

/// How to launch the engine process.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Executable name (resolved through `PATH`) or path.
    #[serde(default = "default_engine_command")]
    pub command: String,
    /// Arguments. The literal `{port}` is replaced with the chosen port.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to withhold from the engine, as glob patterns
    /// (`*_TOKEN`, `AWS_*`, `*_SECRET*`, or an exact name).
    #[serde(default)]
    pub env_denylist: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            args: Vec::new(),
            env_denylist: Vec::new(),
        }
    }
}
