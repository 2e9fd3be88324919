use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::paths;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    client: ClientConfig,
}

#[derive(Deserialize, Default)]
struct ServerConfig {
    bind_address: Option<String>,
    port: Option<u16>,
    poll_timeout_ms: Option<u64>,
    database: Option<PathBuf>,
    delivery: Option<String>,
    retry_cycles: Option<u32>,
}

#[derive(Deserialize, Default)]
struct ClientConfig {
    server_address: Option<String>,
    port: Option<u16>,
}

/// How the relay treats a recipient that is not write-ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Evict,
    Retry,
}

pub struct Config {
    server: ServerConfig,
    client: ClientConfig,
}

impl Config {
    /// Embedded defaults overlaid with the user's config file, if any.
    pub fn load() -> Self {
        Self::load_from(paths::user_config_path().as_deref())
    }

    /// Embedded defaults overlaid with the file at `path`. A missing,
    /// unreadable or malformed file leaves the defaults in place.
    pub fn load_from(path: Option<&Path>) -> Self {
        let mut base = embedded();

        if let Some(path) = path {
            if path.exists() {
                match std::fs::read_to_string(path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config {
            server: base.server,
            client: base.client,
        }
    }

    pub fn bind_address(&self) -> &str {
        self.server
            .bind_address
            .as_deref()
            .unwrap_or(DEFAULT_BIND_ADDRESS)
    }

    pub fn server_port(&self) -> u16 {
        self.server.port.unwrap_or(DEFAULT_PORT)
    }

    /// Router poll timeout (clamped to 1..=5000 ms).
    pub fn poll_timeout(&self) -> Duration {
        let ms = self.server.poll_timeout_ms.unwrap_or(500).clamp(1, 5_000);
        Duration::from_millis(ms)
    }

    pub fn database_path(&self) -> PathBuf {
        self.server
            .database
            .clone()
            .unwrap_or_else(paths::default_database_path)
    }

    pub fn delivery(&self) -> DeliveryMode {
        match self.server.delivery.as_deref() {
            None => DeliveryMode::Evict,
            Some(s) => parse_delivery(s).unwrap_or_else(|| {
                log::warn!(target: "config", "unknown delivery mode '{}', using evict", s);
                DeliveryMode::Evict
            }),
        }
    }

    /// Iterations a message may wait under the retry mode (clamped to 1..=100).
    pub fn retry_cycles(&self) -> u32 {
        self.server.retry_cycles.unwrap_or(3).clamp(1, 100)
    }

    pub fn client_server_address(&self) -> &str {
        self.client
            .server_address
            .as_deref()
            .unwrap_or(DEFAULT_SERVER_ADDRESS)
    }

    pub fn client_port(&self) -> u16 {
        self.client.port.unwrap_or(DEFAULT_PORT)
    }
}

fn embedded() -> ConfigFile {
    toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
        log::error!(target: "config", "embedded config.toml is invalid: {}", e);
        ConfigFile::default()
    })
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    let (server, client) = (user.server, user.client);
    if server.bind_address.is_some() {
        base.server.bind_address = server.bind_address;
    }
    if server.port.is_some() {
        base.server.port = server.port;
    }
    if server.poll_timeout_ms.is_some() {
        base.server.poll_timeout_ms = server.poll_timeout_ms;
    }
    if server.database.is_some() {
        base.server.database = server.database;
    }
    if server.delivery.is_some() {
        base.server.delivery = server.delivery;
    }
    if server.retry_cycles.is_some() {
        base.server.retry_cycles = server.retry_cycles;
    }
    if client.server_address.is_some() {
        base.client.server_address = client.server_address;
    }
    if client.port.is_some() {
        base.client.port = client.port;
    }
}

fn parse_delivery(s: &str) -> Option<DeliveryMode> {
    match s.to_lowercase().as_str() {
        "evict" => Some(DeliveryMode::Evict),
        "retry" => Some(DeliveryMode::Retry),
        _ => None,
    }
}
