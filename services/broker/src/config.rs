//! Broker configuration loading.
//!
//! TOML is the sole config source.  Default config path:
//! `/etc/overlord/broker.toml`; a missing file means "all defaults", a
//! present-but-invalid file is fatal.
//!
//! # Sections
//! - `[listen]`: `bind` address for the ghost control port
//! - `[ssh_ports]`: inclusive target SSH forward range
//! - `[timeouts]`: ping cadence and RPC deadline overrides, in seconds

use crate::connection::{ConnTuning, PING_TIMEOUT_SECS};
use crate::framing::DEFAULT_RPC_TIMEOUT;
use crate::registry::{TARGET_SSH_PORT_END, TARGET_SSH_PORT_START};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/overlord/broker.toml";
pub const DEFAULT_BIND: &str = "0.0.0.0:4455";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Validated config
// ---------------------------------------------------------------------------

/// Top-level broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Ghost control port bind address.
    pub bind: String,
    /// Inclusive target SSH forward port range.
    pub ssh_port_start: u16,
    pub ssh_port_end: u16,
    pub tuning: ConnTuning,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            bind: DEFAULT_BIND.to_owned(),
            ssh_port_start: TARGET_SSH_PORT_START,
            ssh_port_end: TARGET_SSH_PORT_END,
            tuning: ConnTuning::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    listen: Option<RawListen>,
    ssh_ports: Option<RawSshPorts>,
    timeouts: Option<RawTimeouts>,
}

#[derive(Debug, Deserialize)]
struct RawListen {
    bind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSshPorts {
    start: Option<u16>,
    end: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawTimeouts {
    ping_secs: Option<u64>,
    rpc_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load the config from the default path.
pub fn load_config() -> Result<BrokerConfig, ConfigError> {
    load_config_from(Path::new(DEFAULT_CONFIG_PATH))
}

/// Load the config from an explicit path; a missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<BrokerConfig, ConfigError> {
    if !path.exists() {
        return Ok(BrokerConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&text)
}

fn parse_config(text: &str) -> Result<BrokerConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(text)?;
    let defaults = BrokerConfig::default();

    let bind = raw
        .listen
        .and_then(|l| l.bind)
        .unwrap_or(defaults.bind);
    let (start, end) = match raw.ssh_ports {
        Some(ports) => (
            ports.start.unwrap_or(defaults.ssh_port_start),
            ports.end.unwrap_or(defaults.ssh_port_end),
        ),
        None => (defaults.ssh_port_start, defaults.ssh_port_end),
    };
    if start > end {
        return Err(ConfigError::Invalid(format!(
            "ssh_ports.start ({start}) must not exceed ssh_ports.end ({end})"
        )));
    }

    let mut tuning = ConnTuning::default();
    if let Some(timeouts) = raw.timeouts {
        let ping = timeouts.ping_secs.unwrap_or(PING_TIMEOUT_SECS);
        if ping == 0 {
            return Err(ConfigError::Invalid("timeouts.ping_secs must be > 0".to_owned()));
        }
        tuning.ping_timeout = Duration::from_secs(ping);
        tuning.rpc_timeout = timeouts
            .rpc_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RPC_TIMEOUT);
    }

    Ok(BrokerConfig {
        bind,
        ssh_port_start: start,
        ssh_port_end: end,
        tuning,
    })
}
