//! Server configuration
//!
//! Listen address for the TCP listener, loadable from a TOML fragment.

use serde::Deserialize;

use crate::error::{DebugError, DebugResult};

/// Default DAP port of the Zephyr debug server.
pub const DEFAULT_PORT: u16 = 19021;

/// Debug server configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Parse from a TOML fragment; missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> DebugResult<Self> {
        toml::from_str(text).map_err(|err| DebugError::Config(err.to_string()))
    }

    pub fn listen_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}
