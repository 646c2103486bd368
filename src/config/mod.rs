//! # Configuration Management
//!
//! Process-level configuration read from the environment, plus the module-level settings
//! object (see [`module`]) that gates optional HTTP protocol knobs.

pub mod module;

pub use module::{
    AccessLogType, ClientCertDetails, ForwardClientCertDetails, HeadersWithUnderscoresAction,
    ModuleSettings,
};

use crate::Result;
use std::net::IpAddr;

/// Default address listeners bind to when neither the declaration nor the environment says otherwise
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

const BIND_ADDRESS_ENV: &str = "INGRESS_COMPILER_BIND_ADDRESS";
const LOG_LEVEL_ENV: &str = "INGRESS_COMPILER_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "INGRESS_COMPILER_LOG_FORMAT";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address used for listeners whose declaration does not name one
    pub bind_address: String,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self { bind_address: DEFAULT_BIND_ADDRESS.to_string(), log: LogConfig::default() }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let bind_address = match std::env::var(BIND_ADDRESS_ENV) {
            Ok(value) if !value.trim().is_empty() => {
                let value = value.trim().to_string();
                value.parse::<IpAddr>().map_err(|e| {
                    crate::Error::config(format!(
                        "Invalid {} '{}': {}",
                        BIND_ADDRESS_ENV, value, e
                    ))
                })?;
                value
            }
            _ => DEFAULT_BIND_ADDRESS.to_string(),
        };

        let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());

        let json = match std::env::var(LOG_FORMAT_ENV) {
            Ok(format) => match format.to_ascii_lowercase().as_str() {
                "json" => true,
                "text" | "" => false,
                other => {
                    return Err(crate::Error::config(format!(
                        "Invalid {} '{}': expected 'text' or 'json'",
                        LOG_FORMAT_ENV, other
                    )))
                }
            },
            Err(_) => false,
        };

        Ok(Self { bind_address, log: LogConfig { level, json } })
    }

    /// Resolve the bind address for a declaration, falling back to the configured default
    pub fn resolve_bind_address(&self, declared: Option<&str>) -> String {
        match declared {
            Some(address) if !address.trim().is_empty() => address.trim().to_string(),
            _ => self.bind_address.clone(),
        }
    }
}
