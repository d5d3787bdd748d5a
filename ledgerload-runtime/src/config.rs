//! Runtime settings
//!
//! Settings are layered, lowest precedence first: built-in defaults, the TOML config file,
//! `LEDGERLOAD_*` environment variables, command line flags. The last two are handled by clap
//! in [`crate::runtime`]; this module covers the file layer.
use crate::error::RuntimeError;
use ledgerload_core::{LedgerConfig, RunConfig, DEFAULT_FACADE_PORT};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub run: RunConfig,
    pub ledger: LedgerConfig,
    pub server: ServerConfig,
    /// Serve Prometheus metrics on this address.
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_FACADE_PORT,
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RuntimeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| RuntimeError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        self.run.validate()?;
        self.ledger.validate()?;
        Ok(())
    }
}
