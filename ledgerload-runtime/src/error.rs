use ledgerload::error::LedgerError;
use ledgerload_core::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Startup failures. Anything that goes wrong once a run is underway is reported in the run
/// summary instead.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Error reading config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger client error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Error binding {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Error starting the async runtime: {0}")]
    Start(#[source] std::io::Error),

    #[error("Error installing metrics exporter: {0}")]
    Metrics(String),
}
