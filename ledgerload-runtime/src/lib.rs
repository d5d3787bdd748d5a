pub mod config;
pub mod error;
pub mod runtime;
pub mod server;

pub use crate::config::Settings;
pub use crate::error::RuntimeError;
pub use crate::runtime::{LedgerRuntime, Mode};
