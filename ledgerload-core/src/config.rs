use crate::{
    WorkPlan, DEFAULT_BATCH_SIZE, DEFAULT_LEDGER_URL, DEFAULT_LOG_PATH, DEFAULT_START_OFFSET,
    DEFAULT_TOTAL_COUNT, RETRY_LIMIT,
};
#[cfg(feature = "rt")]
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
#[cfg(feature = "rt")]
use serde_with::{serde_as, DurationSeconds};
use std::fmt;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How signing identities are handed out to work items.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "rt", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "rt", serde(rename_all = "kebab-case"))]
pub enum IdentityMode {
    /// A fresh, independent keypair is derived for every record.
    #[default]
    PerItem,
    /// One keypair is derived at the start of the run and owns every record.
    Shared,
}

impl fmt::Display for IdentityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityMode::PerItem => write!(f, "per-item"),
            IdentityMode::Shared => write!(f, "shared"),
        }
    }
}

impl FromStr for IdentityMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-item" | "per_item" | "peritem" => Ok(IdentityMode::PerItem),
            "shared" => Ok(IdentityMode::Shared),
            other => Err(ConfigError::IdentityMode(other.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown identity mode \"{0}\" (expected `per-item` or `shared`)")]
    IdentityMode(String),

    #[error("Sequence numbers overflow: start offset {start_offset} + total count {total_count}")]
    SequenceOverflow { start_offset: u64, total_count: u64 },

    #[error("Ledger URL must not be empty")]
    EmptyLedgerUrl,
}

/// Parameters of a single benchmark run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "rt", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "rt", serde(default))]
pub struct RunConfig {
    pub total_count: u64,
    pub start_offset: u64,
    pub batch_size: NonZeroUsize,
    pub identity_mode: IdentityMode,
    pub retry_limit: NonZeroU32,
    /// Conflicts (spent outputs, duplicates) are not retried unless this is set.
    pub retry_conflicts: bool,
    pub max_tps: Option<NonZeroU32>,
    /// `None` disables persisting the run summary.
    pub log_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_count: DEFAULT_TOTAL_COUNT,
            start_offset: DEFAULT_START_OFFSET,
            batch_size: DEFAULT_BATCH_SIZE,
            identity_mode: IdentityMode::default(),
            retry_limit: RETRY_LIMIT,
            retry_conflicts: false,
            max_tps: None,
            log_path: Some(PathBuf::from(DEFAULT_LOG_PATH)),
        }
    }
}

impl RunConfig {
    pub fn new(total_count: u64, batch_size: NonZeroUsize) -> Self {
        Self {
            total_count,
            batch_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_offset.checked_add(self.total_count).is_none() {
            return Err(ConfigError::SequenceOverflow {
                start_offset: self.start_offset,
                total_count: self.total_count,
            });
        }
        Ok(())
    }

    /// Lazily partitions the run into consecutive batches of work items.
    pub fn plan(&self) -> WorkPlan {
        WorkPlan::new(self.start_offset, self.total_count, self.batch_size)
    }
}

/// Where and how to reach the ledger node.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "rt", cfg_eval::cfg_eval, serde_as)]
#[cfg_attr(feature = "rt", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "rt", serde(default))]
pub struct LedgerConfig {
    pub url: String,
    /// Per-request timeout. When unset the transport's own behaviour applies.
    #[cfg_attr(feature = "rt", serde_as(as = "Option<DurationSeconds>"))]
    pub request_timeout: Option<Duration>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_LEDGER_URL.to_string(),
            request_timeout: None,
        }
    }
}

impl LedgerConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            request_timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            Err(ConfigError::EmptyLedgerUrl)
        } else {
            Ok(())
        }
    }
}
