use std::num::{NonZeroU32, NonZeroUsize};

/// Number of submission attempts made for a single record before it is marked failed.
pub const RETRY_LIMIT: NonZeroU32 = unsafe { NonZeroU32::new_unchecked(3) };

/// Default number of records created by a run.
pub const DEFAULT_TOTAL_COUNT: u64 = 10_000;

/// Default sequence offset; the first record of a run is `offset + 1`.
pub const DEFAULT_START_OFFSET: u64 = 0;

/// Default number of records submitted concurrently.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = unsafe { NonZeroUsize::new_unchecked(200) };

/// Default destination of the persisted run summary.
pub const DEFAULT_LOG_PATH: &str = "throughput.log";

/// Default ledger API root.
pub const DEFAULT_LEDGER_URL: &str = "http://localhost:9984/api/v1/";

/// Default port of the REST facade.
pub const DEFAULT_FACADE_PORT: u16 = 3000;
