#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod benchmark;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod reporter;
pub mod submitter;
pub mod transaction;

pub(crate) mod counters;

pub use benchmark::{run_benchmark, Benchmark};
pub use counters::CounterSnapshot;
pub use ledger::{HttpLedger, Ledger};

pub mod prelude {
    pub use crate::benchmark::{Benchmark, ConfigurableBenchmark};
    pub use crate::identity::Identity;
    pub use crate::ledger::{HttpLedger, Ledger};
    pub use ledgerload_core::{IdentityMode, LedgerConfig, RunConfig, RunReport};
}
