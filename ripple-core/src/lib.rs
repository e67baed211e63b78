//! Core scan engine: configuration, the validation oracle, the cyclic
//! target iterator, the probe module contract, and the sender/receiver/
//! monitor threads that drive one scan run end to end.

pub mod allowed;
pub mod capture;
pub mod config;
pub mod dedup;
pub mod error;
pub mod iface;
pub mod iterator;
pub mod metadata;
pub mod monitor;
pub mod oracle;
pub mod output;
pub mod probe;
pub mod receiver;
pub mod run;
pub mod sender;
pub mod stats;
pub mod sync;
pub mod target;
pub mod transmit;

pub use error::{Result, ScanError};
pub use run::{run_scan, RunOutcome};
