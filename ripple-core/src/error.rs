use thiserror::Error;

/// Errors that can occur while configuring or running a scan.
///
/// Variants map onto the error taxonomy of the scanner: configuration and
/// environmental errors are fatal and reported before any thread starts;
/// everything else in the hot path is counted in [`crate::stats::Stats`]
/// instead of being surfaced as a `Result::Err`.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("primitive root search exceeded {0} attempts")]
    PrimitiveRootSearch(u32),

    #[error("no eligible targets in the allowed address/port space")]
    EmptyTargetSpace,

    #[error("sender aborted after {0} transmit failures")]
    TooManySendFailures(u64),

    #[error("output sink error: {0}")]
    Output(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
