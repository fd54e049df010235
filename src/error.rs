use thiserror::Error;

/// Errors surfaced to callers of the consumer API.
///
/// Ack-level anomalies (unknown offset, unknown partition) are not here:
/// the broker log is the source of truth and will re-deliver, so those are
/// logged as warnings and swallowed.
#[derive(Debug, Error)]
pub enum SidelineError {
    #[error("consumer is not open")]
    NotOpen,

    #[error("consumer is already open or has been closed")]
    AlreadyOpen,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}
