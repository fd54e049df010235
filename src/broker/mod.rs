//! The broker-client contract the core consumes. The real implementation
//! wraps rdkafka; tests script one in process.

mod kafka;

use std::time::Duration;

use thiserror::Error;

pub use kafka::KafkaBrokerClient;

use crate::types::{PartitionKey, Record};

/// Errors on the broker seam. `OffsetOutOfRange` must stay distinguishable:
/// the consumer recovers from it locally instead of surfacing it.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("offset out of range (partition {partition:?})")]
    OffsetOutOfRange { partition: Option<i32> },

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("unknown topic: {0}")]
    UnknownTopic(String),
}

/// What the consumer core needs from a broker client. Assignment is static:
/// the caller decides ownership, nothing is negotiated with the broker's
/// group coordinator.
pub trait BrokerClient: Send {
    /// Partition indexes of `topic`, sorted ascending.
    fn partitions_for(&self, topic: &str) -> Result<Vec<i32>, BrokerError>;

    /// Replace the current assignment with exactly `partitions`.
    fn assign(&mut self, partitions: &[PartitionKey]) -> Result<(), BrokerError>;

    /// Position the read cursor of one assigned partition.
    fn seek(&mut self, partition: &PartitionKey, offset: i64) -> Result<(), BrokerError>;

    /// Position the read cursors at each partition's earliest available
    /// offset.
    fn seek_to_beginning(&mut self, partitions: &[PartitionKey]) -> Result<(), BrokerError>;

    /// The offset the next fetch from this partition would read.
    fn position(&self, partition: &PartitionKey) -> Result<i64, BrokerError>;

    /// Non-blocking-ish fetch: wait at most `timeout` for the first record,
    /// then drain whatever is immediately available, up to `max_records`.
    /// An empty batch means nothing was ready.
    fn poll(&mut self, timeout: Duration, max_records: usize) -> Result<Vec<Record>, BrokerError>;

    /// Release broker resources. The client is unusable afterwards.
    fn close(&mut self);
}
