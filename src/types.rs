use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one log within the broker: (topic, partition-index).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub topic: String,
    pub partition: i32,
}

impl PartitionKey {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self { topic: topic.into(), partition }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// One record pulled from the broker and handed to the caller.
/// Payload and key are raw bytes; decoding is downstream's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    /// Broker timestamp in epoch milliseconds, when available.
    pub timestamp_ms: Option<i64>,
}

impl Record {
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.topic.clone(), self.partition)
    }

    /// Timestamp rendered as RFC 3339, when the broker supplied one.
    pub fn timestamp_rfc3339(&self) -> Option<String> {
        let ms = self.timestamp_ms?;
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339())
    }
}
