use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message as RdMessage;
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::Offset;

use super::{BrokerClient, BrokerError};
use crate::config::SidelineConfig;
use crate::types::{PartitionKey, Record};

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// rdkafka-backed broker client. One instance per consumer; assignment is
/// replaced wholesale through [`BrokerClient::assign`].
pub struct KafkaBrokerClient {
    consumer: BaseConsumer,
    assignment: Vec<PartitionKey>,
    /// Last explicit seek target per partition. Used to answer `position`
    /// before the first fetch and to attribute out-of-range errors.
    seek_targets: HashMap<PartitionKey, i64>,
}

impl KafkaBrokerClient {
    pub fn from_config(config: &SidelineConfig) -> Result<Self, BrokerError> {
        let mut cc = ClientConfig::new();
        cc.set("bootstrap.servers", config.bootstrap_servers());
        // librdkafka insists on a group id even though assignment is static
        // and nothing is ever committed broker-side.
        cc.set("group.id", &config.consumer_id);

        // Offsets are managed entirely by this crate.
        cc.set("enable.auto.commit", "false");
        cc.set("enable.auto.offset.store", "false");
        // Surface out-of-range instead of silently resetting; recovery is
        // the consumer's job.
        cc.set("auto.offset.reset", "error");
        cc.set("enable.partition.eof", "false");
        cc.set("allow.auto.create.topics", "false");

        // Fetch tuning for low-latency staging
        cc.set("fetch.wait.max.ms", "100");
        cc.set("fetch.min.bytes", "1");
        cc.set("queued.min.messages", "1000");

        // Fast reconnects on broker churn
        cc.set("socket.timeout.ms", "10000");
        cc.set("session.timeout.ms", "10000");
        cc.set("reconnect.backoff.ms", "100");
        cc.set("reconnect.backoff.max.ms", "10000");

        if config.ssl_enabled {
            cc.set("security.protocol", "ssl");
            if let Some(path) = &config.ssl_ca_path {
                cc.set("ssl.ca.location", path);
            }
            if let Some(path) = &config.ssl_cert_path {
                cc.set("ssl.certificate.location", path);
            }
            if let Some(path) = &config.ssl_key_path {
                cc.set("ssl.key.location", path);
            }
        }

        let consumer: BaseConsumer =
            cc.create().map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(Self { consumer, assignment: Vec::new(), seek_targets: HashMap::new() })
    }

    /// Figure out which assigned partition a bare out-of-range error refers
    /// to by comparing seek targets against the current watermarks.
    fn locate_out_of_range(&self) -> Option<i32> {
        for key in &self.assignment {
            let target = match self.seek_targets.get(key) {
                Some(t) => *t,
                None => continue,
            };
            match self.consumer.fetch_watermarks(&key.topic, key.partition, METADATA_TIMEOUT) {
                Ok((low, high)) => {
                    if target < low || target > high {
                        return Some(key.partition);
                    }
                }
                Err(e) => {
                    warn!("[{key}] watermark probe failed: {e}");
                }
            }
        }
        None
    }

    fn map_poll_error(&self, error: KafkaError) -> BrokerError {
        if let KafkaError::MessageConsumption(RDKafkaErrorCode::OffsetOutOfRange) = error {
            return BrokerError::OffsetOutOfRange { partition: self.locate_out_of_range() };
        }
        BrokerError::Unavailable(error.to_string())
    }
}

fn to_record(message: &rdkafka::message::BorrowedMessage<'_>) -> Record {
    let timestamp_ms = match message.timestamp() {
        rdkafka::message::Timestamp::NotAvailable => None,
        rdkafka::message::Timestamp::CreateTime(ms)
        | rdkafka::message::Timestamp::LogAppendTime(ms) => Some(ms),
    };
    Record {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(|k| k.to_vec()),
        payload: message.payload().map(|p| p.to_vec()),
        timestamp_ms,
    }
}

impl BrokerClient for KafkaBrokerClient {
    fn partitions_for(&self, topic: &str) -> Result<Vec<i32>, BrokerError> {
        let metadata = self
            .consumer
            .client()
            .fetch_metadata(Some(topic), METADATA_TIMEOUT)
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let t = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        let mut partitions: Vec<i32> = t.partitions().iter().map(|p| p.id()).collect();
        partitions.sort_unstable();
        Ok(partitions)
    }

    fn assign(&mut self, partitions: &[PartitionKey]) -> Result<(), BrokerError> {
        // Replacing the assignment resets librdkafka's fetch positions, so
        // capture where retained partitions currently are and seek back
        // afterwards.
        let retained: Vec<(PartitionKey, i64)> = partitions
            .iter()
            .filter(|key| self.assignment.contains(*key))
            .filter_map(|key| self.position(key).ok().map(|pos| (key.clone(), pos)))
            .collect();

        let mut tpl = TopicPartitionList::new();
        for key in partitions {
            tpl.add_partition_offset(&key.topic, key.partition, Offset::Invalid)
                .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        }
        self.consumer.assign(&tpl).map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        self.assignment = partitions.to_vec();
        self.seek_targets.retain(|key, _| self.assignment.contains(key));
        for (key, position) in retained {
            self.seek(&key, position)?;
        }
        debug!("assigned {} partitions", partitions.len());
        Ok(())
    }

    fn seek(&mut self, partition: &PartitionKey, offset: i64) -> Result<(), BrokerError> {
        self.consumer
            .seek(&partition.topic, partition.partition, Offset::Offset(offset), SEEK_TIMEOUT)
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        self.seek_targets.insert(partition.clone(), offset);
        Ok(())
    }

    fn seek_to_beginning(&mut self, partitions: &[PartitionKey]) -> Result<(), BrokerError> {
        for key in partitions {
            let (low, _high) = self
                .consumer
                .fetch_watermarks(&key.topic, key.partition, METADATA_TIMEOUT)
                .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
            self.consumer
                .seek(&key.topic, key.partition, Offset::Offset(low), SEEK_TIMEOUT)
                .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
            self.seek_targets.insert(key.clone(), low);
        }
        Ok(())
    }

    fn position(&self, partition: &PartitionKey) -> Result<i64, BrokerError> {
        let positions =
            self.consumer.position().map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        for elem in positions.elements() {
            if elem.topic() == partition.topic && elem.partition() == partition.partition {
                if let Offset::Offset(offset) = elem.offset() {
                    return Ok(offset);
                }
            }
        }
        // Nothing fetched yet; fall back to the last explicit seek target.
        self.seek_targets
            .get(partition)
            .copied()
            .ok_or_else(|| BrokerError::Unavailable(format!("no position for {partition}")))
    }

    fn poll(&mut self, timeout: Duration, max_records: usize) -> Result<Vec<Record>, BrokerError> {
        let mut batch = Vec::new();
        while batch.len() < max_records {
            // Wait only for the first record; after that drain what is
            // already queued client-side.
            let wait = if batch.is_empty() { timeout } else { Duration::ZERO };
            match self.consumer.poll(wait) {
                Some(Ok(message)) => batch.push(to_record(&message)),
                Some(Err(error)) => {
                    let mapped = self.map_poll_error(error);
                    if batch.is_empty() {
                        return Err(mapped);
                    }
                    // Deliver what we have; the error will resurface on the
                    // next poll if it persists.
                    warn!("poll error after {} records: {mapped}", batch.len());
                    break;
                }
                None => break,
            }
        }
        Ok(batch)
    }

    fn close(&mut self) {
        if let Err(e) = self.consumer.unassign() {
            warn!("unassign on close failed: {e}");
        }
        self.assignment.clear();
        self.seek_targets.clear();
    }
}
