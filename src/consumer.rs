use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::assignment::partitions_for_consumer;
use crate::broker::{BrokerClient, BrokerError, KafkaBrokerClient};
use crate::buffer::RecordBuffer;
use crate::clock::{Clock, SystemClock};
use crate::config::SidelineConfig;
use crate::error::SidelineError;
use crate::offset_manager::PartitionOffsetManager;
use crate::persistence::PersistenceAdapter;
use crate::state::ConsumerState;
use crate::types::{PartitionKey, Record};

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    New,
    Open,
    Closed,
}

/// Stateful sideline consumer over a statically-assigned slice of a topic's
/// partitions.
///
/// One logical driver thread calls `next_record`, `commit_offset`,
/// `timed_flush_consumer_state` and friends in a serialized loop; nothing
/// here is meant to be shared across threads. Per-partition offset managers
/// are owned exclusively by this struct.
pub struct SidelineConsumer {
    config: SidelineConfig,
    broker: Box<dyn BrokerClient>,
    persistence: Arc<Mutex<dyn PersistenceAdapter>>,
    clock: Arc<dyn Clock>,
    lifecycle: Lifecycle,
    managers: BTreeMap<PartitionKey, PartitionOffsetManager>,
    buffer: RecordBuffer,
    last_flush_at: Instant,
}

impl SidelineConsumer {
    /// Full-injection constructor: broker client, persistence adapter and
    /// clock are all supplied by the caller. The consumer starts in `New`;
    /// nothing talks to the broker until [`open`](Self::open).
    pub fn new(
        config: SidelineConfig,
        broker: Box<dyn BrokerClient>,
        persistence: Arc<Mutex<dyn PersistenceAdapter>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SidelineError> {
        config.validate()?;
        let buffer = RecordBuffer::new(config.tuple_buffer_max_size);
        let last_flush_at = clock.now();
        Ok(Self {
            config,
            broker,
            persistence,
            clock,
            lifecycle: Lifecycle::New,
            managers: BTreeMap::new(),
            buffer,
            last_flush_at,
        })
    }

    /// Convenience constructor wiring the rdkafka broker client and the
    /// system clock.
    pub fn connect(
        config: SidelineConfig,
        persistence: Arc<Mutex<dyn PersistenceAdapter>>,
    ) -> Result<Self, SidelineError> {
        config.validate()?;
        let broker = KafkaBrokerClient::from_config(&config).map_err(broker_unavailable)?;
        Self::new(config, Box::new(broker), persistence, Arc::new(SystemClock))
    }

    /// Startup protocol: discover partitions, shard them, assign the owned
    /// slice, then position every owned partition from persisted state (or
    /// the earliest available offset when there is none).
    pub fn open(&mut self) -> Result<(), SidelineError> {
        match self.lifecycle {
            Lifecycle::New => {}
            // Closed is terminal; the lifecycle has been consumed.
            Lifecycle::Open | Lifecycle::Closed => return Err(SidelineError::AlreadyOpen),
        }

        self.adapter()?.open()?;

        let partitions =
            self.broker.partitions_for(&self.config.topic).map_err(broker_unavailable)?;
        let owned = partitions_for_consumer(
            &partitions,
            self.config.number_of_consumers,
            self.config.index_of_consumer,
        );
        let keys: Vec<PartitionKey> =
            owned.iter().map(|p| PartitionKey::new(self.config.topic.clone(), *p)).collect();
        self.broker.assign(&keys).map_err(broker_unavailable)?;
        debug!(
            "[{}] owns {} of {} partitions as shard {}/{}",
            self.config.consumer_id,
            keys.len(),
            partitions.len(),
            self.config.index_of_consumer,
            self.config.number_of_consumers
        );

        for key in keys {
            let stored = self.adapter()?.retrieve_consumer_offset(
                &self.config.consumer_id,
                key.partition,
            )?;
            let starting = match stored {
                Some(committed) => {
                    // Resume one past what has provably finished.
                    self.broker.seek(&key, committed + 1).map_err(broker_unavailable)?;
                    committed
                }
                None => {
                    self.broker
                        .seek_to_beginning(std::slice::from_ref(&key))
                        .map_err(broker_unavailable)?;
                    let earliest = self.broker.position(&key).map_err(broker_unavailable)?;
                    // "No state" and "nothing ever finished" look identical
                    // at rest: one below the earliest available offset.
                    earliest - 1
                }
            };
            self.managers.insert(key.clone(), PartitionOffsetManager::new(key.to_string(), starting));
        }

        self.lifecycle = Lifecycle::Open;
        self.last_flush_at = self.clock.now();
        Ok(())
    }

    /// Next staged record, or `None` when the buffer is empty and a
    /// non-blocking fetch yields nothing. The owning manager sees
    /// `start_offset` before the record is handed out.
    pub fn next_record(&mut self) -> Result<Option<Record>, SidelineError> {
        self.ensure_open()?;
        loop {
            if self.buffer.is_empty() {
                self.fill_buffer()?;
            }
            let record = match self.buffer.pop() {
                Some(record) => record,
                None => return Ok(None),
            };
            let key = record.partition_key();
            match self.managers.get_mut(&key) {
                Some(manager) => {
                    manager.start_offset(record.offset);
                    return Ok(Some(record));
                }
                None => {
                    // Possible after an unsubscribe raced a fetch; the
                    // record cannot be tracked, so it is not delivered.
                    warn!("[{key}] dropping record at {} for unowned partition", record.offset);
                }
            }
        }
    }

    /// Acknowledge one offset. No persistence I/O happens here; acks only
    /// move the in-memory contiguous prefix.
    pub fn commit_offset(&mut self, key: &PartitionKey, offset: i64) -> Result<(), SidelineError> {
        self.ensure_open()?;
        match self.managers.get_mut(key) {
            Some(manager) => manager.finish_offset(offset),
            None => warn!("[{key}] ack at {offset} for partition this consumer does not own"),
        }
        Ok(())
    }

    pub fn commit_record(&mut self, record: &Record) -> Result<(), SidelineError> {
        self.commit_offset(&record.partition_key(), record.offset)
    }

    /// Snapshot every manager's last finished offset and persist each
    /// entry. Returns the snapshot.
    pub fn flush_consumer_state(&mut self) -> Result<ConsumerState, SidelineError> {
        self.ensure_open()?;
        let state = self.snapshot();
        let mut adapter = self.adapter()?;
        for (key, offset) in state.iter() {
            adapter.persist_consumer_offset(&self.config.consumer_id, key.partition, offset)?;
        }
        Ok(state)
    }

    /// Flush on the auto-commit cadence. Does nothing when auto-commit is
    /// disabled or the interval has not elapsed on the injected clock. On
    /// persistence failure the timer does not advance, so the next call
    /// retries.
    pub fn timed_flush_consumer_state(&mut self) -> Result<Option<ConsumerState>, SidelineError> {
        self.ensure_open()?;
        if !self.config.consumer_state_auto_commit {
            return Ok(None);
        }
        let interval = Duration::from_millis(self.config.consumer_state_auto_commit_interval_ms);
        if self.clock.now().duration_since(self.last_flush_at) < interval {
            return Ok(None);
        }
        let state = self.flush_consumer_state()?;
        self.last_flush_at = self.clock.now();
        Ok(Some(state))
    }

    /// Live snapshot without persisting.
    pub fn current_state(&self) -> Result<ConsumerState, SidelineError> {
        self.ensure_open()?;
        Ok(self.snapshot())
    }

    /// Flush, then clear every persisted offset for this consumer identity,
    /// including partitions no longer assigned. For permanently
    /// decommissioning the identity.
    pub fn remove_consumer_state(&mut self) -> Result<(), SidelineError> {
        self.ensure_open()?;
        self.flush_consumer_state()?;
        self.adapter()?.clear_consumer_state(&self.config.consumer_id)?;
        Ok(())
    }

    /// Stop consuming one partition: narrow the broker assignment, drop its
    /// manager and purge its staged records. The persisted offset is left
    /// alone. Returns `false` when the partition was not owned.
    pub fn unsubscribe_topic_partition(&mut self, key: &PartitionKey) -> Result<bool, SidelineError> {
        self.ensure_open()?;
        if self.managers.remove(key).is_none() {
            return Ok(false);
        }
        self.buffer.purge_partition(&key.topic, key.partition);
        let remaining: Vec<PartitionKey> = self.managers.keys().cloned().collect();
        self.broker.assign(&remaining).map_err(broker_unavailable)?;
        debug!("[{key}] unsubscribed; {} partitions remain", remaining.len());
        Ok(true)
    }

    /// Currently owned partitions.
    pub fn get_assigned_partitions(&self) -> Result<BTreeSet<PartitionKey>, SidelineError> {
        self.ensure_open()?;
        Ok(self.managers.keys().cloned().collect())
    }

    /// Idempotent shutdown. Staged but unacknowledged records are
    /// discarded; the next open re-delivers from one past the last
    /// persisted finished offset.
    pub fn close(&mut self) {
        if self.lifecycle == Lifecycle::Open {
            self.broker.close();
            match self.persistence.lock() {
                Ok(mut adapter) => {
                    if let Err(e) = adapter.close() {
                        warn!("persistence close failed: {e}");
                    }
                }
                Err(e) => warn!("persistence adapter lock poisoned on close: {e}"),
            }
        }
        self.buffer.clear();
        self.managers.clear();
        self.lifecycle = Lifecycle::Closed;
    }

    fn ensure_open(&self) -> Result<(), SidelineError> {
        match self.lifecycle {
            Lifecycle::Open => Ok(()),
            Lifecycle::New | Lifecycle::Closed => Err(SidelineError::NotOpen),
        }
    }

    fn snapshot(&self) -> ConsumerState {
        self.managers
            .iter()
            .map(|(key, manager)| (key.clone(), manager.last_finished_offset()))
            .collect()
    }

    fn adapter(&self) -> Result<MutexGuard<'_, dyn PersistenceAdapter + 'static>, SidelineError> {
        Mutex::lock(&self.persistence)
            .map_err(|e| SidelineError::Persistence(format!("adapter lock poisoned: {e}")))
    }

    /// One bounded fetch pass into the staging buffer. An out-of-range
    /// error resets the affected partition to earliest and costs one retry.
    fn fill_buffer(&mut self) -> Result<(), SidelineError> {
        for _ in 0..2 {
            let capacity = self.buffer.remaining_capacity();
            if capacity == 0 {
                return Ok(());
            }
            match self.broker.poll(POLL_TIMEOUT, capacity) {
                Ok(batch) => {
                    for record in batch {
                        self.buffer.push(record);
                    }
                    return Ok(());
                }
                Err(BrokerError::OffsetOutOfRange { partition }) => {
                    self.recover_out_of_range(partition)?;
                }
                Err(e) => return Err(broker_unavailable(e)),
            }
        }
        Ok(())
    }

    /// A persisted offset no longer exists on the broker (truncation or
    /// retention). Reset the affected partition to its earliest available
    /// offset and rebuild its manager as if nothing had ever finished
    /// there. Other partitions are untouched.
    fn recover_out_of_range(&mut self, partition: Option<i32>) -> Result<(), SidelineError> {
        let keys: Vec<PartitionKey> = match partition {
            Some(p) => {
                let key = PartitionKey::new(self.config.topic.clone(), p);
                if !self.managers.contains_key(&key) {
                    warn!("[{key}] out-of-range signal for unowned partition");
                    return Ok(());
                }
                vec![key]
            }
            // The broker could not say which partition; reset everything
            // owned. At-least-once survives, some records re-deliver.
            None => self.managers.keys().cloned().collect(),
        };
        for key in keys {
            self.broker
                .seek_to_beginning(std::slice::from_ref(&key))
                .map_err(broker_unavailable)?;
            let earliest = self.broker.position(&key).map_err(broker_unavailable)?;
            warn!("[{key}] stored offset out of range; resetting to earliest {earliest}");
            self.managers
                .insert(key.clone(), PartitionOffsetManager::new(key.to_string(), earliest - 1));
        }
        Ok(())
    }
}

fn broker_unavailable(error: BrokerError) -> SidelineError {
    SidelineError::BrokerUnavailable(error.to_string())
}
