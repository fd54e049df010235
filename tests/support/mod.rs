//! Shared scaffolding for the consumer integration tests: an in-process
//! scripted broker and an instrumented persistence adapter.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sideline_consumer::broker::{BrokerClient, BrokerError};
use sideline_consumer::persistence::{
    InMemoryPersistenceAdapter, PersistenceAdapter, SidelinePayload,
};
use sideline_consumer::{PartitionKey, Record, SidelineConfig, SidelineConsumer, SidelineError};

/// Shared topic state: one log per partition, earliest offset always 0.
/// Clone freely; every clone sees the same logs.
#[derive(Clone)]
pub struct MockCluster {
    topic: String,
    logs: Arc<Mutex<BTreeMap<i32, Vec<Record>>>>,
}

impl MockCluster {
    pub fn new(topic: &str, partitions: i32) -> Self {
        // Every consumer test starts here, so this is the entry point for
        // the test logger; warn-level diagnostics from the offset managers
        // show up under `cargo test -- --nocapture`.
        let _ = env_logger::builder().is_test(true).try_init();
        let logs = (0..partitions).map(|p| (p, Vec::new())).collect();
        Self { topic: topic.to_string(), logs: Arc::new(Mutex::new(logs)) }
    }

    /// Append `count` records to one partition's log.
    pub fn produce(&self, partition: i32, count: usize) {
        let mut logs = self.logs.lock().unwrap();
        let log = logs.get_mut(&partition).expect("producing to unknown partition");
        for _ in 0..count {
            let offset = log.len() as i64;
            log.push(Record {
                topic: self.topic.clone(),
                partition,
                offset,
                key: None,
                payload: Some(format!("{partition}-{offset}").into_bytes()),
                timestamp_ms: Some(1_700_000_000_000 + offset),
            });
        }
    }

    /// A fresh broker client against this cluster, with its own assignment
    /// and positions.
    pub fn client(&self) -> MockBroker {
        MockBroker { cluster: self.clone(), state: Arc::new(Mutex::new(ClientState::default())) }
    }
}

#[derive(Default)]
struct ClientState {
    assignment: Vec<PartitionKey>,
    positions: HashMap<i32, i64>,
    /// Partitions whose current seek target falls outside the log; the
    /// error surfaces on the next poll, as with a real broker.
    out_of_range: BTreeSet<i32>,
    closed: bool,
}

#[derive(Clone)]
pub struct MockBroker {
    cluster: MockCluster,
    state: Arc<Mutex<ClientState>>,
}

impl MockBroker {
    pub fn assigned(&self) -> Vec<PartitionKey> {
        self.state.lock().unwrap().assignment.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

impl BrokerClient for MockBroker {
    fn partitions_for(&self, topic: &str) -> Result<Vec<i32>, BrokerError> {
        if topic != self.cluster.topic {
            return Err(BrokerError::UnknownTopic(topic.to_string()));
        }
        Ok(self.cluster.logs.lock().unwrap().keys().copied().collect())
    }

    fn assign(&mut self, partitions: &[PartitionKey]) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.assignment = partitions.to_vec();
        state.positions.retain(|p, _| partitions.iter().any(|k| k.partition == *p));
        state.out_of_range.retain(|p| partitions.iter().any(|k| k.partition == *p));
        Ok(())
    }

    fn seek(&mut self, partition: &PartitionKey, offset: i64) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        if !state.assignment.contains(partition) {
            return Err(BrokerError::Unavailable(format!("{partition} is not assigned")));
        }
        let end = self
            .cluster
            .logs
            .lock()
            .unwrap()
            .get(&partition.partition)
            .map(|log| log.len() as i64)
            .unwrap_or(0);
        // The seek itself always succeeds; an out-of-range target only
        // fails the next fetch.
        state.positions.insert(partition.partition, offset);
        if offset < 0 || offset > end {
            state.out_of_range.insert(partition.partition);
        } else {
            state.out_of_range.remove(&partition.partition);
        }
        Ok(())
    }

    fn seek_to_beginning(&mut self, partitions: &[PartitionKey]) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        for key in partitions {
            if !state.assignment.contains(key) {
                return Err(BrokerError::Unavailable(format!("{key} is not assigned")));
            }
            state.positions.insert(key.partition, 0);
            state.out_of_range.remove(&key.partition);
        }
        Ok(())
    }

    fn position(&self, partition: &PartitionKey) -> Result<i64, BrokerError> {
        self.state
            .lock()
            .unwrap()
            .positions
            .get(&partition.partition)
            .copied()
            .ok_or_else(|| BrokerError::Unavailable(format!("no position for {partition}")))
    }

    fn poll(&mut self, _timeout: Duration, max_records: usize) -> Result<Vec<Record>, BrokerError> {
        let mut state = self.state.lock().unwrap();
        if let Some(partition) = state.out_of_range.iter().next().copied() {
            return Err(BrokerError::OffsetOutOfRange { partition: Some(partition) });
        }
        let logs = self.cluster.logs.lock().unwrap();
        let assignment = state.assignment.clone();
        let mut batch = Vec::new();
        for key in assignment {
            let log = match logs.get(&key.partition) {
                Some(log) => log,
                None => continue,
            };
            let mut position = state.positions.get(&key.partition).copied().unwrap_or(0);
            while (position as usize) < log.len() && batch.len() < max_records {
                batch.push(log[position as usize].clone());
                position += 1;
            }
            state.positions.insert(key.partition, position);
            if batch.len() >= max_records {
                break;
            }
        }
        Ok(batch)
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.assignment.clear();
        state.positions.clear();
        state.out_of_range.clear();
    }
}

/// In-memory adapter wrapper that counts successful offset persists and can
/// be told to fail them.
#[derive(Default)]
pub struct InstrumentedAdapter {
    inner: InMemoryPersistenceAdapter,
    pub persist_calls: usize,
    pub fail_persists: bool,
}

impl InstrumentedAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceAdapter for InstrumentedAdapter {
    fn open(&mut self) -> Result<(), SidelineError> {
        self.inner.open()
    }

    fn close(&mut self) -> Result<(), SidelineError> {
        self.inner.close()
    }

    fn persist_consumer_offset(
        &mut self,
        consumer_id: &str,
        partition: i32,
        offset: i64,
    ) -> Result<(), SidelineError> {
        if self.fail_persists {
            return Err(SidelineError::Persistence("injected persist failure".into()));
        }
        self.inner.persist_consumer_offset(consumer_id, partition, offset)?;
        self.persist_calls += 1;
        Ok(())
    }

    fn retrieve_consumer_offset(
        &self,
        consumer_id: &str,
        partition: i32,
    ) -> Result<Option<i64>, SidelineError> {
        self.inner.retrieve_consumer_offset(consumer_id, partition)
    }

    fn clear_consumer_offset(&mut self, consumer_id: &str, partition: i32) -> Result<(), SidelineError> {
        self.inner.clear_consumer_offset(consumer_id, partition)
    }

    fn clear_consumer_state(&mut self, consumer_id: &str) -> Result<(), SidelineError> {
        self.inner.clear_consumer_state(consumer_id)
    }

    fn persist_sideline_request(&mut self, payload: SidelinePayload) -> Result<(), SidelineError> {
        self.inner.persist_sideline_request(payload)
    }

    fn retrieve_sideline_request(&self, id: &str) -> Result<Option<SidelinePayload>, SidelineError> {
        self.inner.retrieve_sideline_request(id)
    }

    fn clear_sideline_request(&mut self, id: &str) -> Result<(), SidelineError> {
        self.inner.clear_sideline_request(id)
    }

    fn list_sideline_requests(&self) -> Result<Vec<SidelinePayload>, SidelineError> {
        self.inner.list_sideline_requests()
    }
}

pub fn config(topic: &str, consumer_id: &str) -> SidelineConfig {
    SidelineConfig {
        topic: topic.to_string(),
        consumer_id: consumer_id.to_string(),
        ..SidelineConfig::default()
    }
}

/// Pull records until a fetch comes back empty.
pub fn drain(consumer: &mut SidelineConsumer) -> Vec<Record> {
    let mut records = Vec::new();
    while let Some(record) = consumer.next_record().expect("next_record failed") {
        records.push(record);
    }
    records
}
