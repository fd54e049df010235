use std::collections::VecDeque;

use crate::types::Record;

/// Bounded FIFO staging fetched records between broker polls and
/// `next_record`. When full, fetching stops pulling until the caller drains
/// it; records are never dropped on overflow.
#[derive(Debug)]
pub(crate) struct RecordBuffer {
    queue: VecDeque<Record>,
    max_size: usize,
}

impl RecordBuffer {
    pub(crate) fn new(max_size: usize) -> Self {
        Self { queue: VecDeque::with_capacity(max_size.min(1024)), max_size }
    }

    pub(crate) fn push(&mut self, record: Record) {
        debug_assert!(self.queue.len() < self.max_size, "buffer overfilled");
        self.queue.push_back(record);
    }

    pub(crate) fn pop(&mut self) -> Option<Record> {
        self.queue.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// How many more records fit before back-pressure kicks in.
    pub(crate) fn remaining_capacity(&self) -> usize {
        self.max_size.saturating_sub(self.queue.len())
    }

    /// Drop staged records belonging to `partition` of `topic`; used when a
    /// partition is unsubscribed mid-stream.
    pub(crate) fn purge_partition(&mut self, topic: &str, partition: i32) {
        self.queue.retain(|r| !(r.partition == partition && r.topic == topic));
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}
