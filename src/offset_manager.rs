use std::collections::BTreeSet;

use log::warn;

/// Emit a warning once the out-of-order set first reaches this size.
/// Unbounded growth here means an upstream acker has stalled on an early
/// offset; entries are never dropped, that would break at-least-once.
const OUT_OF_ORDER_WARN_THRESHOLD: usize = 10_000;

/// Tracks started and finished offsets for a single partition and computes
/// the highest contiguous finished offset across out-of-order
/// acknowledgements.
///
/// Not safe for concurrent use; the consumer serializes operations per
/// partition. Managers for different partitions are independent.
#[derive(Debug)]
pub struct PartitionOffsetManager {
    /// Diagnostic namespace, usually `topic-partition`.
    label: String,
    /// Started but not yet finished offsets.
    tracked: BTreeSet<i64>,
    /// Finished offsets that cannot be collapsed into the contiguous prefix
    /// yet because an earlier offset is still outstanding.
    finished_out_of_order: BTreeSet<i64>,
    /// Highest offset X such that everything up to and including X finished.
    last_finished: i64,
    /// Highest offset ever passed to `start_offset`.
    last_started: i64,
}

impl PartitionOffsetManager {
    /// `starting_offset` is the last offset already finished before this
    /// manager existed: the last persisted committed offset, or -1 when
    /// nothing was ever finished.
    pub fn new(label: impl Into<String>, starting_offset: i64) -> Self {
        Self {
            label: label.into(),
            tracked: BTreeSet::new(),
            finished_out_of_order: BTreeSet::new(),
            last_finished: starting_offset,
            last_started: starting_offset,
        }
    }

    /// Record that `offset` was handed out for processing.
    /// Duplicate starts are idempotent; starting below the current high
    /// water mark is tolerated but suspicious.
    pub fn start_offset(&mut self, offset: i64) {
        self.tracked.insert(offset);
        if offset >= self.last_started {
            self.last_started = offset;
        } else {
            warn!(
                "[{}] offset {} started out of order (last started {})",
                self.label, offset, self.last_started
            );
        }
    }

    /// Record that `offset` finished processing. Finishing an offset that
    /// was never started (or finishing twice) is a logged no-op.
    pub fn finish_offset(&mut self, offset: i64) {
        let earliest = match self.tracked.first() {
            Some(first) => *first,
            None => {
                warn!("[{}] acked offset {} but nothing is tracked", self.label, offset);
                return;
            }
        };
        if !self.tracked.remove(&offset) {
            warn!("[{}] acked untracked offset {}", self.label, offset);
            return;
        }

        if offset > earliest {
            // An earlier offset is still outstanding; park this one.
            self.finished_out_of_order.insert(offset);
            if self.finished_out_of_order.len() == OUT_OF_ORDER_WARN_THRESHOLD {
                warn!(
                    "[{}] {} finished offsets waiting out of order; an early offset is stalled",
                    self.label,
                    self.finished_out_of_order.len()
                );
            }
            return;
        }

        // The earliest outstanding offset finished: the contiguous prefix
        // advances through it and any directly adjacent parked offsets.
        let mut collapsed = offset;
        let mut next = offset + 1;
        while self.finished_out_of_order.first() == Some(&next) {
            self.finished_out_of_order.remove(&next);
            collapsed = next;
            next += 1;
        }
        if collapsed > self.last_finished {
            self.last_finished = collapsed;
        }
    }

    /// Highest offset X such that every offset up to X has been finished.
    pub fn last_finished_offset(&self) -> i64 {
        self.last_finished
    }

    /// The offset a fresh read of this partition would seek to minus zero:
    /// the highest started offset, or one past the last finished when
    /// nothing has been started yet.
    pub fn last_started_offset(&self) -> i64 {
        self.last_started.max(self.last_finished + 1)
    }

    /// How many started offsets are still outstanding.
    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    /// How many finished offsets are parked behind an unfinished one.
    pub fn finished_out_of_order_len(&self) -> usize {
        self.finished_out_of_order.len()
    }
}
