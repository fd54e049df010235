//! Storage contract for committed offsets and sideline-request metadata.
//!
//! The core depends only on this capability set; implementations range from
//! the in-memory adapter (testing) to external key/value stores. The
//! logical keyspace is `offsets/<consumer_id>/<partition> -> i64` plus
//! `sideline/<request_id> -> payload`.

mod memory;

use serde::{Deserialize, Serialize};

pub use memory::InMemoryPersistenceAdapter;

use crate::error::SidelineError;
use crate::state::ConsumerState;

/// Whether a sideline request starts or stops the sidelining of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SidelineRequestType {
    Start,
    Stop,
}

/// Sideline-request metadata stored alongside offsets. The request body is
/// opaque to the core.
#[derive(Debug, Clone, PartialEq)]
pub struct SidelinePayload {
    pub request_type: SidelineRequestType,
    pub id: String,
    pub request: serde_json::Value,
    /// Consumer state captured when the request was first seen.
    pub starting_state: ConsumerState,
    /// Set once the request has been resolved (stop processed).
    pub ending_state: Option<ConsumerState>,
}

/// Capability set the consumer core requires from a backing store.
/// Any operation may fail; failures propagate to the caller of the consumer
/// operation that invoked them.
pub trait PersistenceAdapter: Send {
    /// Prepare the backing store for use.
    fn open(&mut self) -> Result<(), SidelineError>;

    /// Release backing-store resources.
    fn close(&mut self) -> Result<(), SidelineError>;

    fn persist_consumer_offset(
        &mut self,
        consumer_id: &str,
        partition: i32,
        offset: i64,
    ) -> Result<(), SidelineError>;

    fn retrieve_consumer_offset(
        &self,
        consumer_id: &str,
        partition: i32,
    ) -> Result<Option<i64>, SidelineError>;

    fn clear_consumer_offset(&mut self, consumer_id: &str, partition: i32) -> Result<(), SidelineError>;

    /// Clear every persisted offset for `consumer_id`, including partitions
    /// the consumer no longer owns.
    fn clear_consumer_state(&mut self, consumer_id: &str) -> Result<(), SidelineError>;

    fn persist_sideline_request(&mut self, payload: SidelinePayload) -> Result<(), SidelineError>;

    fn retrieve_sideline_request(&self, id: &str) -> Result<Option<SidelinePayload>, SidelineError>;

    fn clear_sideline_request(&mut self, id: &str) -> Result<(), SidelineError>;

    fn list_sideline_requests(&self) -> Result<Vec<SidelinePayload>, SidelineError>;
}
