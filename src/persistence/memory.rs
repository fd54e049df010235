use std::collections::HashMap;

use super::{PersistenceAdapter, SidelinePayload};
use crate::error::SidelineError;

/// Reference adapter backed by two process-local maps. Never fails, loses
/// all state across restarts, and clears both maps on `close`.
#[derive(Debug, Default)]
pub struct InMemoryPersistenceAdapter {
    consumer_offsets: HashMap<(String, i32), i64>,
    sideline_requests: HashMap<String, SidelinePayload>,
}

impl InMemoryPersistenceAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceAdapter for InMemoryPersistenceAdapter {
    fn open(&mut self) -> Result<(), SidelineError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), SidelineError> {
        self.consumer_offsets.clear();
        self.sideline_requests.clear();
        Ok(())
    }

    fn persist_consumer_offset(
        &mut self,
        consumer_id: &str,
        partition: i32,
        offset: i64,
    ) -> Result<(), SidelineError> {
        self.consumer_offsets.insert((consumer_id.to_string(), partition), offset);
        Ok(())
    }

    fn retrieve_consumer_offset(
        &self,
        consumer_id: &str,
        partition: i32,
    ) -> Result<Option<i64>, SidelineError> {
        Ok(self.consumer_offsets.get(&(consumer_id.to_string(), partition)).copied())
    }

    fn clear_consumer_offset(&mut self, consumer_id: &str, partition: i32) -> Result<(), SidelineError> {
        self.consumer_offsets.remove(&(consumer_id.to_string(), partition));
        Ok(())
    }

    fn clear_consumer_state(&mut self, consumer_id: &str) -> Result<(), SidelineError> {
        self.consumer_offsets.retain(|(id, _), _| id != consumer_id);
        Ok(())
    }

    fn persist_sideline_request(&mut self, payload: SidelinePayload) -> Result<(), SidelineError> {
        self.sideline_requests.insert(payload.id.clone(), payload);
        Ok(())
    }

    fn retrieve_sideline_request(&self, id: &str) -> Result<Option<SidelinePayload>, SidelineError> {
        Ok(self.sideline_requests.get(id).cloned())
    }

    fn clear_sideline_request(&mut self, id: &str) -> Result<(), SidelineError> {
        self.sideline_requests.remove(id);
        Ok(())
    }

    fn list_sideline_requests(&self) -> Result<Vec<SidelinePayload>, SidelineError> {
        let mut requests: Vec<SidelinePayload> = self.sideline_requests.values().cloned().collect();
        requests.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(requests)
    }
}
