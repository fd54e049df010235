use std::collections::BTreeMap;

use crate::types::PartitionKey;

/// Immutable snapshot of {partition -> last finished offset}, produced by
/// flushing the consumer's offset managers. The latest flushed snapshot is
/// the source of truth for what has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsumerState {
    offsets: BTreeMap<PartitionKey, i64>,
}

impl ConsumerState {
    pub fn new(offsets: BTreeMap<PartitionKey, i64>) -> Self {
        Self { offsets }
    }

    pub fn get(&self, key: &PartitionKey) -> Option<i64> {
        self.offsets.get(key).copied()
    }

    pub fn contains(&self, key: &PartitionKey) -> bool {
        self.offsets.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Entries in partition-key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PartitionKey, i64)> {
        self.offsets.iter().map(|(key, offset)| (key, *offset))
    }
}

impl FromIterator<(PartitionKey, i64)> for ConsumerState {
    fn from_iter<I: IntoIterator<Item = (PartitionKey, i64)>>(iter: I) -> Self {
        Self { offsets: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural() {
        let a: ConsumerState =
            [(PartitionKey::new("t", 0), 4), (PartitionKey::new("t", 1), -1)].into_iter().collect();
        let b: ConsumerState =
            [(PartitionKey::new("t", 1), -1), (PartitionKey::new("t", 0), 4)].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, ConsumerState::default());
    }

    #[test]
    fn lookup_and_iteration() {
        let state: ConsumerState = [(PartitionKey::new("t", 2), 9)].into_iter().collect();
        assert_eq!(state.get(&PartitionKey::new("t", 2)), Some(9));
        assert_eq!(state.get(&PartitionKey::new("t", 3)), None);
        assert!(state.contains(&PartitionKey::new("t", 2)));
        assert_eq!(state.len(), 1);
        assert_eq!(state.iter().count(), 1);
    }
}
