//! Static shard-based partition assignment. Ownership is decided here, by
//! shard index, never negotiated with the broker's group coordinator.

/// Split `partitions` (sorted ascending) into `num_consumers` contiguous
/// ranges of sizes as equal as possible, extras going to the lowest-indexed
/// consumers, and return the range owned by `consumer_index`.
///
/// With 5 partitions and 2 consumers, index 0 owns {0,1,2} and index 1 owns
/// {3,4}; with 4 and 2, index 0 owns {0,1} and index 1 owns {2,3}.
pub fn partitions_for_consumer(partitions: &[i32], num_consumers: u32, consumer_index: u32) -> Vec<i32> {
    assert!(num_consumers >= 1, "num_consumers must be >= 1");
    assert!(consumer_index < num_consumers, "consumer_index out of range");

    let total = partitions.len();
    let n = num_consumers as usize;
    let index = consumer_index as usize;

    let base = total / n;
    let extra = total % n;

    let start = index * base + index.min(extra);
    let size = base + usize::from(index < extra);

    partitions[start..start + size].to_vec()
}
