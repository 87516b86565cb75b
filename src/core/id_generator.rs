// Snowflake-style ID generation
// 64-bit ID format: [timestamp:42][node_id:10][sequence:12]
// Roughly time-ordered, 1024 nodes, 4096 ids per millisecond per node.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
struct GeneratorState {
    last_timestamp: u64,
    sequence: u64,
}

#[derive(Debug)]
pub struct IdGenerator {
    node_id: u16,
    // Timestamp and sequence are claimed together under one lock; racing
    // callers in the same millisecond each get a distinct sequence slot.
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    pub fn new(node_id: u16) -> Self {
        assert!(node_id < 1024, "node id must be less than 1024");

        Self {
            node_id,
            state: Mutex::new(GeneratorState {
                last_timestamp: 0,
                sequence: 0,
            }),
        }
    }

    /// Generate the next unique id.
    pub fn next_id(&self) -> i64 {
        loop {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);

            let mut state = self.state.lock().expect("id generator state poisoned");

            if now > state.last_timestamp {
                state.last_timestamp = now;
                state.sequence = 0;
            } else if state.sequence >= 4095 {
                // Sequence exhausted for this millisecond, wait for the next one
                drop(state);
                std::thread::sleep(std::time::Duration::from_millis(1));
                continue;
            } else {
                // Same millisecond, or the clock stepped backwards; keep
                // counting against the last claimed timestamp.
                state.sequence += 1;
            }

            let id = ((state.last_timestamp & 0x3FF_FFFF_FFFF) << 22)
                | ((self.node_id as u64) << 12)
                | (state.sequence & 0xFFF);

            return id as i64;
        }
    }

    /// Millisecond timestamp embedded in an id.
    pub fn extract_timestamp(id: i64) -> u64 {
        (id as u64) >> 22
    }

    pub fn node_id(&self) -> u16 {
        self.node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn ids_are_unique_and_ordered() {
        let generator = IdGenerator::new(7);

        let mut ids: Vec<i64> = (0..1000).map(|_| generator.next_id()).collect();
        let unsorted = ids.clone();
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), 1000, "ids must be unique");
        assert_eq!(unsorted, ids, "ids must be generated in ascending order");
    }

    #[test]
    fn concurrent_callers_never_collide() {
        let generator = Arc::new(IdGenerator::new(3));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || {
                    (0..20_000).map(|_| generator.next_id()).collect::<Vec<i64>>()
                })
            })
            .collect();

        let mut ids: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("generator thread panicked"))
            .collect();

        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total, "duplicate ids generated under concurrency");
    }

    #[test]
    fn embedded_timestamp_is_sane() {
        let generator = IdGenerator::new(0);
        let before = crate::core::current_time_millis() as u64;
        let id = generator.next_id();
        let after = crate::core::current_time_millis() as u64;

        let ts = IdGenerator::extract_timestamp(id);
        assert!(ts >= before && ts <= after);
    }
}
