//! Per-drainer flow state.
//!
//! A bounded LRU map from flow hash to last-seen state, used to compute
//! inter-arrival times. Each drainer owns its own table, so lookups never
//! cross threads; eviction is local, by LRU on insertion at capacity and by
//! idle timeout on hit.

use hashlink::LruCache;

#[derive(Debug, Clone, Copy)]
struct FlowState {
    last_seen_ns: u64,
    packet_count: u64,
}

pub(crate) struct FlowTable {
    entries: LruCache<u64, FlowState>,
    timeout_ns: u64,
}

impl FlowTable {
    pub(crate) fn new(max_entries: usize, timeout_ms: u64) -> Self {
        FlowTable {
            entries: LruCache::new(max_entries),
            timeout_ns: timeout_ms.saturating_mul(1_000_000),
        }
    }

    /// Records a sighting of `hash` at `now_ns` and returns the gap since the
    /// previous sighting in microseconds, clamped to u32. A first sighting,
    /// or one after the idle timeout, restarts the flow and returns 0.
    pub(crate) fn observe(&mut self, hash: u64, now_ns: u64) -> u32 {
        if let Some(state) = self.entries.get_mut(&hash) {
            let gap_ns = now_ns.saturating_sub(state.last_seen_ns);
            if gap_ns <= self.timeout_ns {
                state.last_seen_ns = now_ns;
                state.packet_count += 1;
                return (gap_ns / 1_000).min(u32::MAX as u64) as u32;
            }
        }
        self.entries.insert(
            hash,
            FlowState {
                last_seen_ns: now_ns,
                packet_count: 1,
            },
        );
        0
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn packet_count(&mut self, hash: u64) -> Option<u64> {
        self.entries.get_mut(&hash).map(|s| s.packet_count)
    }
}
