//! Bounded observation counts across a stream of frames.

use std::collections::HashMap;

/// Default number of distinct plates remembered
pub const MAX_RECENT: usize = 10;

#[derive(Debug, Clone)]
pub struct DetectionMemory {
    capacity: usize,
    counts: HashMap<String, u32>,
}

impl Default for DetectionMemory {
    fn default() -> Self {
        Self::new(MAX_RECENT)
    }
}

impl DetectionMemory {
    /// A capacity of zero is raised to one so the latest plate is always kept
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            counts: HashMap::with_capacity(capacity + 1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count one more observation of `plate` and return its new count.
    ///
    /// When the map grows past capacity, the entry with the lowest count is
    /// evicted (ties broken by plate string). The plate just recorded is never
    /// the one evicted.
    pub fn record(&mut self, plate: &str) -> u32 {
        let count = {
            let entry = self.counts.entry(plate.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };

        while self.counts.len() > self.capacity {
            let victim = self
                .counts
                .iter()
                .filter(|(p, _)| p.as_str() != plate)
                .min_by(|(pa, ca), (pb, cb)| ca.cmp(cb).then_with(|| pa.cmp(pb)))
                .map(|(p, _)| p.clone());

            match victim {
                Some(p) => {
                    self.counts.remove(&p);
                }
                None => break,
            }
        }

        count
    }

    pub fn count(&self, plate: &str) -> u32 {
        self.counts.get(plate).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Current counts, highest first
    pub fn snapshot(&self) -> Vec<(String, u32)> {
        let mut entries: Vec<(String, u32)> =
            self.counts.iter().map(|(p, c)| (p.clone(), *c)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts() {
        let mut memory = DetectionMemory::default();
        assert_eq!(memory.record("12가3456"), 1);
        assert_eq!(memory.record("12가3456"), 2);
        assert_eq!(memory.record("34나5678"), 1);
        assert_eq!(memory.count("12가3456"), 2);
        assert_eq!(memory.count("99다9999"), 0);
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn test_bounded_by_capacity() {
        let mut memory = DetectionMemory::new(MAX_RECENT);
        for i in 0..50 {
            memory.record(&format!("{:02}가{:04}", i % 100, i));
            assert!(memory.len() <= MAX_RECENT);
        }
        assert_eq!(memory.len(), MAX_RECENT);
    }

    #[test]
    fn test_evicts_lowest_count() {
        let mut memory = DetectionMemory::new(2);
        memory.record("11가1111");
        memory.record("11가1111");
        memory.record("22나2222");
        memory.record("33다3333");

        assert_eq!(memory.len(), 2);
        assert_eq!(memory.count("11가1111"), 2);
        assert_eq!(memory.count("22나2222"), 0);
        assert_eq!(memory.count("33다3333"), 1);
    }

    #[test]
    fn test_new_entry_survives_eviction() {
        let mut memory = DetectionMemory::new(1);
        memory.record("11가1111");
        memory.record("11가1111");
        assert_eq!(memory.record("22나2222"), 1);
        assert_eq!(memory.count("22나2222"), 1);
        assert_eq!(memory.count("11가1111"), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut memory = DetectionMemory::new(0);
        assert_eq!(memory.capacity(), 1);
        assert_eq!(memory.record("11가1111"), 1);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_clear_and_snapshot() {
        let mut memory = DetectionMemory::default();
        memory.record("22나2222");
        memory.record("11가1111");
        memory.record("11가1111");

        assert_eq!(
            memory.snapshot(),
            vec![("11가1111".to_string(), 2), ("22나2222".to_string(), 1)]
        );

        memory.clear();
        assert!(memory.is_empty());
    }
}
