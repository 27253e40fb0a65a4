//! Run-scoped duplicate suppression.

use crate::types::AssetRecord;
use std::collections::HashSet;
use std::sync::Mutex;

/// Set of dedup keys seen so far in a run, shared by every provider task.
///
/// First admission of a key wins; every later admission of the same key is
/// dropped, regardless of which provider or page it came from.
pub struct DedupSet {
    seen: Mutex<HashSet<String>>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Returns true exactly once per unique dedup key.
    pub fn admit(&self, record: &AssetRecord) -> bool {
        let key = record.dedup_key();
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            // a poisoned set only means another task panicked mid-insert;
            // the set itself is still usable
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.insert(key)
    }

    pub fn len(&self) -> usize {
        match self.seen.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_endpoint_from_two_sources_collapses() {
        let dedup = DedupSet::new();
        let a = AssetRecord::new("shodan")
            .with_ip("93.184.216.34".parse().unwrap())
            .with_port(443);
        let b = AssetRecord::new("censys")
            .with_ip("93.184.216.34".parse().unwrap())
            .with_port(443);

        assert!(dedup.admit(&a));
        assert!(!dedup.admit(&b));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn distinct_ports_are_distinct_keys() {
        let dedup = DedupSet::new();
        let a = AssetRecord::new("shodan")
            .with_ip("93.184.216.34".parse().unwrap())
            .with_port(80);
        let b = AssetRecord::new("shodan")
            .with_ip("93.184.216.34".parse().unwrap())
            .with_port(443);

        assert!(dedup.admit(&a));
        assert!(dedup.admit(&b));
    }

    #[test]
    fn host_casing_collapses() {
        let dedup = DedupSet::new();
        assert!(dedup.admit(&AssetRecord::new("google").with_host("Example.COM")));
        assert!(!dedup.admit(&AssetRecord::new("google").with_host("example.com.")));
    }

    #[test]
    fn concurrent_admission_admits_each_key_once() {
        use std::sync::Arc;

        let dedup = Arc::new(DedupSet::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let dedup = Arc::clone(&dedup);
            handles.push(std::thread::spawn(move || {
                let mut admitted = 0usize;
                for i in 0..100u16 {
                    let record = AssetRecord::new("shodan")
                        .with_ip("10.0.0.1".parse().unwrap())
                        .with_port(i);
                    if dedup.admit(&record) {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100, "each key admitted exactly once across threads");
    }
}
