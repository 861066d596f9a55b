use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-process approximate-LRU cache with a TTL per entry. "Approximate"
/// because eviction scans access timestamps rather than maintaining an
/// intrusive linked list -- acceptable at the entry counts this tier is
/// sized for (low thousands).
pub struct L1Cache {
    max_entries: usize,
    default_ttl: Duration,
    entries: HashMap<String, Entry>,
}

struct Entry {
    value: Vec<u8>,
    inserted_at: Instant,
    last_access: Instant,
    ttl: Duration,
}

impl L1Cache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        L1Cache { max_entries, default_ttl, entries: HashMap::new() }
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        let expired = match self.entries.get(key) {
            Some(e) => e.inserted_at.elapsed() > e.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        let entry = self.entries.get_mut(key).expect("checked above");
        entry.last_access = Instant::now();
        Some(entry.value.clone())
    }

    pub fn set(&mut self, key: String, value: Vec<u8>, ttl: Option<Duration>) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_fraction(0.1);
        }
        let now = Instant::now();
        self.entries.insert(
            key,
            Entry { value, inserted_at: now, last_access: now, ttl: ttl.unwrap_or(self.default_ttl) },
        );
    }

    pub fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn delete_prefix(&mut self, prefix: &str) {
        self.entries.retain(|k, _| !k.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts roughly `fraction` of entries, oldest-by-last-access first.
    fn evict_fraction(&mut self, fraction: f64) {
        let to_evict = ((self.entries.len() as f64) * fraction).ceil().max(1.0) as usize;
        let mut keys: Vec<(String, Instant)> =
            self.entries.iter().map(|(k, v)| (k.clone(), v.last_access)).collect();
        keys.sort_by_key(|(_, t)| *t);
        for (key, _) in keys.into_iter().take(to_evict) {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let mut c = L1Cache::new(10, Duration::from_secs(60));
        c.set("a".into(), b"hello".to_vec(), None);
        assert_eq!(c.get("a"), Some(b"hello".to_vec()));
    }

    #[test]
    fn expired_entry_is_none() {
        let mut c = L1Cache::new(10, Duration::from_millis(1));
        c.set("a".into(), b"hello".to_vec(), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(c.get("a"), None);
    }

    #[test]
    fn overflow_evicts_roughly_ten_percent() {
        let mut c = L1Cache::new(10, Duration::from_secs(60));
        for i in 0..10 {
            c.set(format!("k{i}"), vec![0], None);
        }
        assert_eq!(c.len(), 10);
        c.set("k10".into(), vec![0], None);
        assert!(c.len() <= 10);
        assert!(c.len() >= 9);
    }

    #[test]
    fn delete_prefix_clears_matching_keys() {
        let mut c = L1Cache::new(10, Duration::from_secs(60));
        c.set("fragment:fda:water".into(), vec![0], None);
        c.set("fragment:ewg:water".into(), vec![0], None);
        c.set("analysis:abc".into(), vec![0], None);
        c.delete_prefix("fragment:");
        assert_eq!(c.len(), 1);
    }
}
