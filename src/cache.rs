//! TTL key/value cache.
//!
//! Backing store for rate-limit buckets and the pool-status snapshot. The
//! contract deliberately omits atomic increment: the rate limiter tolerates
//! set-after-get slippage, so any store with plain get/set semantics works.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String, ttl: Duration);
}

/// In-process store with per-entry expiry. Expired entries are invisible to
/// `get` and swept opportunistically once the map grows.
#[derive(Default)]
pub struct MemoryCache {
    inner: RwLock<HashMap<String, Entry>>,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

const SWEEP_THRESHOLD: usize = 256;

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let guard = self.inner.read().ok()?;
        let entry = guard.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        let Ok(mut guard) = self.inner.write() else {
            return;
        };
        if guard.len() >= SWEEP_THRESHOLD {
            let now = Instant::now();
            guard.retain(|_, e| e.expires_at > now);
        }
        guard.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache = MemoryCache::default();
        cache.set("k", "v".into(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn overwrite_replaces_value() {
        let cache = MemoryCache::default();
        cache.set("k", "1".into(), Duration::from_secs(60));
        cache.set("k", "2".into(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("2".to_string()));
    }

    #[test]
    fn expired_entries_are_absent() {
        let cache = MemoryCache::default();
        cache.set("k", "v".into(), Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let cache = MemoryCache::default();
        for i in 0..SWEEP_THRESHOLD {
            cache.set(&format!("old-{i}"), "x".into(), Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(10));
        cache.set("fresh", "y".into(), Duration::from_secs(60));
        assert_eq!(cache.get("fresh"), Some("y".to_string()));
        assert!(cache.inner.read().unwrap().len() < SWEEP_THRESHOLD);
    }
}
