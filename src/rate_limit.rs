//! Per-IP fixed-window rate limiting.
//!
//! One bucket per (client ip, wall-clock minute), counted in the shared
//! cache. The read-increment-write sequence is not atomic; concurrent
//! requests may under-count within a window, which is accepted behavior.
//! Callers needing strict limits should swap in an atomic-counter store.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use actix_web::HttpRequest;

use crate::cache::Cache;

/// Buckets outlive their window by a little slack so late writes still land.
const BUCKET_TTL: Duration = Duration::from_secs(70);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { count: u32 },
    Limited { limit: u32 },
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn Cache>,
    limit_per_minute: u32,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn Cache>, limit_per_minute: u32) -> Self {
        Self {
            cache,
            limit_per_minute,
        }
    }

    pub fn limit_per_minute(&self) -> u32 {
        self.limit_per_minute
    }

    pub fn check(&self, ip: &str) -> RateDecision {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.check_at(ip, now)
    }

    /// Window logic with an injectable clock, for deterministic tests.
    pub fn check_at(&self, ip: &str, epoch_secs: u64) -> RateDecision {
        let key = bucket_key(ip, epoch_secs / 60);
        let count = self
            .cache
            .get(&key)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
            .saturating_add(1);
        self.cache.set(&key, count.to_string(), BUCKET_TTL);
        if count > self.limit_per_minute {
            RateDecision::Limited {
                limit: self.limit_per_minute,
            }
        } else {
            RateDecision::Allowed { count }
        }
    }
}

fn bucket_key(ip: &str, minute: u64) -> String {
    format!("rl:{:x}:{}", md5::compute(ip.as_bytes()), minute)
}

/// Best-effort client IP: proxy headers first, then the transport peer.
pub fn client_ip(req: &HttpRequest) -> String {
    for name in ["CF-Connecting-IP", "X-Real-IP"] {
        if let Some(v) = header_str(req, name) {
            return v;
        }
    }
    if let Some(fwd) = header_str(req, "X-Forwarded-For") {
        if let Some(first) = fwd.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_str(req: &HttpRequest, name: &str) -> Option<String> {
    let v = req.headers().get(name)?.to_str().ok()?.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use actix_web::test::TestRequest;

    fn limiter(limit: u32) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCache::default()), limit)
    }

    #[test]
    fn third_request_over_limit_two_is_rejected() {
        let rl = limiter(2);
        assert_eq!(rl.check_at("1.2.3.4", 600), RateDecision::Allowed { count: 1 });
        assert_eq!(rl.check_at("1.2.3.4", 610), RateDecision::Allowed { count: 2 });
        assert_eq!(rl.check_at("1.2.3.4", 620), RateDecision::Limited { limit: 2 });
    }

    #[test]
    fn next_minute_opens_a_fresh_bucket() {
        let rl = limiter(1);
        assert!(matches!(rl.check_at("1.2.3.4", 59), RateDecision::Allowed { .. }));
        assert!(matches!(rl.check_at("1.2.3.4", 59), RateDecision::Limited { .. }));
        assert!(matches!(rl.check_at("1.2.3.4", 60), RateDecision::Allowed { .. }));
    }

    #[test]
    fn ips_do_not_share_buckets() {
        let rl = limiter(1);
        assert!(matches!(rl.check_at("1.1.1.1", 0), RateDecision::Allowed { .. }));
        assert!(matches!(rl.check_at("2.2.2.2", 0), RateDecision::Allowed { .. }));
    }

    #[test]
    fn bucket_key_hashes_the_ip() {
        let key = bucket_key("1.2.3.4", 7);
        assert!(key.starts_with("rl:"));
        assert!(key.ends_with(":7"));
        // md5 hex digest between the separators
        assert_eq!(key.split(':').nth(1).map(str::len), Some(32));
    }

    #[test]
    fn client_ip_prefers_proxy_headers() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "9.9.9.9, 10.0.0.1"))
            .insert_header(("X-Real-IP", "8.8.8.8"))
            .to_http_request();
        assert_eq!(client_ip(&req), "8.8.8.8");

        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "9.9.9.9, 10.0.0.1"))
            .to_http_request();
        assert_eq!(client_ip(&req), "9.9.9.9");

        let req = TestRequest::default()
            .insert_header(("CF-Connecting-IP", "7.7.7.7"))
            .insert_header(("X-Real-IP", "8.8.8.8"))
            .to_http_request();
        assert_eq!(client_ip(&req), "7.7.7.7");
    }

    #[test]
    fn client_ip_without_headers_or_peer_is_unknown() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(client_ip(&req), "unknown");
    }
}
