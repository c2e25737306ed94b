//! Provider selection and failover.
//!
//! The parse path routes premium-then-free-pool with a language heuristic:
//! input containing CJK ideographs prefers Provider-A, everything else
//! prefers Provider-B. The chat gateway uses the free pool only, with a
//! model-name mapping table. Readiness comes from the cached pool-status
//! snapshot, recomputed from live config when the snapshot is missing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::Cache;
use crate::config::{GatewayConfig, ProviderId, Tier};
use crate::upstream::{ChatJson, TokenUsage, UpstreamClient, UpstreamError};

pub const POOL_STATUS_KEY: &str = "pool_status_v2";
const POOL_STATUS_TTL: Duration = Duration::from_secs(300);

/// Total timeout for buffered parse-path upstream calls.
pub const PARSE_CALL_TIMEOUT: Duration = Duration::from_secs(20);

/// True when the text contains any CJK unified ideograph (U+4E00..U+9FFF).
pub fn contains_cjk(s: &str) -> bool {
    s.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// Free-pool readiness snapshot shared through the cache.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PoolStatus {
    pub provider_a_ready: bool,
    pub provider_b_ready: bool,
}

impl PoolStatus {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            provider_a_ready: config.provider_a.is_configured(),
            provider_b_ready: config.provider_b.is_configured(),
        }
    }

    pub fn ready(&self, id: ProviderId) -> bool {
        match id {
            ProviderId::ProviderA => self.provider_a_ready,
            ProviderId::ProviderB => self.provider_b_ready,
            ProviderId::Premium => false,
        }
    }

    pub fn any_ready(&self) -> bool {
        self.provider_a_ready || self.provider_b_ready
    }
}

/// Cached snapshot if present, else computed live. A missing snapshot is
/// not an outage signal; a present-but-falsy entry is.
pub fn pool_status(cache: &dyn Cache, config: &GatewayConfig) -> PoolStatus {
    cache
        .get(POOL_STATUS_KEY)
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_else(|| PoolStatus::from_config(config))
}

/// Recompute from live config and refresh the cache. Called by the
/// pool-status endpoint, which doubles as the self-check.
pub fn refresh_pool_status(cache: &dyn Cache, config: &GatewayConfig) -> PoolStatus {
    let status = PoolStatus::from_config(config);
    if let Ok(raw) = serde_json::to_string(&status) {
        cache.set(POOL_STATUS_KEY, raw, POOL_STATUS_TTL);
    }
    status
}

/// A routed, completed parse-path call.
#[derive(Debug, Clone)]
pub struct RoutedChat {
    pub provider: ProviderId,
    pub tier: Tier,
    pub model: String,
    pub usage: TokenUsage,
    pub value: Value,
}

#[derive(Debug)]
pub enum RouteError {
    /// No provider anywhere (premium included) carries a real key.
    NothingConfigured,
    /// Both free-pool members were ineligible or unconfigured.
    FreePoolNotConfigured,
    /// Last attempted provider failed; error passed through verbatim.
    Upstream {
        provider: ProviderId,
        error: UpstreamError,
    },
}

impl RouteError {
    pub fn code(&self) -> String {
        match self {
            RouteError::NothingConfigured => "deepseek_not_configured".to_string(),
            RouteError::FreePoolNotConfigured => "free_pool_not_configured".to_string(),
            RouteError::Upstream { error, .. } => error.code(),
        }
    }

    /// Sentinels the auto cascade swallows to fall back to local parsers.
    pub fn is_not_configured(&self) -> bool {
        self.code().ends_with("_not_configured")
    }
}

/// Route one buffered JSON call: premium when the caller is allow-listed,
/// otherwise the free pool in language-preference order with failover.
/// Premium failures never surface while the free pool can still serve.
pub async fn route_parse_call(
    client: &UpstreamClient,
    cache: &dyn Cache,
    config: &GatewayConfig,
    premium: bool,
    system_text: &str,
    user_text: &str,
) -> Result<RoutedChat, RouteError> {
    if !config.premium.is_configured()
        && !config.provider_a.is_configured()
        && !config.provider_b.is_configured()
    {
        return Err(RouteError::NothingConfigured);
    }

    if premium && config.premium.is_configured() {
        match client
            .chat_json(&config.premium, system_text, user_text, PARSE_CALL_TIMEOUT)
            .await
        {
            Ok(done) => return Ok(routed(ProviderId::Premium, Tier::Premium, done)),
            Err(err) => {
                tracing::warn!(error = %err, "premium call failed, falling back to free pool");
            }
        }
    }

    let pool = pool_status(cache, config);
    let order = if contains_cjk(user_text) {
        [ProviderId::ProviderA, ProviderId::ProviderB]
    } else {
        [ProviderId::ProviderB, ProviderId::ProviderA]
    };

    let mut last: Option<(ProviderId, UpstreamError)> = None;
    for id in order {
        if !pool.ready(id) {
            continue;
        }
        match client
            .chat_json(config.provider(id), system_text, user_text, PARSE_CALL_TIMEOUT)
            .await
        {
            Ok(done) => return Ok(routed(id, Tier::Free, done)),
            Err(UpstreamError::NotConfigured) => continue,
            Err(err) => {
                tracing::warn!(provider = id.as_str(), error = %err, "free pool attempt failed");
                last = Some((id, err));
            }
        }
    }

    match last {
        Some((provider, error)) => Err(RouteError::Upstream { provider, error }),
        None => Err(RouteError::FreePoolNotConfigured),
    }
}

fn routed(provider: ProviderId, tier: Tier, done: ChatJson) -> RoutedChat {
    RoutedChat {
        provider,
        tier,
        model: done.model,
        usage: done.usage,
        value: done.value,
    }
}

/// Chat-gateway route: the target provider and the model to send upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRoute {
    pub provider: ProviderId,
    pub model: String,
}

/// Model-name mapping with readiness failover. `None` when neither
/// free-pool provider is ready (the gateway never touches premium).
pub fn route_chat(
    config: &GatewayConfig,
    pool: &PoolStatus,
    requested_model: &str,
    input_text: &str,
) -> Option<ChatRoute> {
    let requested = requested_model.trim();
    let lower = requested.to_ascii_lowercase();

    let (preferred, model) = if lower.contains("deepseek") {
        (ProviderId::ProviderA, config.provider_a.model.clone())
    } else if lower.contains("llama") {
        (ProviderId::ProviderB, config.provider_b.model.clone())
    } else if contains_cjk(input_text) {
        (ProviderId::ProviderA, echo_or_default(requested, config, ProviderId::ProviderA))
    } else {
        (ProviderId::ProviderB, echo_or_default(requested, config, ProviderId::ProviderB))
    };

    if pool.ready(preferred) {
        return Some(ChatRoute {
            provider: preferred,
            model,
        });
    }
    // The requested name belongs to the preferred provider's namespace, so
    // failover always switches to the alternate's default model.
    let alternate = preferred.free_pool_sibling()?;
    if pool.ready(alternate) {
        return Some(ChatRoute {
            provider: alternate,
            model: config.provider(alternate).model.clone(),
        });
    }
    None
}

fn echo_or_default(requested: &str, config: &GatewayConfig, id: ProviderId) -> String {
    if requested.is_empty() {
        config.provider(id).model.clone()
    } else {
        requested.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::ConfigOverrides;

    fn config(a_key: &str, b_key: &str) -> GatewayConfig {
        let mut cfg = GatewayConfig::resolve(ConfigOverrides::default());
        cfg.provider_a.api_key = a_key.to_string();
        cfg.provider_a.model = "model-a".to_string();
        cfg.provider_b.api_key = b_key.to_string();
        cfg.provider_b.model = "model-b".to_string();
        cfg.premium.api_key = String::new();
        cfg
    }

    #[test]
    fn cjk_detection_covers_the_unified_block() {
        assert!(contains_cjk("解析这段文字"));
        assert!(contains_cjk("mixed 中 text"));
        assert!(contains_cjk("\u{4e00}"));
        assert!(contains_cjk("\u{9fff}"));
        assert!(!contains_cjk("plain ascii"));
        assert!(!contains_cjk("ひらがな"));
        assert!(!contains_cjk(""));
    }

    #[test]
    fn pool_status_prefers_cached_snapshot() {
        let cache = MemoryCache::default();
        let cfg = config("key-a", "key-b");
        // Cached snapshot wins even when config says both are up.
        cache.set(
            POOL_STATUS_KEY,
            r#"{"provider_a_ready":false,"provider_b_ready":true}"#.to_string(),
            Duration::from_secs(60),
        );
        let status = pool_status(&cache, &cfg);
        assert!(!status.provider_a_ready);
        assert!(status.provider_b_ready);
    }

    #[test]
    fn pool_status_falls_back_to_config_when_missing() {
        let cache = MemoryCache::default();
        let status = pool_status(&cache, &config("key-a", ""));
        assert!(status.provider_a_ready);
        assert!(!status.provider_b_ready);
    }

    #[test]
    fn refresh_writes_the_snapshot() {
        let cache = MemoryCache::default();
        refresh_pool_status(&cache, &config("", "key-b"));
        let cached = cache.get(POOL_STATUS_KEY).expect("snapshot cached");
        let parsed: PoolStatus = serde_json::from_str(&cached).expect("snapshot decodes");
        assert!(!parsed.provider_a_ready);
        assert!(parsed.provider_b_ready);
    }

    #[test]
    fn chat_mapping_table() {
        let cfg = config("key-a", "key-b");
        let pool = PoolStatus {
            provider_a_ready: true,
            provider_b_ready: true,
        };

        let r = route_chat(&cfg, &pool, "deepseek-chat", "hello").expect("route");
        assert_eq!(r, ChatRoute { provider: ProviderId::ProviderA, model: "model-a".into() });

        let r = route_chat(&cfg, &pool, "llama-3.1-8b", "hello").expect("route");
        assert_eq!(r, ChatRoute { provider: ProviderId::ProviderB, model: "model-b".into() });

        // Generic model, Chinese input: Provider-A echoes the request.
        let r = route_chat(&cfg, &pool, "qwen-plus", "你好").expect("route");
        assert_eq!(r, ChatRoute { provider: ProviderId::ProviderA, model: "qwen-plus".into() });

        // Generic model, Latin input: Provider-B echoes the request.
        let r = route_chat(&cfg, &pool, "gpt-x", "hello").expect("route");
        assert_eq!(r, ChatRoute { provider: ProviderId::ProviderB, model: "gpt-x".into() });

        // Empty model falls to the preferred provider's default.
        let r = route_chat(&cfg, &pool, "", "hello").expect("route");
        assert_eq!(r, ChatRoute { provider: ProviderId::ProviderB, model: "model-b".into() });
    }

    #[test]
    fn chat_routing_fails_over_to_the_ready_sibling() {
        let cfg = config("key-a", "key-b");
        let pool = PoolStatus {
            provider_a_ready: false,
            provider_b_ready: true,
        };
        let r = route_chat(&cfg, &pool, "deepseek-chat", "hello").expect("route");
        assert_eq!(r, ChatRoute { provider: ProviderId::ProviderB, model: "model-b".into() });

        let none_ready = PoolStatus::default();
        assert!(route_chat(&cfg, &none_ready, "deepseek-chat", "hi").is_none());
    }

    #[tokio::test]
    async fn route_with_nothing_configured_is_the_sentinel() {
        let cache = MemoryCache::default();
        let cfg = config("", "");
        let client = UpstreamClient::new(reqwest::Client::new());
        let err = route_parse_call(&client, &cache, &cfg, false, "sys", "user")
            .await
            .expect_err("nothing configured");
        assert_eq!(err.code(), "deepseek_not_configured");
        assert!(err.is_not_configured());
    }

    #[tokio::test]
    async fn stale_false_snapshot_blocks_the_free_pool() {
        let cache = MemoryCache::default();
        let cfg = config("key-a", "key-b");
        cache.set(
            POOL_STATUS_KEY,
            r#"{"provider_a_ready":false,"provider_b_ready":false}"#.to_string(),
            Duration::from_secs(60),
        );
        let client = UpstreamClient::new(reqwest::Client::new());
        let err = route_parse_call(&client, &cache, &cfg, false, "sys", "user")
            .await
            .expect_err("pool blocked");
        assert_eq!(err.code(), "free_pool_not_configured");
    }
}
