//! Gateway configuration.
//!
//! Every setting resolves in the same order: explicit override value, then
//! environment variable(s), then a hard-coded default. A value that starts
//! with the `REPLACE_WITH_` placeholder counts as absent at every level, so
//! template config files never leak into readiness checks.

use std::path::PathBuf;

use serde::Serialize;

/// Prefix marking a setting as "not filled in yet".
pub const PLACEHOLDER_PREFIX: &str = "REPLACE_WITH_";

/// Identity of an upstream provider slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    ProviderA,
    ProviderB,
    Premium,
}

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::ProviderA => "provider-a",
            ProviderId::ProviderB => "provider-b",
            ProviderId::Premium => "premium",
        }
    }

    /// The other member of the free pool. Premium has no sibling.
    pub fn free_pool_sibling(self) -> Option<ProviderId> {
        match self {
            ProviderId::ProviderA => Some(ProviderId::ProviderB),
            ProviderId::ProviderB => Some(ProviderId::ProviderA),
            ProviderId::Premium => None,
        }
    }
}

/// Billing tier a request was served under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
        }
    }
}

/// One upstream provider slot: OpenAI-compatible base URL plus credentials.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub tier: Tier,
}

impl ProviderConfig {
    /// A provider is usable only with a real key: non-empty and not the
    /// placeholder sentinel.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.api_key.starts_with(PLACEHOLDER_PREFIX)
    }
}

/// Explicit values taking precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_keys: Option<String>,
    pub parse_key: Option<String>,
    pub rate_limit_per_minute: Option<u32>,
    pub log_dir: Option<PathBuf>,
    pub provider_a: ProviderOverrides,
    pub provider_b: ProviderOverrides,
    pub premium: ProviderOverrides,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Resolved process-wide configuration, built once at startup and shared
/// through the app state.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bearer tokens granting premium-tier routing on the parse surface.
    pub api_keys: Vec<String>,
    /// When set, every parse request must present this key.
    pub parse_key: Option<String>,
    pub rate_limit_per_minute: u32,
    pub log_dir: PathBuf,
    pub provider_a: ProviderConfig,
    pub provider_b: ProviderConfig,
    pub premium: ProviderConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::resolve(ConfigOverrides::default())
    }

    pub fn resolve(ov: ConfigOverrides) -> Self {
        let api_keys = resolve_setting(ov.api_keys.as_deref(), &["PS_API_KEYS"], "");
        let api_keys = api_keys
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let parse_key = resolve_setting(
            ov.parse_key.as_deref(),
            &["PS_PARSE_KEY", "PARSE_API_KEY"],
            "",
        );
        let parse_key = if parse_key.is_empty() {
            None
        } else {
            Some(parse_key)
        };

        let rate_limit_per_minute = ov.rate_limit_per_minute.unwrap_or_else(|| {
            resolve_setting(None, &["PS_RATE_LIMIT_PER_MINUTE"], "10")
                .parse()
                .unwrap_or(10)
        });

        let log_dir = ov.log_dir.unwrap_or_else(|| {
            PathBuf::from(resolve_setting(None, &["PS_LOG_DIR"], "runtime/log"))
        });

        Self {
            api_keys,
            parse_key,
            rate_limit_per_minute,
            log_dir,
            provider_a: resolve_provider(
                ProviderId::ProviderA,
                Tier::Free,
                &ov.provider_a,
                &["SILICONFLOW_API_KEY"],
                &["SILICONFLOW_BASE_URL"],
                &["SILICONFLOW_MODEL"],
                "https://api.siliconflow.cn/v1",
                "deepseek-ai/DeepSeek-V3",
            ),
            provider_b: resolve_provider(
                ProviderId::ProviderB,
                Tier::Free,
                &ov.provider_b,
                &["GROQ_API_KEY"],
                &["GROQ_BASE_URL"],
                &["GROQ_MODEL"],
                "https://api.groq.com/openai/v1",
                "llama-3.3-70b-versatile",
            ),
            premium: resolve_provider(
                ProviderId::Premium,
                Tier::Premium,
                &ov.premium,
                &["DEEPSEEK_API_KEY"],
                &["DEEPSEEK_BASE_URL"],
                &["DEEPSEEK_MODEL"],
                "https://api.deepseek.com/v1",
                "deepseek-chat",
            ),
        }
    }

    pub fn provider(&self, id: ProviderId) -> &ProviderConfig {
        match id {
            ProviderId::ProviderA => &self.provider_a,
            ProviderId::ProviderB => &self.provider_b,
            ProviderId::Premium => &self.premium,
        }
    }

    /// Whether a bearer token is on the premium allow-list. Every candidate
    /// is compared in constant time; the scan itself never early-returns.
    pub fn is_premium_token(&self, token: &str) -> bool {
        let mut found = false;
        for key in &self.api_keys {
            found |= ct_eq(key.as_bytes(), token.as_bytes());
        }
        found
    }
}

#[allow(clippy::too_many_arguments)]
fn resolve_provider(
    id: ProviderId,
    tier: Tier,
    ov: &ProviderOverrides,
    key_envs: &[&str],
    url_envs: &[&str],
    model_envs: &[&str],
    default_url: &str,
    default_model: &str,
) -> ProviderConfig {
    let base_url = resolve_setting(ov.base_url.as_deref(), url_envs, default_url);
    ProviderConfig {
        id,
        api_key: resolve_setting(ov.api_key.as_deref(), key_envs, ""),
        base_url: base_url.trim_end_matches('/').to_string(),
        model: resolve_setting(ov.model.as_deref(), model_envs, default_model),
        tier,
    }
}

/// Override value if usable, else the first usable environment variable,
/// else the default. Placeholder-prefixed values are skipped everywhere.
fn resolve_setting(override_val: Option<&str>, env_keys: &[&str], default: &str) -> String {
    if let Some(v) = override_val {
        let v = v.trim();
        if usable(v) {
            return v.to_string();
        }
    }
    for key in env_keys {
        if let Ok(v) = std::env::var(key) {
            let v = v.trim();
            if usable(v) {
                return v.to_string();
            }
        }
    }
    default.to_string()
}

fn usable(v: &str) -> bool {
    !v.is_empty() && !v.starts_with(PLACEHOLDER_PREFIX)
}

/// Constant-time equality for two byte slices.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc: u8 = 0;
    for i in 0..a.len() {
        acc |= a[i] ^ b[i];
    }
    acc == 0
}
