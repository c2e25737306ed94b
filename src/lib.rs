#![forbid(unsafe_code)]
#![doc = r#"
Parsegate

Multi-tenant AI gateway between client applications and OpenAI-compatible
upstream providers. Two public surfaces: a structured parse endpoint
(local format cascade plus LLM-backed extraction under per-mode response
contracts) and a chat-completions proxy with transparent SSE streaming.

Crate highlights
- Tiered routing: premium for allow-listed bearer tokens, otherwise a
  free pool picked by input-language heuristic, with failover.
- Byte-exact streaming relay with upstream-status-aware error injection.
- Per-IP fixed-window rate limiting over an injected TTL cache.
- Append-only JSONL monetization and access logs.

Modules
- `config`: env/override resolution, provider descriptors, placeholder sentinel.
- `cache`: TTL key/value trait plus the in-process default store.
- `rate_limit`: fixed-window limiter and client-IP resolution.
- `parsers`: JSON / query-string / key-value / CSV local decoders.
- `contract`: per-mode validators for LLM output.
- `prompts`: system-prompt catalog and language alignment.
- `upstream`: buffered OpenAI-compatible chat call with token accounting.
- `router`: provider selection, failover, pool-status snapshot.
- `stream_proxy`: transparent SSE chunk relay.
- `logging`: JSONL log sinks and record types.
- `server`: Actix handlers and route configuration.
- `util`: tracing bootstrap, app state, error envelope.
"#]

pub mod cache;
pub mod config;
pub mod contract;
pub mod logging;
pub mod parsers;
pub mod prompts;
pub mod rate_limit;
pub mod router;
pub mod server;
pub mod stream_proxy;
pub mod upstream;
pub mod util;

pub use crate::cache::{Cache, MemoryCache};
pub use crate::config::{
    ConfigOverrides, GatewayConfig, ProviderConfig, ProviderId, ProviderOverrides, Tier,
};
pub use crate::prompts::LlmMode;
pub use crate::router::{ChatRoute, PoolStatus, RoutedChat, RouteError};
pub use crate::server::ParseMode;
pub use crate::upstream::{TokenUsage, UpstreamClient, UpstreamError};
pub use crate::util::{AppState, ErrorCode};
