//! Shared runtime plumbing: tracing bootstrap, HTTP client, app state, and
//! the error envelope every surface renders.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cache::{Cache, MemoryCache};
use crate::config::GatewayConfig;
use crate::logging::JsonlWriter;
use crate::rate_limit::RateLimiter;
use crate::upstream::UpstreamClient;

/// Initialize dotenv and structured tracing based on RUST_LOG.
/// Honors an explicit env file via ENV_FILE before falling back to `.env`.
pub fn init_tracing() {
    let mut loaded = false;
    if let Ok(path) = std::env::var("ENV_FILE") {
        let path = path.trim();
        if !path.is_empty() && dotenvy::from_filename(path).is_ok() {
            loaded = true;
        }
    }
    if !loaded {
        let _ = dotenvy::dotenv();
    }

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let subscriber = fmt().with_env_filter(EnvFilter::new(filter)).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Bind address for the HTTP server, default 0.0.0.0:8088.
pub fn env_bind_addr() -> String {
    std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8088".into())
}

/// Shared reqwest client: 8 s connect timeout, no total timeout. Buffered
/// callers bound their own exchanges per request; the stream proxy must
/// stay unbounded until upstream EOF.
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(8))
        .user_agent(format!("parsegate/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Stable error codes shared by every endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MethodNotAllowed,
    InvalidTargetLang,
    InvalidMode,
    PayloadTooLarge,
    EmptyPayload,
    RateLimited,
    Unauthorized,
    ParseFailed,
    AiCallFailed,
    ContractViolation,
    ServiceUnavailable,
    JsonEncodeFailed,
    UpstreamError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::InvalidTargetLang => "invalid_target_lang",
            ErrorCode::InvalidMode => "invalid_mode",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::EmptyPayload => "empty_payload",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::ParseFailed => "parse_failed",
            ErrorCode::AiCallFailed => "ai_call_failed",
            ErrorCode::ContractViolation => "contract_violation",
            ErrorCode::ServiceUnavailable => "service_unavailable",
            ErrorCode::JsonEncodeFailed => "json_encode_failed",
            ErrorCode::UpstreamError => "upstream_error",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::InvalidTargetLang
            | ErrorCode::InvalidMode
            | ErrorCode::EmptyPayload
            | ErrorCode::ParseFailed => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::AiCallFailed | ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,
            ErrorCode::ContractViolation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::JsonEncodeFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{ok:false, error:{code, message}, meta?}` with the code's status.
pub fn error_envelope(code: ErrorCode, message: &str, meta: Option<Value>) -> HttpResponse {
    let mut body = serde_json::json!({
        "ok": false,
        "error": {"code": code.as_str(), "message": message},
    });
    if let Some(meta) = meta {
        body["meta"] = meta;
    }
    json_envelope(code.status(), &body)
}

/// Serialize and respond. An encoder failure answers with a hand-crafted
/// error body that bypasses the encoder entirely.
pub fn json_envelope(status: StatusCode, value: &Value) -> HttpResponse {
    match serde_json::to_string(value) {
        Ok(body) => HttpResponse::build(status)
            .content_type("application/json")
            .body(body),
        Err(_) => HttpResponse::InternalServerError()
            .content_type("application/json")
            .body(r#"{"ok":false,"error":{"code":"json_encode_failed","message":"response encoding failed"}}"#),
    }
}

/// Shared application state used by the HTTP server and handlers.
pub struct AppState {
    pub http: reqwest::Client,
    pub config: Arc<GatewayConfig>,
    pub cache: Arc<dyn Cache>,
    pub upstream: UpstreamClient,
    pub limiter: RateLimiter,
    pub monetization_log: Arc<JsonlWriter>,
    pub access_log: Arc<JsonlWriter>,
}

impl AppState {
    pub fn from_env() -> Self {
        Self::new(GatewayConfig::from_env())
    }

    pub fn new(config: GatewayConfig) -> Self {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::default());
        let http = build_http_client();
        Self {
            upstream: UpstreamClient::new(http.clone()),
            limiter: RateLimiter::new(cache.clone(), config.rate_limit_per_minute),
            monetization_log: Arc::new(JsonlWriter::new(config.log_dir.join("ps_parse.log"))),
            access_log: Arc::new(JsonlWriter::new(config.log_dir.join("api_access.log"))),
            config: Arc::new(config),
            cache,
            http,
        }
    }
}
