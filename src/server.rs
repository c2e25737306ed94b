//! HTTP surface: parse orchestrator, chat gateway, health and pool status.
//!
//! The parse endpoint walks a per-mode cascade of local parsers and
//! LLM-backed extraction; the chat endpoint is a thin OpenAI-compatible
//! proxy over the free pool. Both share the auth, rate-limit and logging
//! plumbing carried on [`AppState`].

use std::time::{Duration, Instant};

use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::BytesMut;
use futures_util::StreamExt;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::ct_eq;
use crate::contract;
use crate::logging::{AccessRecord, MonetizationRecord};
use crate::parsers;
use crate::prompts::{self, LlmMode};
use crate::rate_limit::{client_ip, RateDecision};
use crate::router::{self, RoutedChat};
use crate::stream_proxy::{self, StreamContext};
use crate::util::{error_envelope, json_envelope, now_epoch, AppState, ErrorCode};

/// Hard cap on parse input size.
pub const MAX_INPUT_BYTES: usize = 262_144;

const CHAT_PATH: &str = "/v1/chat/completions";
const CHAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Register all routes. Unmatched methods on known paths answer with the
/// stable `method_not_allowed` envelope instead of an empty 405.
pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/v1/parse")
            .route(web::get().to(parse))
            .route(web::post().to(parse))
            .default_service(web::route().to(method_not_allowed)),
    )
    .service(
        web::resource("/v1/parse/health")
            .route(web::get().to(health))
            .default_service(web::route().to(method_not_allowed)),
    )
    .service(
        web::resource("/v1/parse/pool_status")
            .route(web::get().to(pool_status))
            .default_service(web::route().to(method_not_allowed)),
    )
    .service(
        web::resource(CHAT_PATH)
            .route(web::post().to(chat_completions))
            .default_service(web::route().to(method_not_allowed)),
    );
}

/// Permissive CORS shared by every endpoint; preflights answer 204.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            "content-type",
            "x-api-key",
            "x-parse-key",
            "authorization",
        ])
        .max_age(86400)
}

async fn method_not_allowed() -> HttpResponse {
    error_envelope(ErrorCode::MethodNotAllowed, "method not allowed", None)
}

// ==============================
// Parse modes and cascade
// ==============================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Auto,
    Json,
    Query,
    Kv,
    Csv,
    Deepseek,
    Ecom,
    News,
    Social,
}

impl ParseMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(ParseMode::Auto),
            "json" => Some(ParseMode::Json),
            "query" => Some(ParseMode::Query),
            "kv" => Some(ParseMode::Kv),
            "csv" => Some(ParseMode::Csv),
            "deepseek" => Some(ParseMode::Deepseek),
            "ecom" => Some(ParseMode::Ecom),
            "news" => Some(ParseMode::News),
            "social" => Some(ParseMode::Social),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParseMode::Auto => "auto",
            ParseMode::Json => "json",
            ParseMode::Query => "query",
            ParseMode::Kv => "kv",
            ParseMode::Csv => "csv",
            ParseMode::Deepseek => "deepseek",
            ParseMode::Ecom => "ecom",
            ParseMode::News => "news",
            ParseMode::Social => "social",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalFormat {
    Json,
    Query,
    Kv,
    Csv,
}

impl LocalFormat {
    fn name(self) -> &'static str {
        match self {
            LocalFormat::Json => "json",
            LocalFormat::Query => "query",
            LocalFormat::Kv => "kv",
            LocalFormat::Csv => "csv",
        }
    }

    fn decode(self, input: &str) -> Option<Value> {
        match self {
            LocalFormat::Json => parsers::parse_json(input),
            LocalFormat::Query => parsers::parse_query(input),
            LocalFormat::Kv => parsers::parse_kv(input),
            LocalFormat::Csv => parsers::parse_csv(input),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Attempt {
    Local(LocalFormat),
    Upstream(LlmMode),
}

fn try_list(mode: ParseMode) -> &'static [Attempt] {
    use Attempt::{Local, Upstream};
    use LocalFormat as F;
    match mode {
        ParseMode::Auto => &[
            Local(F::Json),
            Upstream(LlmMode::Auto),
            Local(F::Query),
            Local(F::Kv),
            Local(F::Csv),
        ],
        ParseMode::Json => &[Local(F::Json)],
        ParseMode::Query => &[Local(F::Query)],
        ParseMode::Kv => &[Local(F::Kv)],
        ParseMode::Csv => &[Local(F::Csv)],
        ParseMode::Deepseek => &[Upstream(LlmMode::Core)],
        ParseMode::Ecom => &[Upstream(LlmMode::Ecom)],
        ParseMode::News => &[Upstream(LlmMode::News)],
        ParseMode::Social => &[Upstream(LlmMode::Social)],
    }
}

/// Mode-forced prompts override caller instructions everywhere except the
/// generic `deepseek` mode, which honors a non-empty caller instruction.
fn effective_system(
    mode: ParseMode,
    llm: LlmMode,
    instruction: &str,
    target_lang: Option<&str>,
) -> String {
    let instruction = instruction.trim();
    let base = if mode == ParseMode::Deepseek && !instruction.is_empty() {
        prompts::align(instruction)
    } else {
        prompts::align(prompts::system_prompt(llm))
    };
    match target_lang {
        Some(lang) => format!("{base}\n\ntarget_lang={lang}"),
        None => base,
    }
}

fn resolved_name(mode: ParseMode, llm: LlmMode) -> &'static str {
    if mode == ParseMode::Deepseek {
        "deepseek"
    } else {
        llm.as_str()
    }
}

// ==============================
// Request parameters
// ==============================

#[derive(Debug, Default)]
struct ParseParams {
    mode: String,
    target_lang: String,
    instruction: String,
    data: String,
    url: String,
    key: String,
}

/// Parameters come from the query string and, for form-encoded bodies,
/// from the body as well (body wins). A JSON body is never parameters:
/// it is the payload itself.
fn collect_params(req: &HttpRequest, body: &[u8]) -> ParseParams {
    let mut params = ParseParams::default();
    for (k, v) in url::form_urlencoded::parse(req.query_string().as_bytes()) {
        assign_param(&mut params, &k, v.into_owned());
    }
    let form_body = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if form_body {
        for (k, v) in url::form_urlencoded::parse(body) {
            assign_param(&mut params, &k, v.into_owned());
        }
    }
    params
}

fn assign_param(params: &mut ParseParams, key: &str, value: String) {
    match key {
        "mode" => params.mode = value,
        "target_lang" => params.target_lang = value,
        "instruction" => params.instruction = value,
        "data" => params.data = value,
        "url" => params.url = value,
        "key" => params.key = value,
        _ => {}
    }
}

fn normalize_target_lang(raw: &str) -> Result<Option<&'static str>, ()> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "zh" | "zh-cn" | "zh-hans" | "cn" => Ok(Some("zh")),
        _ => Err(()),
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let raw = req.headers().get("authorization")?.to_str().ok()?.trim();
    if raw.len() < 7 || !raw[..6].eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = raw[6..].trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    let v = req.headers().get(name)?.to_str().ok()?.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

// ==============================
// Parse orchestrator
// ==============================

async fn parse(
    state: web::Data<AppState>,
    req: HttpRequest,
    body_stream: web::Payload,
) -> HttpResponse {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let ip = client_ip(&req);
    let body = match read_body_capped(body_stream).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let params = collect_params(&req, &body);

    // Service-key gate, when configured.
    if let Some(expected) = state.config.parse_key.as_deref() {
        let presented = header_value(&req, "X-Parse-Key")
            .or_else(|| header_value(&req, "X-Api-Key"))
            .or_else(|| {
                if params.key.is_empty() {
                    None
                } else {
                    Some(params.key.clone())
                }
            });
        let authorized = presented
            .map(|p| ct_eq(p.as_bytes(), expected.as_bytes()))
            .unwrap_or(false);
        if !authorized {
            return error_envelope(ErrorCode::Unauthorized, "missing or invalid parse key", None);
        }
    }

    if let RateDecision::Limited { limit } = state.limiter.check(&ip) {
        return error_envelope(
            ErrorCode::RateLimited,
            "rate limit exceeded",
            Some(json!({"limit_per_minute": limit})),
        );
    }

    let target_lang = match normalize_target_lang(&params.target_lang) {
        Ok(t) => t,
        Err(()) => {
            return error_envelope(
                ErrorCode::InvalidTargetLang,
                "target_lang must be zh (or an alias) or empty",
                None,
            )
        }
    };

    let mode_raw = if params.mode.trim().is_empty() {
        "auto"
    } else {
        params.mode.trim()
    };
    let mode = match ParseMode::parse(mode_raw) {
        Some(m) => m,
        None => {
            return error_envelope(
                ErrorCode::InvalidMode,
                &format!("unsupported mode: {mode_raw}"),
                None,
            )
        }
    };

    let (payload, source_url) = if !params.data.is_empty() {
        (params.data.clone(), None)
    } else if !params.url.is_empty() {
        match fetch_url(&state.http, &params.url).await {
            Ok(text) => (text, Some(params.url.clone())),
            Err(err) => {
                return error_envelope(
                    ErrorCode::ParseFailed,
                    &format!("url_fetch_failed: {err}"),
                    None,
                )
            }
        }
    } else {
        (String::from_utf8_lossy(&body).into_owned(), None)
    };

    let input_bytes = payload.len() as u64;
    if payload.len() > MAX_INPUT_BYTES {
        return error_envelope(
            ErrorCode::PayloadTooLarge,
            &format!("input exceeds {MAX_INPUT_BYTES} bytes"),
            Some(json!({"mode": mode.as_str(), "input_bytes": input_bytes})),
        );
    }
    if payload.trim().is_empty() {
        return error_envelope(ErrorCode::EmptyPayload, "no input provided", None);
    }

    let premium = bearer_token(&req)
        .map(|t| state.config.is_premium_token(&t))
        .unwrap_or(false);

    let outcome = run_cascade(
        &state,
        mode,
        &params.instruction,
        target_lang,
        &payload,
        premium,
    )
    .await;

    let ts = now_epoch();
    let (ok, resolved, error_code) = match &outcome.result {
        Ok((_, resolved)) => (true, Some(resolved.to_string()), None),
        Err((code, _)) => (false, None, Some(code.as_str().to_string())),
    };
    let record = MonetizationRecord {
        ts,
        request_id: request_id.clone(),
        ok,
        mode: mode.as_str().to_string(),
        resolved_mode: resolved,
        client_ip: ip,
        input_bytes,
        input_tokens: outcome.route.as_ref().map(|r| r.usage.prompt_tokens).unwrap_or(0),
        output_tokens: outcome
            .route
            .as_ref()
            .map(|r| r.usage.completion_tokens)
            .unwrap_or(0),
        provider: outcome.route.as_ref().map(|r| r.provider.as_str().to_string()),
        tier: outcome.route.as_ref().map(|r| r.tier.as_str().to_string()),
        model: outcome.route.as_ref().map(|r| r.model.clone()),
        duration_ms: started.elapsed().as_millis() as u64,
        error_code,
    };
    if let Err(err) = state.monetization_log.append(&record) {
        tracing::warn!(error = %err, "failed to append monetization record");
    }

    match outcome.result {
        Ok((data, resolved)) => {
            let mut meta = json!({"mode": resolved, "input_bytes": input_bytes});
            if let Some(url) = &source_url {
                meta["url"] = json!(url);
            }
            if let Some(route) = &outcome.route {
                meta["deepseek"] = json!({
                    "provider": route.provider.as_str(),
                    "tier": route.tier.as_str(),
                    "input_tokens": route.usage.prompt_tokens,
                    "output_tokens": route.usage.completion_tokens,
                    "model": route.model,
                });
            }
            if let Some(lang) = target_lang {
                meta["target_lang"] = json!(lang);
            }
            json_envelope(
                StatusCode::OK,
                &json!({
                    "ok": true,
                    "request_id": request_id,
                    "ts": ts,
                    "data": data,
                    "meta": meta,
                }),
            )
        }
        Err((code, message)) => json_envelope(
            code.status(),
            &json!({
                "ok": false,
                "request_id": request_id,
                "ts": ts,
                "error": {"code": code.as_str(), "message": message},
                "meta": {"mode": mode.as_str(), "input_bytes": input_bytes},
            }),
        ),
    }
}

struct CascadeOutcome {
    result: Result<(Value, &'static str), (ErrorCode, String)>,
    route: Option<RoutedChat>,
}

/// Walk the mode's try-list; first success wins. Local parser failures are
/// silent. Unconfigured-upstream sentinels are swallowed only in auto mode
/// so the cascade can fall back to local parsers; every other upstream
/// failure is fatal.
async fn run_cascade(
    state: &AppState,
    mode: ParseMode,
    instruction: &str,
    target_lang: Option<&'static str>,
    payload: &str,
    premium: bool,
) -> CascadeOutcome {
    for attempt in try_list(mode) {
        match attempt {
            Attempt::Local(format) => {
                if let Some(value) = format.decode(payload) {
                    return CascadeOutcome {
                        result: Ok((value, format.name())),
                        route: None,
                    };
                }
            }
            Attempt::Upstream(llm) => {
                let system = effective_system(mode, *llm, instruction, target_lang);
                match router::route_parse_call(
                    &state.upstream,
                    state.cache.as_ref(),
                    &state.config,
                    premium,
                    &system,
                    payload,
                )
                .await
                {
                    Ok(done) => {
                        let missing = contract::validate(*llm, &done.value);
                        if !missing.is_empty() {
                            return CascadeOutcome {
                                result: Err((
                                    ErrorCode::ContractViolation,
                                    format!("missing or invalid fields: {}", missing.join(",")),
                                )),
                                route: Some(done),
                            };
                        }
                        let value = done.value.clone();
                        let name = resolved_name(mode, *llm);
                        return CascadeOutcome {
                            result: Ok((value, name)),
                            route: Some(done),
                        };
                    }
                    Err(err) if mode == ParseMode::Auto && err.is_not_configured() => {
                        tracing::debug!(code = %err.code(), "upstream unavailable, cascade continues");
                    }
                    Err(err) => {
                        return CascadeOutcome {
                            result: Err((ErrorCode::AiCallFailed, err.code())),
                            route: None,
                        };
                    }
                }
            }
        }
    }
    CascadeOutcome {
        result: Err((
            ErrorCode::ParseFailed,
            "no parser accepted the input".to_string(),
        )),
        route: None,
    }
}

/// Read the raw request body with the size cap enforced in-handler, so
/// oversized inputs of any size get the stable `payload_too_large`
/// envelope instead of an extractor-level rejection.
async fn read_body_capped(mut body_stream: web::Payload) -> Result<web::Bytes, HttpResponse> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body_stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                return Err(error_envelope(
                    ErrorCode::ParseFailed,
                    &format!("failed to read request body: {err}"),
                    None,
                ))
            }
        };
        if buf.len() + chunk.len() > MAX_INPUT_BYTES {
            return Err(error_envelope(
                ErrorCode::PayloadTooLarge,
                &format!("input exceeds {MAX_INPUT_BYTES} bytes"),
                None,
            ));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

async fn fetch_url(http: &reqwest::Client, url: &str) -> Result<String, String> {
    let resp = http
        .get(url)
        .timeout(Duration::from_secs(20))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let status = resp.status();
    if !status.is_success() {
        return Err(format!("http_{}", status.as_u16()));
    }
    resp.text().await.map_err(|e| e.to_string())
}

// ==============================
// Health and pool status
// ==============================

async fn health() -> HttpResponse {
    json_envelope(
        StatusCode::OK,
        &json!({"ok": true, "service": "api.v1.parse", "ts": now_epoch()}),
    )
}

/// Self-check: recomputes readiness from live config and refreshes the
/// cached snapshot the routers consult.
async fn pool_status(state: web::Data<AppState>) -> HttpResponse {
    let status = router::refresh_pool_status(state.cache.as_ref(), &state.config);
    json_envelope(
        StatusCode::OK,
        &json!({
            "ok": true,
            "data": {
                "free_pool_ready": status.any_ready(),
                "provider_a_ready": status.provider_a_ready,
                "provider_b_ready": status.provider_b_ready,
                "premium_ready": state.config.premium.is_configured(),
            },
        }),
    )
}

// ==============================
// Chat gateway
// ==============================

async fn chat_completions(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let started = Instant::now();
    let ip = client_ip(&req);

    if body.is_empty() {
        return error_envelope(ErrorCode::EmptyPayload, "request body is empty", None);
    }
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(err) => {
            return error_envelope(
                ErrorCode::ParseFailed,
                &format!("invalid JSON body: {err}"),
                None,
            )
        }
    };

    let stream = payload.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let requested_model = payload
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let pool = router::pool_status(state.cache.as_ref(), &state.config);
    let input_text = String::from_utf8_lossy(&body);
    let route = match router::route_chat(&state.config, &pool, &requested_model, &input_text) {
        Some(route) => route,
        None => {
            return if stream {
                let mut builder = HttpResponse::ServiceUnavailable();
                stream_proxy::apply_sse_headers(&mut builder);
                builder.body(stream_proxy::sse_error_body("service_unavailable"))
            } else {
                error_envelope(
                    ErrorCode::ServiceUnavailable,
                    "no upstream provider is ready",
                    None,
                )
            };
        }
    };

    let provider = state.config.provider(route.provider).clone();
    let mut outbound = payload;
    if let Some(obj) = outbound.as_object_mut() {
        obj.insert("model".to_string(), json!(route.model));
    }

    if stream {
        let ctx = StreamContext {
            started,
            log: state.access_log.clone(),
            provider: route.provider,
            path: CHAT_PATH.to_string(),
            ip,
        };
        stream_proxy::relay_sse(&state.http, &provider, outbound, ctx).await
    } else {
        let url = format!("{}/chat/completions", provider.base_url.trim_end_matches('/'));
        let mut request = state.http.post(&url).timeout(CHAT_TIMEOUT).json(&outbound);
        if !provider.api_key.is_empty() {
            request = request.bearer_auth(&provider.api_key);
        }
        match request.send().await {
            Ok(up) => {
                let status = up.status().as_u16();
                let content_type = up
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("application/json")
                    .to_string();
                let bytes = up.bytes().await.unwrap_or_default();
                append_access(&state, &route.provider, status, started, &ip, None);
                HttpResponse::build(
                    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                )
                .content_type(content_type)
                .body(bytes)
            }
            Err(err) => {
                append_access(
                    &state,
                    &route.provider,
                    502,
                    started,
                    &ip,
                    Some(format!("upstream request failed: {err}")),
                );
                error_envelope(
                    ErrorCode::AiCallFailed,
                    &format!("upstream request failed: {err}"),
                    None,
                )
            }
        }
    }
}

fn append_access(
    state: &AppState,
    provider: &crate::config::ProviderId,
    status_code: u16,
    started: Instant,
    ip: &str,
    note: Option<String>,
) {
    let record = AccessRecord {
        ts: now_epoch(),
        provider: provider.as_str().to_string(),
        status_code,
        first_byte_ms: None,
        total_latency_ms: started.elapsed().as_millis() as u64,
        path: CHAT_PATH.to_string(),
        stream: false,
        ip: ip.to_string(),
        note,
    };
    if let Err(err) = state.access_log.append(&record) {
        tracing::warn!(error = %err, "failed to append access record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn try_lists_match_the_mode_table() {
        let auto = try_list(ParseMode::Auto);
        assert_eq!(auto.len(), 5);
        assert!(matches!(auto[0], Attempt::Local(LocalFormat::Json)));
        assert!(matches!(auto[1], Attempt::Upstream(LlmMode::Auto)));
        assert!(matches!(auto[4], Attempt::Local(LocalFormat::Csv)));

        assert!(matches!(
            try_list(ParseMode::Deepseek),
            [Attempt::Upstream(LlmMode::Core)]
        ));
        assert!(matches!(try_list(ParseMode::Csv), [Attempt::Local(LocalFormat::Csv)]));
    }

    #[test]
    fn mode_names_round_trip() {
        for name in ["auto", "json", "query", "kv", "csv", "deepseek", "ecom", "news", "social"] {
            let mode = ParseMode::parse(name).expect("known mode");
            assert_eq!(mode.as_str(), name);
        }
        assert_eq!(ParseMode::parse(" ECOM "), Some(ParseMode::Ecom));
        assert_eq!(ParseMode::parse("xml"), None);
    }

    #[test]
    fn target_lang_aliases_normalize_to_zh() {
        for alias in ["zh", "ZH-CN", "zh-hans", "cn", " Zh "] {
            assert_eq!(normalize_target_lang(alias), Ok(Some("zh")));
        }
        assert_eq!(normalize_target_lang(""), Ok(None));
        assert_eq!(normalize_target_lang("fr"), Err(()));
    }

    #[test]
    fn deepseek_mode_honors_caller_instruction() {
        let custom = effective_system(ParseMode::Deepseek, LlmMode::Core, "Pull out the dates.", None);
        assert!(custom.starts_with(prompts::LANGUAGE_ALIGNMENT));
        assert!(custom.ends_with("Pull out the dates."));

        let forced = effective_system(ParseMode::Ecom, LlmMode::Ecom, "ignored", None);
        assert!(forced.contains("bullet_points"));
        assert!(!forced.contains("ignored"));

        let with_lang = effective_system(ParseMode::Deepseek, LlmMode::Core, "", Some("zh"));
        assert!(with_lang.ends_with("target_lang=zh"));
    }

    #[test]
    fn resolved_name_tags_deepseek_mode() {
        assert_eq!(resolved_name(ParseMode::Deepseek, LlmMode::Core), "deepseek");
        assert_eq!(resolved_name(ParseMode::Auto, LlmMode::Auto), "auto");
        assert_eq!(resolved_name(ParseMode::Ecom, LlmMode::Ecom), "ecom");
    }

    #[test]
    fn params_come_from_query_and_form_body() {
        let req = TestRequest::with_uri("/v1/parse?mode=kv&target_lang=zh-cn&key=abc")
            .to_http_request();
        let params = collect_params(&req, b"");
        assert_eq!(params.mode, "kv");
        assert_eq!(params.target_lang, "zh-cn");
        assert_eq!(params.key, "abc");

        let req = TestRequest::with_uri("/v1/parse?mode=csv")
            .insert_header(("content-type", "application/x-www-form-urlencoded"))
            .to_http_request();
        let params = collect_params(&req, b"mode=ecom&data=some+text");
        assert_eq!(params.mode, "ecom", "form body overrides query");
        assert_eq!(params.data, "some text");

        // JSON bodies are payload, never parameters.
        let req = TestRequest::with_uri("/v1/parse")
            .insert_header(("content-type", "application/json"))
            .to_http_request();
        let params = collect_params(&req, br#"{"mode":"ecom"}"#);
        assert_eq!(params.mode, "");
    }

    #[test]
    fn bearer_token_extraction() {
        let req = TestRequest::default()
            .insert_header(("authorization", "Bearer tok-123"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("tok-123".to_string()));

        let req = TestRequest::default()
            .insert_header(("authorization", "Basic xyz"))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);

        let req = TestRequest::default().to_http_request();
        assert_eq!(bearer_token(&req), None);
    }
}
