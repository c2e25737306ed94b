//! Buffered OpenAI-compatible chat call with token accounting.
//!
//! Single operation: post a two-message JSON-mode chat completion and hand
//! back the model's JSON payload plus usage counters. Streaming lives in
//! `stream_proxy`; this client is the parse path's only upstream surface.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::config::ProviderConfig;

/// Token counters reported by the upstream, zero when absent.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Successful call: the re-parsed JSON the model produced, plus accounting.
#[derive(Debug, Clone)]
pub struct ChatJson {
    pub model: String,
    pub usage: TokenUsage,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Provider key is empty or still the placeholder sentinel.
    NotConfigured,
    /// The request never produced an HTTP status (connect/timeout/DNS).
    Transport(String),
    /// Non-2xx upstream status, with the upstream error message if present.
    Http { status: u16, message: Option<String> },
    /// 2xx, but `choices[0].message.content` did not re-parse as JSON.
    ContentNotJson,
}

impl UpstreamError {
    /// Stable wire code for envelopes and logs.
    pub fn code(&self) -> String {
        match self {
            UpstreamError::NotConfigured => "deepseek_not_configured".to_string(),
            UpstreamError::Transport(e) => format!("upstream_unreachable:{e}"),
            UpstreamError::Http {
                status,
                message: Some(m),
            } => format!("http_{status}:{m}"),
            UpstreamError::Http {
                status,
                message: None,
            } => format!("http_{status}"),
            UpstreamError::ContentNotJson => "model_content_not_json_object".to_string(),
        }
    }
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code())
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// One JSON-mode chat completion against `provider`. `timeout` bounds
    /// the whole exchange; the connect timeout comes from the shared client.
    pub async fn chat_json(
        &self,
        provider: &ProviderConfig,
        system_text: &str,
        user_text: &str,
        timeout: Duration,
    ) -> Result<ChatJson, UpstreamError> {
        if !provider.is_configured() {
            return Err(UpstreamError::NotConfigured);
        }

        let url = format!("{}/chat/completions", provider.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": provider.model,
            "temperature": 0.2,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system_text},
                {"role": "user", "content": user_text},
            ],
        });

        let resp = self
            .http
            .post(&url)
            .timeout(timeout)
            .bearer_auth(&provider.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = resp.bytes().await.unwrap_or_default();
        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(Value::as_str)
                        .map(String::from)
                });
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Value =
            serde_json::from_slice(&bytes).map_err(|_| UpstreamError::ContentNotJson)?;
        let content = envelope
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        let value: Value =
            serde_json::from_str(content).map_err(|_| UpstreamError::ContentNotJson)?;

        let usage = TokenUsage {
            prompt_tokens: usage_field(&envelope, "prompt_tokens"),
            completion_tokens: usage_field(&envelope, "completion_tokens"),
            total_tokens: usage_field(&envelope, "total_tokens"),
        };
        let model = envelope
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&provider.model)
            .to_string();

        Ok(ChatJson {
            model,
            usage,
            value,
        })
    }
}

fn usage_field(envelope: &Value, name: &str) -> u64 {
    envelope
        .get("usage")
        .and_then(|u| u.get(name))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}
