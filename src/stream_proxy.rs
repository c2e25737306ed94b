//! Transparent SSE relay with upstream-status-aware error injection.
//!
//! Healthy upstream (status < 400): chunks pass through byte-for-byte, no
//! SSE reframing, first chunk stamps `first_byte_ms`. Failing upstream
//! (status >= 400): the body is buffered instead of forwarded and the
//! client receives exactly two SSE events, an error object and `[DONE]`,
//! so streaming connections never end with bare headers.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use actix_web::{HttpResponse, HttpResponseBuilder};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::config::{ProviderConfig, ProviderId};
use crate::logging::{AccessRecord, JsonlWriter};
use crate::util::now_epoch;

/// Request-scoped context the relay needs for access logging.
pub struct StreamContext {
    pub started: Instant,
    pub log: Arc<JsonlWriter>,
    pub provider: ProviderId,
    pub path: String,
    pub ip: String,
}

/// Proxy one streaming chat call. The shared client carries the 8 s connect
/// timeout; no total timeout is set, upstream EOF or client disconnect ends
/// the exchange.
pub async fn relay_sse(
    http: &reqwest::Client,
    provider: &ProviderConfig,
    body: Value,
    ctx: StreamContext,
) -> HttpResponse {
    let url = format!("{}/chat/completions", provider.base_url.trim_end_matches('/'));
    let probe = AccessProbe::new(ctx);

    let mut request = http
        .post(&url)
        .header("accept", "text/event-stream")
        .json(&body);
    if !provider.api_key.is_empty() {
        request = request.bearer_auth(&provider.api_key);
    }

    let upstream = match request.send().await {
        Ok(up) => up,
        Err(err) => {
            let note = format!("upstream connect failed: {err}");
            probe.finish(502, None, Some(note.as_str()));
            let mut builder = HttpResponse::Ok();
            apply_sse_headers(&mut builder);
            return builder.body(sse_error_body("Upstream error"));
        }
    };

    let status = upstream.status().as_u16();
    if status < 400 {
        let relay = RelayStream::new(upstream.bytes_stream(), probe, status);
        let mut builder = HttpResponse::Ok();
        apply_sse_headers(&mut builder);
        builder.streaming(relay)
    } else {
        // Error bodies are buffered chunk by chunk, never forwarded; the
        // first chunk still stamps first-byte latency like the relay path.
        let mut first_byte_ms = None;
        let mut buffered = Vec::new();
        let mut body_stream = upstream.bytes_stream();
        while let Some(chunk) = body_stream.next().await {
            match chunk {
                Ok(chunk) => {
                    if first_byte_ms.is_none() {
                        first_byte_ms = Some(probe.elapsed_ms());
                    }
                    buffered.extend_from_slice(&chunk);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "upstream error body read failed");
                    break;
                }
            }
        }
        let message = upstream_error_message(&buffered);
        probe.finish(status, first_byte_ms, None);
        let mut builder = HttpResponse::Ok();
        apply_sse_headers(&mut builder);
        builder.body(sse_error_body(&message))
    }
}

/// SSE response headers shared by the relay and the gateway's 503 path.
pub fn apply_sse_headers(builder: &mut HttpResponseBuilder) {
    builder
        .insert_header(("content-type", "text/event-stream; charset=utf-8"))
        .insert_header(("cache-control", "no-cache, no-transform"))
        .insert_header(("connection", "keep-alive"))
        .insert_header(("x-accel-buffering", "no"));
}

/// The two-event failure shape: one error object, one `[DONE]`. Key order
/// is fixed by hand so clients parsing lines see a stable wire format.
pub fn sse_error_body(message: &str) -> String {
    let quoted = serde_json::to_string(message)
        .unwrap_or_else(|_| "\"Upstream error\"".to_string());
    format!(
        "data: {{\"error\":{{\"message\":{quoted},\"type\":\"server_error\",\"code\":\"upstream_error\"}}}}\n\ndata: [DONE]\n\n"
    )
}

/// `error.message` from a buffered upstream body, else the fixed fallback.
fn upstream_error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| "Upstream error".to_string())
}

/// Writes the access record exactly once, whichever path ends the exchange.
struct AccessProbe {
    ctx: StreamContext,
}

impl AccessProbe {
    fn new(ctx: StreamContext) -> Self {
        Self { ctx }
    }

    fn elapsed_ms(&self) -> u64 {
        self.ctx.started.elapsed().as_millis() as u64
    }

    fn finish(self, status_code: u16, first_byte_ms: Option<u64>, note: Option<&str>) {
        let record = AccessRecord {
            ts: now_epoch(),
            provider: self.ctx.provider.as_str().to_string(),
            status_code,
            first_byte_ms,
            total_latency_ms: self.ctx.started.elapsed().as_millis() as u64,
            path: self.ctx.path.clone(),
            stream: true,
            ip: self.ctx.ip.clone(),
            note: note.map(String::from),
        };
        if let Err(err) = self.ctx.log.append(&record) {
            tracing::warn!(error = %err, "failed to append access record");
        }
    }
}

/// Byte-exact passthrough that stamps first-byte latency and logs the
/// access record when the stream ends, errors, or is dropped by a
/// disconnecting client.
struct RelayStream<S> {
    inner: S,
    probe: Option<AccessProbe>,
    upstream_status: u16,
    first_byte_ms: Option<u64>,
}

impl<S> RelayStream<S> {
    fn new(inner: S, probe: AccessProbe, upstream_status: u16) -> Self {
        Self {
            inner,
            probe: Some(probe),
            upstream_status,
            first_byte_ms: None,
        }
    }

    fn finish(&mut self, note: Option<&str>) {
        if let Some(probe) = self.probe.take() {
            probe.finish(self.upstream_status, self.first_byte_ms, note);
        }
    }
}

impl<S, E> Stream for RelayStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if this.first_byte_ms.is_none() {
                    if let Some(probe) = this.probe.as_ref() {
                        this.first_byte_ms = Some(probe.elapsed_ms());
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                let text = err.to_string();
                this.finish(Some(&format!("upstream read failed: {text}")));
                Poll::Ready(Some(Err(std::io::Error::other(text))))
            }
            Poll::Ready(None) => {
                this.finish(None);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for RelayStream<S> {
    fn drop(&mut self) {
        self.finish(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tempfile::TempDir;

    #[test]
    fn error_body_is_two_events_with_stable_key_order() {
        let body = sse_error_body("boom");
        assert_eq!(
            body,
            "data: {\"error\":{\"message\":\"boom\",\"type\":\"server_error\",\"code\":\"upstream_error\"}}\n\ndata: [DONE]\n\n"
        );
        // Message text is JSON-escaped, not spliced raw.
        let tricky = sse_error_body("a \"quoted\" failure");
        assert!(tricky.contains("\\\"quoted\\\""));
        assert!(tricky.ends_with("data: [DONE]\n\n"));
    }

    #[test]
    fn upstream_message_extraction_falls_back() {
        assert_eq!(
            upstream_error_message(br#"{"error":{"message":"boom"}}"#),
            "boom"
        );
        assert_eq!(upstream_error_message(b"not json at all"), "Upstream error");
        assert_eq!(upstream_error_message(br#"{"detail":"x"}"#), "Upstream error");
    }

    fn make_probe(tmp: &TempDir) -> (Arc<JsonlWriter>, AccessProbe) {
        let log = Arc::new(JsonlWriter::new(tmp.path().join("api_access.log")));
        let ctx = StreamContext {
            started: Instant::now(),
            log: log.clone(),
            provider: ProviderId::ProviderB,
            path: "/v1/chat/completions".to_string(),
            ip: "1.2.3.4".to_string(),
        };
        (log, AccessProbe::new(ctx))
    }

    #[tokio::test]
    async fn relay_passes_chunks_through_unchanged_and_logs_once() {
        let tmp = TempDir::new().unwrap();
        let (log, probe) = make_probe(&tmp);
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"x\":1}\n\n")),
            Ok(Bytes::from_static(b"data: [DONE]\n\n")),
        ];
        let relay = RelayStream::new(futures_util::stream::iter(chunks), probe, 200);

        let collected: Vec<_> = relay.collect().await;
        let joined: Vec<u8> = collected
            .into_iter()
            .flat_map(|c| c.expect("chunk ok").to_vec())
            .collect();
        assert_eq!(joined, b"data: {\"x\":1}\n\ndata: [DONE]\n\n");

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        let record: Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(record["status_code"], 200);
        assert_eq!(record["stream"], true);
        assert!(record["first_byte_ms"].is_u64());
    }

    #[tokio::test]
    async fn dropped_relay_still_logs_the_access_record() {
        let tmp = TempDir::new().unwrap();
        let (log, probe) = make_probe(&tmp);
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"partial"))];
        let mut relay = RelayStream::new(futures_util::stream::iter(chunks), probe, 200);
        // Client disconnect: read one chunk, then drop the stream.
        let _ = relay.next().await;
        drop(relay);

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
