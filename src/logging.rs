//! Append-only JSONL log sinks.
//!
//! Two files: the monetization log (one line per parse request) and the
//! access log (one line per proxied chat exchange). A mutex around the
//! shared handle keeps line writes exclusive; each line is flushed.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;

pub struct JsonlWriter {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record).context("serialize log record")?;
        let mut guard = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("log handle poisoned"))?;

        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log dir {}", parent.display()))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o755));
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("open log file {}", self.path.display()))?;
            *guard = Some(file);
        }

        if let Some(file) = guard.as_mut() {
            writeln!(file, "{line}")?;
            file.flush()?;
        }
        Ok(())
    }
}

/// One line per parse request, success or failure.
#[derive(Debug, Serialize)]
pub struct MonetizationRecord {
    pub ts: u64,
    pub request_id: String,
    pub ok: bool,
    pub mode: String,
    pub resolved_mode: Option<String>,
    pub client_ip: String,
    pub input_bytes: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub provider: Option<String>,
    pub tier: Option<String>,
    pub model: Option<String>,
    pub duration_ms: u64,
    pub error_code: Option<String>,
}

/// One line per proxied chat exchange.
#[derive(Debug, Serialize)]
pub struct AccessRecord {
    pub ts: u64,
    pub provider: String,
    pub status_code: u16,
    pub first_byte_ms: Option<u64>,
    pub total_latency_ms: u64,
    pub path: String,
    pub stream: bool,
    pub ip: String,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_creates_dir_and_writes_lines() {
        let tmp = TempDir::new().unwrap();
        let writer = JsonlWriter::new(tmp.path().join("log/ps_parse.log"));
        let rec = MonetizationRecord {
            ts: 1,
            request_id: "req-1".into(),
            ok: true,
            mode: "auto".into(),
            resolved_mode: Some("json".into()),
            client_ip: "1.2.3.4".into(),
            input_bytes: 10,
            input_tokens: 0,
            output_tokens: 0,
            provider: None,
            tier: None,
            model: None,
            duration_ms: 3,
            error_code: None,
        };
        writer.append(&rec).unwrap();
        writer.append(&rec).unwrap();

        let content = std::fs::read_to_string(writer.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["request_id"], "req-1");
        assert_eq!(parsed["resolved_mode"], "json");
        assert_eq!(parsed["provider"], serde_json::Value::Null);
    }

    #[test]
    fn access_record_serializes_all_fields() {
        let rec = AccessRecord {
            ts: 2,
            provider: "provider-b".into(),
            status_code: 200,
            first_byte_ms: Some(12),
            total_latency_ms: 80,
            path: "/v1/chat/completions".into(),
            stream: true,
            ip: "unknown".into(),
            note: None,
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["status_code"], 200);
        assert_eq!(v["first_byte_ms"], 12);
        assert_eq!(v["stream"], true);
    }
}
