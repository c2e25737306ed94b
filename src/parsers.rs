//! Local format parsers: JSON, query-string, key-value lines, CSV.
//!
//! Each parser is independent and returns `None` on any mismatch; the
//! orchestrator walks them in cascade order and takes the first hit.

use serde_json::{Map, Value};

/// Upper bound on decoded CSV data rows.
pub const CSV_MAX_ROWS: usize = 999;

/// Strict JSON: the trimmed input must start with `{` or `[` and decode
/// without recovery.
pub fn parse_json(input: &str) -> Option<Value> {
    let t = input.trim();
    if !(t.starts_with('{') || t.starts_with('[')) {
        return None;
    }
    serde_json::from_str(t).ok()
}

/// Query-string with standard form semantics. Dots in keys are normalized
/// to underscores so the output keys stay snake_case-compatible; this is
/// documented behavior, not a defect.
pub fn parse_query(input: &str) -> Option<Value> {
    let t = input.trim();
    if !t.contains('=') {
        return None;
    }
    let mut map = Map::new();
    for (k, v) in url::form_urlencoded::parse(t.as_bytes()) {
        if k.is_empty() {
            continue;
        }
        map.insert(k.replace('.', "_"), Value::String(v.into_owned()));
    }
    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}

/// Line-oriented `key=value` / `key: value` pairs. Blank lines and lines
/// starting with `#` or `//` are skipped; `=` wins over `:` when both occur.
pub fn parse_kv(input: &str) -> Option<Value> {
    let mut map = Map::new();
    for raw in input.split(['\r', '\n']) {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let sep = match line.find('=').or_else(|| line.find(':')) {
            Some(i) => i,
            None => continue,
        };
        let (key, rest) = line.split_at(sep);
        map.insert(
            sanitize_key(key.trim()),
            Value::String(rest[1..].trim().to_string()),
        );
    }
    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}

/// Naive comma-split CSV: first non-empty line is the header, columns are
/// aligned by the shorter of header and row, and at most [`CSV_MAX_ROWS`]
/// data rows are decoded to bound memory.
pub fn parse_csv(input: &str) -> Option<Value> {
    if !input.contains(',') || !input.contains(['\n', '\r']) {
        return None;
    }
    let mut lines = input.split(['\r', '\n']).filter(|l| !l.trim().is_empty());
    let header: Vec<String> = lines
        .next()?
        .split(',')
        .map(|cell| sanitize_key(cell.trim()))
        .collect();
    let mut rows = Vec::new();
    for line in lines.take(CSV_MAX_ROWS) {
        let cells: Vec<&str> = line.split(',').collect();
        let width = header.len().min(cells.len());
        let mut row = Map::new();
        for i in 0..width {
            row.insert(header[i].clone(), Value::String(cells[i].trim().to_string()));
        }
        rows.push(Value::Object(row));
    }
    if rows.is_empty() {
        None
    } else {
        Some(Value::Array(rows))
    }
}

/// Make an arbitrary string safe as an object key: everything outside
/// `[A-Za-z0-9_.-]` becomes `_`, runs of `_` collapse, edges are trimmed,
/// and an empty result falls back to `"key"`.
pub fn sanitize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_underscore = false;
    for ch in raw.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-') {
            ch
        } else {
            '_'
        };
        if mapped == '_' {
            if prev_underscore {
                continue;
            }
            prev_underscore = true;
        } else {
            prev_underscore = false;
        }
        out.push(mapped);
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "key".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_requires_object_or_array_start() {
        assert_eq!(
            parse_json("  {\"a\":1,\"b\":[true,null]}"),
            Some(json!({"a": 1, "b": [true, null]}))
        );
        assert_eq!(parse_json("[1,2]"), Some(json!([1, 2])));
        assert_eq!(parse_json("\"plain string\""), None);
        assert_eq!(parse_json("{broken"), None);
        assert_eq!(parse_json("42"), None);
    }

    #[test]
    fn query_decodes_pairs_and_normalizes_dotted_keys() {
        assert_eq!(
            parse_query("a=1&b.c=2&name=a%20b"),
            Some(json!({"a": "1", "b_c": "2", "name": "a b"}))
        );
        assert_eq!(parse_query("no separator here"), None);
    }

    #[test]
    fn kv_skips_comments_and_blank_lines() {
        let input = "name=alice\nage=30\n# comment\n// also skipped\n\npath=/tmp";
        assert_eq!(
            parse_kv(input),
            Some(json!({"name": "alice", "age": "30", "path": "/tmp"}))
        );
    }

    #[test]
    fn kv_prefers_equals_over_colon() {
        assert_eq!(
            parse_kv("url: http=value\nplain: here"),
            Some(json!({"url_http": "value", "plain": "here"}))
        );
        assert_eq!(parse_kv("nothing to split"), None);
    }

    #[test]
    fn csv_sanitizes_header_and_aligns_short_rows() {
        let input = "col a,b\n1,2\n3,4";
        assert_eq!(
            parse_csv(input),
            Some(json!([
                {"col_a": "1", "b": "2"},
                {"col_a": "3", "b": "4"}
            ]))
        );
        // Row longer than header: extras dropped. Row shorter: missing keys absent.
        assert_eq!(
            parse_csv("a,b\n1,2,3\n4"),
            Some(json!([{"a": "1", "b": "2"}, {"a": "4"}]))
        );
    }

    #[test]
    fn csv_requires_comma_and_line_break() {
        assert_eq!(parse_csv("a,b"), None);
        assert_eq!(parse_csv("a\nb"), None);
        assert_eq!(parse_csv("a,b\n"), None);
    }

    #[test]
    fn csv_caps_decoded_rows() {
        let mut input = String::from("n\r\n");
        for i in 0..(CSV_MAX_ROWS + 50) {
            input.push_str(&format!("{i},x\n"));
        }
        let rows = parse_csv(&input).expect("csv decodes");
        assert_eq!(rows.as_array().map(Vec::len), Some(CSV_MAX_ROWS));
    }

    #[test]
    fn sanitize_key_cases() {
        assert_eq!(sanitize_key("col a"), "col_a");
        assert_eq!(sanitize_key("a__b"), "a_b");
        assert_eq!(sanitize_key("  !!weird!! "), "weird");
        assert_eq!(sanitize_key("!!!"), "key");
        assert_eq!(sanitize_key(""), "key");
        assert_eq!(sanitize_key("ok-key.v2"), "ok-key.v2");
    }
}
