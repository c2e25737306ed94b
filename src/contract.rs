//! Response contracts for LLM output.
//!
//! Each mode pins a required field set; `validate` walks the returned value
//! and reports what is missing or malformed. Two pseudo-fields mark shape
//! problems that are not plain omissions: `json_object` when the top-level
//! value is not an object, `type_snake_case` when auto's `type` label fails
//! the snake_case pattern.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::prompts::LlmMode;

fn snake_case_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[a-z0-9_]+$").expect("static pattern"))
}

/// Missing/malformed field names, in contract order. Empty means valid.
pub fn validate(mode: LlmMode, value: &Value) -> Vec<String> {
    let obj = match value.as_object() {
        Some(o) => o,
        None => return vec!["json_object".to_string()],
    };
    let mut missing: Vec<&str> = Vec::new();
    let field = |name: &str| obj.get(name);

    match mode {
        LlmMode::Core => {
            if !is_nonempty_string(field("schema_version")) {
                missing.push("schema_version");
            }
            if !is_object(field("extracted")) {
                missing.push("extracted");
            }
            if !is_number(field("confidence")) {
                missing.push("confidence");
            }
        }
        LlmMode::Auto => {
            if !is_nonempty_string(field("schema_version")) {
                missing.push("schema_version");
            }
            match field("type").and_then(Value::as_str) {
                None | Some("") => missing.push("type"),
                Some(label) => {
                    if !snake_case_re().is_match(label) {
                        missing.push("type_snake_case");
                    }
                }
            }
            if !is_object(field("data")) {
                missing.push("data");
            }
            if !is_number(field("confidence")) {
                missing.push("confidence");
            }
        }
        LlmMode::Ecom => {
            if !is_nonempty_string(field("title")) {
                missing.push("title");
            }
            if !is_numeric_like(field("price")) {
                missing.push("price");
            }
            if !field("currency")
                .and_then(Value::as_str)
                .map(|c| c.chars().count() >= 3)
                .unwrap_or(false)
            {
                missing.push("currency");
            }
            if !is_object(field("spec")) {
                missing.push("spec");
            }
            if !is_array(field("skus")) {
                missing.push("skus");
            }
            if !is_array(field("bullet_points")) {
                missing.push("bullet_points");
            }
        }
        LlmMode::News => {
            if !is_nonempty_string(field("title")) {
                missing.push("title");
            }
            if !is_string_or_null(field("author")) {
                missing.push("author");
            }
            if !is_string_or_null(field("published_at")) {
                missing.push("published_at");
            }
            if !is_string(field("summary")) {
                missing.push("summary");
            }
            if !is_array(field("viewpoints")) {
                missing.push("viewpoints");
            }
            if !is_array(field("entities")) {
                missing.push("entities");
            }
        }
        LlmMode::Social => {
            if !is_nonempty_string(field("sentiment")) {
                missing.push("sentiment");
            }
            if !is_string(field("core_demand")) {
                missing.push("core_demand");
            }
            if !is_array(field("brands")) {
                missing.push("brands");
            }
            if !matches!(field("purchase_intent"), Some(Value::Bool(_))) {
                missing.push("purchase_intent");
            }
            if !is_nonempty_string(field("purchase_intent_reason")) {
                missing.push("purchase_intent_reason");
            }
        }
    }
    missing.into_iter().map(String::from).collect()
}

fn is_nonempty_string(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::String(s)) if !s.is_empty())
}

fn is_string(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::String(_)))
}

fn is_string_or_null(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::String(_)) | Some(Value::Null))
}

fn is_object(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Object(_)))
}

fn is_array(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Array(_)))
}

fn is_number(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Number(_)))
}

/// A price is a JSON number or a string that parses as one after European
/// decimal commas are normalized.
fn is_numeric_like(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Number(_)) => true,
        Some(Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().is_ok(),
        _ => false,
    }
}
