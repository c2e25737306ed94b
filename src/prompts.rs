//! System-prompt catalog for the LLM-backed parse modes.
//!
//! Every template demands a single bare JSON object (no markdown fencing),
//! enumerates the required fields, and restates the structural rule that
//! keys are always English snake_case regardless of content language.

/// LLM-backed extraction mode. Also keys the response contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmMode {
    Core,
    Auto,
    Ecom,
    News,
    Social,
}

impl LlmMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LlmMode::Core => "core",
            LlmMode::Auto => "auto",
            LlmMode::Ecom => "ecom",
            LlmMode::News => "news",
            LlmMode::Social => "social",
        }
    }
}

/// Canonical alignment sentence prepended to every effective instruction.
pub const LANGUAGE_ALIGNMENT: &str = "JSON keys must always be in English snake_case. Values must match the source language unless target_lang is specified. If target_lang=zh, translate all extracted values to Chinese.";

const CORE_PROMPT: &str = "You are a structured data extraction engine. Read the input and respond with exactly one JSON object, no markdown fencing, no commentary. Required fields: schema_version (string), extracted (object holding every fact grounded in the input), confidence (number between 0 and 1). Keys are always English snake_case.";

const AUTO_PROMPT: &str = "You are a content classifier and extractor. Respond with exactly one JSON object, no markdown fencing. Required fields: schema_version (string), type (lower snake_case label such as product_page, news_article or free_text), data (object with the extracted content), confidence (number between 0 and 1). Keys are always English snake_case.";

const ECOM_PROMPT: &str = "You extract e-commerce product data. Respond with exactly one JSON object, no markdown fencing. Required fields: title (string), price (number), currency (ISO currency code string), spec (object of attribute name to value), skus (array of variants), bullet_points (array of selling points). Keys are always English snake_case.";

const NEWS_PROMPT: &str = "You extract news articles. Respond with exactly one JSON object, no markdown fencing. Required fields: title (string), author (string or null), published_at (string or null), summary (string), viewpoints (array of distinct positions in the piece), entities (array of people, orgs and places). Keys are always English snake_case.";

const SOCIAL_PROMPT: &str = "You analyze social media posts and comments. Respond with exactly one JSON object, no markdown fencing. Required fields: sentiment (string), core_demand (string describing what the author wants), brands (array of brand mentions), purchase_intent (boolean), purchase_intent_reason (string). Keys are always English snake_case.";

pub fn system_prompt(mode: LlmMode) -> &'static str {
    match mode {
        LlmMode::Core => CORE_PROMPT,
        LlmMode::Auto => AUTO_PROMPT,
        LlmMode::Ecom => ECOM_PROMPT,
        LlmMode::News => NEWS_PROMPT,
        LlmMode::Social => SOCIAL_PROMPT,
    }
}

/// Prepend the alignment sentence unless the instruction already carries it.
pub fn align(instruction: &str) -> String {
    if instruction.contains(LANGUAGE_ALIGNMENT) {
        return instruction.to_string();
    }
    if instruction.is_empty() {
        return LANGUAGE_ALIGNMENT.to_string();
    }
    format!("{LANGUAGE_ALIGNMENT}\n\n{instruction}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_prepends_once() {
        let first = align("Extract the product.");
        assert!(first.starts_with(LANGUAGE_ALIGNMENT));
        assert!(first.ends_with("Extract the product."));
        // Idempotent: aligning an aligned instruction changes nothing.
        assert_eq!(align(&first), first);
    }

    #[test]
    fn align_on_empty_is_just_the_preamble() {
        assert_eq!(align(""), LANGUAGE_ALIGNMENT);
    }

    #[test]
    fn every_template_mentions_its_required_fields() {
        assert!(system_prompt(LlmMode::Ecom).contains("bullet_points"));
        assert!(system_prompt(LlmMode::News).contains("published_at"));
        assert!(system_prompt(LlmMode::Social).contains("purchase_intent_reason"));
        assert!(system_prompt(LlmMode::Auto).contains("schema_version"));
        assert!(system_prompt(LlmMode::Core).contains("extracted"));
    }
}
