use propwatch_models::ParseQuality;
use serde::de::DeserializeOwned;

use crate::error::AgentError;

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common model response formats:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the analysis:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    extract_balanced_json(text, '{', '}').ok_or_else(|| {
        AgentError::Parse(format!(
            "No valid JSON object found in response (length={})",
            text.len()
        ))
    })
}

/// Same as [`extract_json`] for a top-level JSON array.
pub fn extract_json_array(text: &str) -> Result<String, AgentError> {
    extract_balanced_json(text, '[', ']').ok_or_else(|| {
        AgentError::Parse(format!(
            "No valid JSON array found in response (length={})",
            text.len()
        ))
    })
}

fn extract_balanced_json(text: &str, open: char, close: char) -> Option<String> {
    let trimmed = text.trim();
    let is_json = |s: &str| serde_json::from_str::<serde_json::Value>(s).is_ok();

    // Try parsing the whole thing as JSON first
    if trimmed.starts_with(open) && is_json(trimmed) {
        return Some(trimmed.to_string());
    }

    // Try extracting from markdown code block
    if let Some(json_str) = extract_from_markdown_block(trimmed) {
        if json_str.starts_with(open) && is_json(&json_str) {
            return Some(json_str);
        }
    }

    // Try each balanced pair in turn until one is valid JSON
    let mut offset = 0;
    while let Some(pos) = trimmed[offset..].find(open) {
        let start = offset + pos;
        if let Some(span) = extract_first_balanced(&trimmed[start..], open, close) {
            if is_json(&span) {
                return Some(span);
            }
        }
        offset = start + open.len_utf8();
    }
    None
}

/// Extract JSON from a markdown code block (```json ... ``` or ``` ... ```)
fn extract_from_markdown_block(text: &str) -> Option<String> {
    // Look for ```json or just ```
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let json_start = start + marker.len();
            if let Some(end) = text[json_start..].find("```") {
                let extracted = text[json_start..json_start + end].trim();
                return Some(extracted.to_string());
            }
        }
    }

    None
}

/// Find the first balanced `open ... close` span in the text, skipping string contents.
fn extract_first_balanced(text: &str, open: char, close: char) -> Option<String> {
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            c if c == open && !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            c if c == close && !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// Result of the two-tier parse. `value` is `None` only when `quality` is `Failed`.
#[derive(Debug)]
pub struct Parsed<T> {
    pub value: Option<T>,
    pub quality: ParseQuality,
    /// Why the strict tier (and, on `Failed`, the fallback) rejected the text.
    pub error: Option<String>,
}

/// Expected top-level JSON shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Object,
    Array,
}

/// Strict parse of the whole text, then best-effort extraction.
///
/// The fallback tier is reported as [`ParseQuality::Recovered`], never as
/// `Strict`, and a total failure is a value, not an error.
pub fn parse_two_tier<T: DeserializeOwned>(text: &str, shape: JsonShape) -> Parsed<T> {
    let strict_err = match serde_json::from_str::<T>(text.trim()) {
        Ok(value) => {
            return Parsed {
                value: Some(value),
                quality: ParseQuality::Strict,
                error: None,
            }
        }
        Err(e) => e.to_string(),
    };

    let extracted = match shape {
        JsonShape::Object => extract_json(text),
        JsonShape::Array => extract_json_array(text),
    };
    let fallback = extracted.and_then(|json| {
        serde_json::from_str::<T>(&json).map_err(|e| AgentError::Parse(e.to_string()))
    });

    match fallback {
        Ok(value) => Parsed {
            value: Some(value),
            quality: ParseQuality::Recovered,
            error: Some(strict_err),
        },
        Err(e) => Parsed {
            value: None,
            quality: ParseQuality::Failed,
            error: Some(format!("strict: {strict_err}; fallback: {e}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        player_name: String,
    }

    #[test]
    fn extract_clean_json() {
        let input = r#"{"description": "two absentees", "confirmed_out": []}"#;
        let result = extract_json(input).unwrap();
        assert_eq!(result, input);
    }

    #[test]
    fn extract_from_markdown() {
        let input = "Here is my research:\n```json\n{\"description\": \"ok\"}\n```\nDone.";
        let result = extract_json(input).unwrap();
        assert_eq!(result, r#"{"description": "ok"}"#);
    }

    #[test]
    fn extract_from_markdown_no_lang() {
        let input = "Result:\n```\n{\"description\": \"ok\"}\n```";
        let result = extract_json(input).unwrap();
        assert_eq!(result, r#"{"description": "ok"}"#);
    }

    #[test]
    fn extract_with_prefix_text() {
        let input = "Based on my searches, here is the result:\n{\"description\": \"Saka doubtful\"}";
        let result = extract_json(input).unwrap();
        assert!(result.contains("Saka"));
    }

    #[test]
    fn extract_with_braces_in_strings() {
        let input = r#"{"details": "out {2-3 weeks}", "description": "x"}"#;
        let result = extract_json(input).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["description"], "x");
    }

    #[test]
    fn extract_array_after_prose() {
        let input = "Alerts below [see notes]:\n[{\"player_name\": \"Bukayo Saka\"}]";
        let result = extract_json_array(input).unwrap();
        assert_eq!(result, r#"[{"player_name": "Bukayo Saka"}]"#);
        let input = "Alerts:\n```json\n[{\"player_name\": \"Bukayo Saka\"}]\n```";
        let result = extract_json_array(input).unwrap();
        assert!(result.starts_with('['));
    }

    #[test]
    fn extract_no_json() {
        assert!(extract_json("This is just plain text with no JSON at all.").is_err());
        assert!(extract_json_array("No opportunities this week.").is_err());
    }

    #[test]
    fn two_tier_strict() {
        let parsed: Parsed<Vec<Item>> =
            parse_two_tier(r#"[{"player_name": "Bukayo Saka"}]"#, JsonShape::Array);
        assert_eq!(parsed.quality, ParseQuality::Strict);
        assert_eq!(parsed.value.unwrap()[0].player_name, "Bukayo Saka");
        assert!(parsed.error.is_none());
    }

    #[test]
    fn two_tier_recovered() {
        let parsed: Parsed<Vec<Item>> = parse_two_tier(
            "Here you go:\n```json\n[{\"player_name\": \"Ben White\"}]\n```",
            JsonShape::Array,
        );
        assert_eq!(parsed.quality, ParseQuality::Recovered);
        assert_eq!(parsed.value.unwrap().len(), 1);
        assert!(parsed.error.is_some());
    }

    #[test]
    fn two_tier_failed() {
        let parsed: Parsed<Vec<Item>> =
            parse_two_tier("I could not find anything.", JsonShape::Array);
        assert_eq!(parsed.quality, ParseQuality::Failed);
        assert!(parsed.value.is_none());
        assert!(parsed.error.unwrap().contains("fallback"));
    }
}
