//! Locates the JSON object inside a free-form completion.

use crate::error::ClassificationError;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"```[A-Za-z]*[ \t]*\r?\n?([\s\S]*?)```").unwrap();
}

/// Tries, in order: the whole response, each fenced code block, the first balanced
/// top-level `{...}` span. Only objects are accepted.
pub fn extract_json(text: &str) -> Result<Value, ClassificationError> {
    let trimmed = text.trim();
    if let Some(v) = parse_object(trimmed) {
        return Ok(v);
    }
    for caps in FENCED_BLOCK.captures_iter(trimmed) {
        if let Some(v) = caps.get(1).and_then(|m| parse_object(m.as_str().trim())) {
            return Ok(v);
        }
    }
    first_object_span(trimmed)
        .and_then(parse_object)
        .ok_or(ClassificationError::NoJson)
}

fn parse_object(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate).ok().filter(Value::is_object)
}

/// Slice from the first `{` to its matching `}`, skipping braces inside strings.
fn first_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
