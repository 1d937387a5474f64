//! Client facts recovered from the call itself: backend lookups the voice agent ran
//! (tool results) and details the caller spoke aloud.

use crate::decision::{ExistingClientRef, LeadRef};
use crate::transcript::{tool_results, Speaker, TranscriptSegment};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap();
    static ref POLICY_MENTION: Regex =
        Regex::new(r"(?i)\bpolicy\s*(?:number|no\.?|#)?\s*(?:is\s*)?:?\s*([a-z]{0,5}-?\d[a-z0-9-]{3,})").unwrap();
    static ref NAME_INTRO: Regex =
        Regex::new(r"(?i)\b(?:my name is|my name's|this is|i am|i'm)\s+([A-Za-zÀ-ÿ'-]+(?:\s+[A-Za-zÀ-ÿ'-]+){0,3})").unwrap();
    static ref NATIONAL_ID: Regex = Regex::new(r"(?i)\b(\d{8}-?[a-z]|[xyz]-?\d{7}-?[a-z])\b").unwrap();
}

/// Words that end a spoken name.
const NAME_STOP_WORDS: &[&str] = &[
    "and", "i", "i'm", "im", "but", "my", "from", "calling", "because", "the", "a", "an", "to", "with", "about",
    "here", "so", "yes", "no", "please", "speaking", "again", "still", "not", "calling,",
];

/// What the backend lookups in the transcript revealed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupFindings {
    pub client: Option<ExistingClientRef>,
    pub lead: Option<LeadRef>,
    pub policy_numbers: Vec<String>,
}

impl LookupFindings {
    pub fn is_empty(&self) -> bool {
        self.client.is_none() && self.lead.is_none() && self.policy_numbers.is_empty()
    }
}

/// Scans every tool result. Errors and unparsable payloads are skipped.
pub fn scan_tool_results(segments: &[TranscriptSegment]) -> LookupFindings {
    let mut findings = LookupFindings::default();
    for result in tool_results(segments) {
        let Some(value) = result.parsed() else {
            tracing::debug!(
                target: "calltriage::classifier",
                tool = %result.tool_name,
                is_error = result.is_error,
                "skipping unusable tool result"
            );
            continue;
        };
        let Some(obj) = value.as_object() else { continue };
        if obj.get("found").and_then(Value::as_bool) == Some(false) {
            continue;
        }
        if findings.client.is_none() {
            findings.client = client_from(obj);
        }
        if findings.lead.is_none() {
            findings.lead = obj.get("lead").and_then(Value::as_object).and_then(lead_from);
        }
        collect_policy_numbers(obj, &mut findings.policy_numbers);
        if let Some(nested) = obj.get("client").and_then(Value::as_object) {
            collect_policy_numbers(nested, &mut findings.policy_numbers);
        }
    }
    if let Some(client) = findings.client.as_mut() {
        if client.policy_number.is_none() {
            client.policy_number = findings.policy_numbers.first().cloned();
        }
    }
    findings
}

fn client_from(obj: &Map<String, Value>) -> Option<ExistingClientRef> {
    if let Some(nested) = obj.get("client").and_then(Value::as_object) {
        return client_fields(nested, "id");
    }
    client_fields(obj, "client_id").or_else(|| {
        // Flat `{id, name}` payloads only count when they look like a person.
        obj.contains_key("name").then(|| client_fields(obj, "id")).flatten()
    })
}

fn client_fields(obj: &Map<String, Value>, id_key: &str) -> Option<ExistingClientRef> {
    let id = scalar(obj.get(id_key)?)?;
    let name = ["name", "full_name", "client_name"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(scalar))
        .unwrap_or_default();
    Some(ExistingClientRef {
        id,
        name,
        policy_number: obj.get("policy_number").and_then(scalar),
    })
}

fn lead_from(obj: &Map<String, Value>) -> Option<LeadRef> {
    Some(LeadRef {
        id: scalar(obj.get("id").or_else(|| obj.get("lead_id"))?)?,
        campaign: obj.get("campaign").and_then(scalar),
        line_of_business: obj.get("line_of_business").and_then(scalar),
    })
}

fn collect_policy_numbers(obj: &Map<String, Value>, out: &mut Vec<String>) {
    let mut push = |v: String| {
        if !out.contains(&v) {
            out.push(v);
        }
    };
    if let Some(p) = obj.get("policy_number").and_then(scalar) {
        push(p);
    }
    if let Some(policies) = obj.get("policies").and_then(Value::as_array) {
        for policy in policies {
            let number = match policy {
                Value::Object(p) => ["policy_number", "number", "id"]
                    .iter()
                    .find_map(|k| p.get(*k).and_then(scalar)),
                other => scalar(other),
            };
            if let Some(n) = number {
                push(n);
            }
        }
    }
}

fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Details the caller stated: `full_name`, `email`, `policy_number`, `national_id`.
pub fn spoken_fields(segments: &[TranscriptSegment]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for segment in segments.iter().filter(|s| s.speaker == Speaker::User) {
        let text = segment.message.as_str();
        if !fields.contains_key("full_name") {
            if let Some(name) = NAME_INTRO.captures(text).and_then(|c| c.get(1)).and_then(|m| clean_name(m.as_str())) {
                fields.insert("full_name".to_string(), name);
            }
        }
        if !fields.contains_key("email") {
            if let Some(m) = EMAIL.find(text) {
                fields.insert("email".to_string(), m.as_str().to_lowercase());
            }
        }
        if !fields.contains_key("policy_number") {
            if let Some(m) = POLICY_MENTION.captures(text).and_then(|c| c.get(1)) {
                fields.insert("policy_number".to_string(), m.as_str().to_uppercase());
            }
        }
        if !fields.contains_key("national_id") {
            if let Some(m) = NATIONAL_ID.captures(text).and_then(|c| c.get(1)) {
                fields.insert("national_id".to_string(), m.as_str().to_uppercase().replace('-', ""));
            }
        }
    }
    fields
}

/// Keeps capitalized words up to the first stop word.
fn clean_name(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw
        .split_whitespace()
        .take_while(|w| !NAME_STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    if words.is_empty() || !words[0].chars().next().is_some_and(char::is_uppercase) {
        return None;
    }
    Some(words.join(" "))
}
