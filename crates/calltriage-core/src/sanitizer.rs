//! Field sanitizer: normalizes free text to fit the ticket backend's length and
//! charset constraints. Every transform is total; the worst case is an empty or
//! truncated string.

use crate::shared::FieldLimits;
use lazy_static::lazy_static;
use regex::Regex;

const ELLIPSIS: &str = "...";

/// Substituted when notes are empty after sanitization.
pub const NO_NOTES: &str = "No additional notes";

lazy_static! {
    /// Whole-value placeholders the model or the agent emit instead of a real number.
    static ref PLACEHOLDER_VALUE: Regex = Regex::new(
        r"(?i)^\s*(pending|unknown|n/?a|none|null|tbd|tbc|-+|\?+|no policy( number)?|sin (especificar|datos)|por (obtener|confirmar))\s*$"
    )
    .unwrap();
    /// Descriptive phrases that mark a value as prose rather than an identifier.
    static ref PLACEHOLDER_PHRASE: Regex = Regex::new(
        r"(?i)\b(to be (obtained|confirmed|provided|determined|requested)|not (specified|provided|available|known|given|mentioned)|will (provide|send|check)|does not (know|remember)|doesn't (know|remember))\b"
    )
    .unwrap();
    static ref POLICY_SEPARATORS: Regex = Regex::new(r"[,;|\n]").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Trims and, when longer than `max` characters, truncates and appends an ellipsis.
/// The result never exceeds `max` characters.
pub fn clamp_text(field: &str, value: &str, max: usize) -> String {
    let trimmed = value.trim();
    let original_len = trimmed.chars().count();
    if original_len <= max {
        return trimmed.to_string();
    }
    let clamped = if max <= ELLIPSIS.len() {
        trimmed.chars().take(max).collect::<String>()
    } else {
        let head: String = trimmed.chars().take(max - ELLIPSIS.len()).collect();
        format!("{}{}", head.trim_end(), ELLIPSIS)
    };
    tracing::debug!(
        target: "calltriage::sanitizer",
        field = field,
        original_len = original_len,
        new_len = clamped.chars().count(),
        "truncated {} by {} characters",
        field,
        original_len - clamped.chars().count()
    );
    clamped
}

fn is_descriptive(value: &str) -> bool {
    PLACEHOLDER_VALUE.is_match(value) || PLACEHOLDER_PHRASE.is_match(value)
}

fn has_digit(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Prose of more than three words with no digit is not an identifier either.
fn is_placeholder_token(token: &str) -> bool {
    is_descriptive(token) || (!has_digit(token) && token.split_whitespace().count() > 3)
}

/// Separator-delimited tokens, deduplicated. A run of space-separated words that
/// each carry a digit is a list in its own right and is split.
fn policy_tokens(value: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in POLICY_SEPARATORS.split(value) {
        let token = WHITESPACE_RUN.replace_all(raw.trim(), " ").to_string();
        if token.is_empty() {
            continue;
        }
        let words: Vec<&str> = token.split(' ').collect();
        let pieces: Vec<String> = if words.len() > 1 && words.iter().all(|w| has_digit(w)) {
            words.into_iter().map(str::to_string).collect()
        } else {
            vec![token]
        };
        for piece in pieces {
            if is_placeholder_token(&piece) {
                tracing::debug!(target: "calltriage::sanitizer", token = %piece, "dropped non-identifier policy token");
                continue;
            }
            if !tokens.contains(&piece) {
                tokens.push(piece);
            }
        }
    }
    tokens
}

/// Normalizes one or more policy numbers into the backend's pipe-delimited form.
///
/// Placeholders yield an empty string. Commas (rejected by the backend) and other
/// separators become `|`. When the list exceeds `max`, whole tokens are kept greedily.
/// Idempotent.
pub fn normalize_policy_number(value: &str, max: usize) -> String {
    if is_descriptive(value) {
        return String::new();
    }
    let tokens = policy_tokens(value);

    let mut out = String::new();
    for token in &tokens {
        let extra = if out.is_empty() { 0 } else { 1 } + token.chars().count();
        if out.chars().count() + extra > max {
            if out.is_empty() {
                // The cut token is re-normalized so a second pass cannot change it.
                let cut: String = token.chars().take(max).collect();
                out = normalize_policy_number(cut.trim_end(), max);
                if out.is_empty() {
                    continue;
                }
            }
            break;
        }
        if !out.is_empty() {
            out.push('|');
        }
        out.push_str(token);
    }

    if out != value {
        tracing::debug!(
            target: "calltriage::sanitizer",
            original_len = value.chars().count(),
            new_len = out.chars().count(),
            tokens_kept = out.split('|').filter(|t| !t.is_empty()).count(),
            tokens_seen = tokens.len(),
            "normalized policy number"
        );
    }
    out
}

fn is_pictographic(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF
            | 0x2300..=0x23FF
            | 0x2600..=0x27BF
            | 0x2B00..=0x2BFF
            | 0xFE00..=0xFE0F
            | 0x200D
            | 0xE0000..=0xE007F
    )
}

/// Characters the backend accepts in notes.
pub fn is_allowed_note_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == ' '
        || ".,;:!?¿¡'\"()-_/@#%&+=*".contains(c)
        || "áéíóúüñçàèìòùÁÉÍÓÚÜÑÇÀÈÌÒÙ".contains(c)
}

/// Flattens notes to a single plain-text line within the notes budget.
pub fn normalize_notes(value: &str, max: usize) -> String {
    let flattened: String = value
        .chars()
        .map(|c| if matches!(c, '\r' | '\n' | '\t') { ' ' } else { c })
        .filter(|c| !is_pictographic(*c))
        .filter(|c| is_allowed_note_char(*c))
        .collect();
    let collapsed = WHITESPACE_RUN.replace_all(flattened.trim(), " ");
    let clamped = clamp_text("notes", &collapsed, max);
    if clamped.is_empty() {
        clamp_text("notes", NO_NOTES, max)
    } else {
        clamped
    }
}

/// The three transforms bound to the configured budgets.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldSanitizer {
    pub limits: FieldLimits,
}

impl FieldSanitizer {
    pub fn new(limits: FieldLimits) -> Self {
        Self { limits }
    }

    pub fn text(&self, field: &str, value: &str) -> String {
        clamp_text(field, value, self.limits.text_field_max_len)
    }

    /// Sanitized policy number; `None` when nothing usable remains.
    pub fn policy_number(&self, value: Option<&str>) -> Option<String> {
        value
            .map(|v| normalize_policy_number(v, self.limits.policy_number_max_len))
            .filter(|v| !v.is_empty())
    }

    pub fn notes(&self, value: &str) -> String {
        normalize_notes(value, self.limits.notes_max_len)
    }
}
