//! Transcript model and the formatter that flattens it for prompting and pattern matching.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Who spoke a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    User,
}

impl Speaker {
    /// Upper-cased label used in formatted transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Agent => "AGENT",
            Speaker::User => "USER",
        }
    }
}

/// A backend lookup requested by the voice agent during the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Output of a backend lookup. `result_value` is JSON-encoded and must be parsed before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub result_value: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Parsed payload; `None` for error results or unparsable values.
    pub fn parsed(&self) -> Option<serde_json::Value> {
        if self.is_error {
            return None;
        }
        serde_json::from_str(&self.result_value).ok()
    }
}

/// Ordered unit of conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub sequence: u32,
    pub speaker: Speaker,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: f64,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
}

impl TranscriptSegment {
    pub fn new(sequence: u32, speaker: Speaker, message: impl Into<String>) -> Self {
        Self {
            sequence,
            speaker,
            message: message.into(),
            start_time: 0.0,
            end_time: 0.0,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn with_tool_result(mut self, result: ToolResult) -> Self {
        self.tool_results.push(result);
        self
    }
}

/// Renders segments as `SPEAKER: message` lines, each followed by a `TOOL_RESULTS:`
/// block when the segment carries tool results. No truncation or reordering.
pub fn format_transcript(segments: &[TranscriptSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = write!(out, "{}: {}", segment.speaker.label(), segment.message);
        if !segment.tool_results.is_empty() {
            out.push_str("\nTOOL_RESULTS:");
            for result in &segment.tool_results {
                let _ = write!(
                    out,
                    "\n  - tool_name: {}\n    result_value: {}\n    is_error: {}",
                    result.tool_name, result.result_value, result.is_error
                );
            }
        }
    }
    out
}

/// Lower-cased concatenation of the messages spoken by `speaker`, for keyword matching.
pub fn lowered_text_by(segments: &[TranscriptSegment], speaker: Speaker) -> String {
    segments
        .iter()
        .filter(|s| s.speaker == speaker)
        .map(|s| s.message.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// All tool results in transcript order.
pub fn tool_results(segments: &[TranscriptSegment]) -> impl Iterator<Item = &ToolResult> {
    segments.iter().flat_map(|s| s.tool_results.iter())
}
