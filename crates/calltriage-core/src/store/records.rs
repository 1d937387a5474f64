use crate::decision::{ClassificationPath, Decision, TicketKind};
use crate::execution::ExecutionResult;
use crate::transcript::TranscriptSegment;
use serde::{Deserialize, Serialize};

/// Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Lifecycle of a call record. Every pipeline run ends in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Received,
    Processing,
    Processed,
    ProcessedWithErrors,
    Failed,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::ProcessedWithErrors | Self::Failed)
    }
}

/// Denormalized analysis written back to the call record after execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAnalysis {
    #[serde(default)]
    pub decision: Option<Decision>,
    pub execution: ExecutionResult,
    #[serde(default)]
    pub classifier_path: Option<ClassificationPath>,
    pub processed_at_ms: i64,
}

/// A finished phone call as produced by upstream ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub caller_phone: Option<String>,
    /// Backend client id when upstream already knows the caller.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub recording_ref: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptSegment>,
    #[serde(default)]
    pub status: CallStatus,
    #[serde(default)]
    pub analysis: Option<CallAnalysis>,
    #[serde(default = "now_ms")]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
}

impl CallRecord {
    pub fn new(call_id: impl Into<String>, transcript: Vec<TranscriptSegment>) -> Self {
        let now = now_ms();
        Self {
            call_id: call_id.into(),
            conversation_id: None,
            caller_phone: None,
            client_id: None,
            recording_ref: None,
            transcript,
            status: CallStatus::Received,
            analysis: None,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Ticket as shown on the dashboard; the ticket backend remains the system of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub ticket_id: String,
    pub call_id: String,
    pub client_id: String,
    pub kind: TicketKind,
    pub category: String,
    pub reason: String,
    #[serde(default)]
    pub line_of_business: Option<String>,
    #[serde(default)]
    pub policy_number: Option<String>,
    #[serde(default)]
    pub caller_phone: Option<String>,
    /// Identifier echoed by the backend, when it differs from ours.
    #[serde(default)]
    pub backend_ticket_id: Option<String>,
    pub created_at_ms: i64,
}

impl TicketRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Lenient decode used by scans: unreadable rows are skipped.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}
