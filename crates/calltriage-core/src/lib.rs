//! calltriage-core: post-call triage library.
//!
//! A finished call's transcript is classified into a [`Decision`] (model-backed with a
//! rule-table fallback), then the [`ActionExecutor`] turns it into client, ticket, and
//! follow-up submissions. [`CallPipeline`] ties both to the sled record store.

mod shared;

pub mod classifier;
pub mod collaborators;
pub mod decision;
pub mod error;
pub mod execution;
pub mod executor;
pub mod pipeline;
pub mod sanitizer;
pub mod store;
pub mod taxonomy;
pub mod ticket_id;
pub mod transcript;

#[cfg(test)]
mod testing;

// Configuration
pub use shared::{CoreConfig, FieldLimits, DEFAULT_LLM_MODE};

// Data model
pub use decision::{ClassificationPath, Decision, Incident, IncidentRef, Priority};
pub use execution::{ActionOutcome, ExecutionResult, TicketOutcome};
pub use transcript::{format_transcript, Speaker, ToolInvocation, ToolResult, TranscriptSegment};

// Errors
pub use error::{BackendError, ClassificationError, CompletionError, StoreError};

// Collaborator seams
pub use collaborators::{
    BackendAck, Backends, ClientBackend, ClientPayload, CompletionService, FollowUpBackend, FollowUpPayload,
    TicketBackend, TicketPayload,
};

// Store
pub use store::{CallAnalysis, CallRecord, CallStatus, CallStore, RecordStore, TicketRecord};

// Classification, execution, orchestration
pub use classifier::{Classification, ClassificationContext, Classifier, FALLBACK_CONFIDENCE, RULES};
pub use executor::{ActionExecutor, ExecutorSettings};
pub use pipeline::{CallPipeline, ProcessOptions};
pub use sanitizer::FieldSanitizer;
