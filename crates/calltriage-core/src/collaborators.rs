//! External collaborators consumed by the pipeline and the payloads they accept.
//!
//! Every call is a blocking network operation with a bounded timeout. Timeouts and
//! non-2xx responses are failures; nothing here retries.

use crate::error::{BackendError, CompletionError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Generative completion service: one prompt in, free text out.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Short name for logs (e.g. "mock", "live").
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Sanitized, flat ticket submitted to the ticket backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketPayload {
    pub client_id: String,
    pub ticket_id: String,
    pub call_id: String,
    pub category: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_of_business: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_ref: Option<String>,
}

/// Client-creation request built from extracted caller fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientPayload {
    pub client_id: String,
    pub given_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
}

/// Continuation logged against an existing ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpPayload {
    pub client_id: String,
    pub related_ticket_id: String,
    pub call_id: String,
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_ref: Option<String>,
}

/// Backend response: `{accepted, ticket_id?, message?}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BackendAck {
    pub accepted: bool,
    #[serde(default, alias = "id")]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl BackendAck {
    pub fn accepted(id: impl Into<String>) -> Self {
        Self {
            accepted: true,
            ticket_id: Some(id.into()),
            message: None,
        }
    }
}

#[async_trait::async_trait]
pub trait TicketBackend: Send + Sync {
    async fn create_ticket(&self, payload: &TicketPayload) -> Result<BackendAck, BackendError>;
}

#[async_trait::async_trait]
pub trait ClientBackend: Send + Sync {
    async fn create_client(&self, payload: &ClientPayload) -> Result<BackendAck, BackendError>;
}

#[async_trait::async_trait]
pub trait FollowUpBackend: Send + Sync {
    async fn log_follow_up(&self, payload: &FollowUpPayload) -> Result<BackendAck, BackendError>;
}

/// The three backend seams the executor drives.
#[derive(Clone)]
pub struct Backends {
    pub clients: Arc<dyn ClientBackend>,
    pub tickets: Arc<dyn TicketBackend>,
    pub follow_ups: Arc<dyn FollowUpBackend>,
}

impl Backends {
    /// One implementation serving all three seams.
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: ClientBackend + TicketBackend + FollowUpBackend + 'static,
    {
        Self {
            clients: backend.clone(),
            tickets: backend.clone(),
            follow_ups: backend,
        }
    }
}
