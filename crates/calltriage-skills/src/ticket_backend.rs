//! Ticket, client, and follow-up backend clients.

use calltriage_core::{
    BackendAck, BackendError, ClientBackend, ClientPayload, CoreConfig, FollowUpBackend, FollowUpPayload,
    TicketBackend, TicketPayload,
};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const ERROR_BODY_PREVIEW: usize = 500;

/// JSON-over-HTTP backend: `POST {base}/tickets`, `{base}/clients`, `{base}/follow-ups`.
/// Timeouts and non-2xx responses are failures; nothing is retried.
pub struct HttpTicketBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTicketBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `None` when no backend URL is configured.
    pub fn from_config(config: &CoreConfig) -> Option<Self> {
        let url = config.ticket_backend_url()?;
        Some(Self::new(url, Duration::from_secs(config.ticket_backend_timeout_secs.max(1))))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<BackendAck, BackendError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        if !status.is_success() {
            tracing::warn!(target: "calltriage::backend", url = %url, status = status.as_u16(), "backend returned error status");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_PREVIEW).collect(),
            });
        }

        let ack: BackendAck =
            serde_json::from_str(&text).map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        if !ack.accepted {
            return Err(BackendError::Rejected(
                ack.message.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        tracing::debug!(target: "calltriage::backend", url = %url, id = ?ack.ticket_id, "backend accepted request");
        Ok(ack)
    }
}

#[async_trait::async_trait]
impl TicketBackend for HttpTicketBackend {
    async fn create_ticket(&self, payload: &TicketPayload) -> Result<BackendAck, BackendError> {
        self.post("tickets", payload).await
    }
}

#[async_trait::async_trait]
impl ClientBackend for HttpTicketBackend {
    async fn create_client(&self, payload: &ClientPayload) -> Result<BackendAck, BackendError> {
        self.post("clients", payload).await
    }
}

#[async_trait::async_trait]
impl FollowUpBackend for HttpTicketBackend {
    async fn log_follow_up(&self, payload: &FollowUpPayload) -> Result<BackendAck, BackendError> {
        self.post("follow-ups", payload).await
    }
}

/// Accepts everything and echoes the submitted ids.
#[derive(Debug, Default)]
pub struct MockTicketBackend {
    submissions: AtomicUsize,
}

impl MockTicketBackend {
    /// Requests accepted since startup.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::Relaxed)
    }

    fn accept(&self, kind: &str, id: &str) -> Result<BackendAck, BackendError> {
        self.submissions.fetch_add(1, Ordering::Relaxed);
        tracing::info!(target: "calltriage::backend", kind = kind, id = %id, "mock backend accepted request");
        Ok(BackendAck::accepted(id))
    }
}

#[async_trait::async_trait]
impl TicketBackend for MockTicketBackend {
    async fn create_ticket(&self, payload: &TicketPayload) -> Result<BackendAck, BackendError> {
        self.accept("ticket", &payload.ticket_id)
    }
}

#[async_trait::async_trait]
impl ClientBackend for MockTicketBackend {
    async fn create_client(&self, payload: &ClientPayload) -> Result<BackendAck, BackendError> {
        self.accept("client", &payload.client_id)
    }
}

#[async_trait::async_trait]
impl FollowUpBackend for MockTicketBackend {
    async fn log_follow_up(&self, payload: &FollowUpPayload) -> Result<BackendAck, BackendError> {
        self.accept("follow_up", &payload.related_ticket_id)
    }
}
