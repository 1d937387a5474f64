//! In-crate test doubles: a recording backend and a store that can be told to fail.

use crate::collaborators::{
    BackendAck, ClientBackend, ClientPayload, FollowUpBackend, FollowUpPayload, TicketBackend, TicketPayload,
};
use crate::error::{BackendError, StoreError};
use crate::store::{CallAnalysis, CallRecord, CallStatus, CallStore, RecordStore, TicketRecord};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Records every payload and answers according to its failure switches.
#[derive(Default)]
pub struct RecordingBackend {
    pub clients: Mutex<Vec<ClientPayload>>,
    pub tickets: Mutex<Vec<TicketPayload>>,
    pub follow_ups: Mutex<Vec<FollowUpPayload>>,
    /// Zero-based submission indexes that fail with a 500.
    pub failing_tickets: HashSet<usize>,
    pub reject_clients: bool,
    pub fail_follow_ups: bool,
    /// Ticket id the backend assigns instead of echoing ours.
    pub assigned_ticket_id: Option<String>,
}

impl RecordingBackend {
    pub fn failing_tickets(indexes: &[usize]) -> Self {
        Self {
            failing_tickets: indexes.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn ticket_payloads(&self) -> Vec<TicketPayload> {
        self.tickets.lock().unwrap().clone()
    }

    pub fn client_payloads(&self) -> Vec<ClientPayload> {
        self.clients.lock().unwrap().clone()
    }

    pub fn follow_up_payloads(&self) -> Vec<FollowUpPayload> {
        self.follow_ups.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ClientBackend for RecordingBackend {
    async fn create_client(&self, payload: &ClientPayload) -> Result<BackendAck, BackendError> {
        self.clients.lock().unwrap().push(payload.clone());
        if self.reject_clients {
            return Err(BackendError::Rejected("duplicate national id".to_string()));
        }
        Ok(BackendAck::accepted(payload.client_id.clone()))
    }
}

#[async_trait::async_trait]
impl TicketBackend for RecordingBackend {
    async fn create_ticket(&self, payload: &TicketPayload) -> Result<BackendAck, BackendError> {
        let index = {
            let mut tickets = self.tickets.lock().unwrap();
            tickets.push(payload.clone());
            tickets.len() - 1
        };
        if self.failing_tickets.contains(&index) {
            return Err(BackendError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        let id = self
            .assigned_ticket_id
            .clone()
            .unwrap_or_else(|| payload.ticket_id.clone());
        Ok(BackendAck::accepted(id))
    }
}

#[async_trait::async_trait]
impl FollowUpBackend for RecordingBackend {
    async fn log_follow_up(&self, payload: &FollowUpPayload) -> Result<BackendAck, BackendError> {
        self.follow_ups.lock().unwrap().push(payload.clone());
        if self.fail_follow_ups {
            return Err(BackendError::Timeout);
        }
        Ok(BackendAck::accepted(payload.related_ticket_id.clone()))
    }
}

/// Sled store whose individual operations can be switched to fail.
pub struct FlakyStore {
    pub inner: CallStore,
    pub fail_ticket_writes: AtomicBool,
    pub fail_analysis_writes: AtomicBool,
    pub fail_sequence_lookup: AtomicBool,
    pub fail_history: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: CallStore) -> Self {
        Self {
            inner,
            fail_ticket_writes: AtomicBool::new(false),
            fail_analysis_writes: AtomicBool::new(false),
            fail_sequence_lookup: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::NotFound(format!("{} unavailable", what)))
        } else {
            Ok(())
        }
    }
}

impl RecordStore for FlakyStore {
    fn get_call(&self, call_id: &str) -> Result<Option<CallRecord>, StoreError> {
        self.inner.get_call(call_id)
    }

    fn put_call(&self, record: &CallRecord) -> Result<(), StoreError> {
        self.inner.put_call(record)
    }

    fn find_call_by_conversation(&self, conversation_id: &str) -> Result<Option<CallRecord>, StoreError> {
        self.inner.find_call_by_conversation(conversation_id)
    }

    fn update_call_status(&self, call_id: &str, status: CallStatus) -> Result<(), StoreError> {
        self.inner.update_call_status(call_id, status)
    }

    fn update_call_analysis(
        &self,
        call_id: &str,
        status: CallStatus,
        analysis: &CallAnalysis,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_analysis_writes, "analysis tree")?;
        self.inner.update_call_analysis(call_id, status, analysis)
    }

    fn insert_ticket(&self, record: &TicketRecord) -> Result<(), StoreError> {
        Self::check(&self.fail_ticket_writes, "tickets tree")?;
        self.inner.insert_ticket(record)
    }

    fn get_ticket(&self, ticket_id: &str) -> Result<Option<TicketRecord>, StoreError> {
        self.inner.get_ticket(ticket_id)
    }

    fn latest_ticket_id_with_prefix(&self, prefix: &str) -> Result<Option<String>, StoreError> {
        Self::check(&self.fail_sequence_lookup, "ticket sequence")?;
        self.inner.latest_ticket_id_with_prefix(prefix)
    }

    fn tickets_for_client(&self, client_id: &str) -> Result<Vec<TicketRecord>, StoreError> {
        Self::check(&self.fail_history, "ticket history")?;
        self.inner.tickets_for_client(client_id)
    }

    fn tickets_for_phone(&self, phone: &str) -> Result<Vec<TicketRecord>, StoreError> {
        Self::check(&self.fail_history, "ticket history")?;
        self.inner.tickets_for_phone(phone)
    }
}

/// Fresh sled store on a temp dir; keep the dir alive for the test's duration.
pub fn temp_store() -> (TempDir, CallStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = CallStore::open_path(dir.path()).unwrap();
    (dir, store)
}

pub fn flaky_store() -> (TempDir, FlakyStore) {
    let (dir, store) = temp_store();
    (dir, FlakyStore::new(store))
}
