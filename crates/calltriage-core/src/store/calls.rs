//! Sled-backed [`RecordStore`].

use super::records::{now_ms, CallAnalysis, CallRecord, CallStatus, TicketRecord};
use super::RecordStore;
use crate::error::StoreError;
use sled::Db;
use std::path::Path;

const CALLS_TREE: &str = "calls";
const TICKETS_TREE: &str = "tickets";
const CONVERSATION_INDEX_TREE: &str = "conversation_index";

/// Store with one sled tree per record kind.
pub struct CallStore {
    db: Db,
}

impl CallStore {
    /// Opens or creates the store at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Number of entries per tree, for `/v1/status` and `--verify`.
    pub fn counts(&self) -> Result<(usize, usize), StoreError> {
        Ok((
            self.db.open_tree(CALLS_TREE)?.len(),
            self.db.open_tree(TICKETS_TREE)?.len(),
        ))
    }

    /// Flushes dirty pages to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn scan_tickets(&self, keep: impl Fn(&TicketRecord) -> bool) -> Result<Vec<TicketRecord>, StoreError> {
        let tree = self.db.open_tree(TICKETS_TREE)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, v) = item?;
            if let Some(record) = TicketRecord::from_bytes(&v) {
                if keep(&record) {
                    out.push(record);
                }
            }
        }
        out.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.ticket_id.cmp(&a.ticket_id))
        });
        Ok(out)
    }

    fn modify_call(&self, call_id: &str, apply: impl FnOnce(&mut CallRecord)) -> Result<(), StoreError> {
        let mut record = self
            .get_call(call_id)?
            .ok_or_else(|| StoreError::NotFound(format!("call {}", call_id)))?;
        apply(&mut record);
        record.updated_at_ms = now_ms();
        let tree = self.db.open_tree(CALLS_TREE)?;
        tree.insert(call_id.as_bytes(), record.to_bytes()?)?;
        Ok(())
    }
}

impl RecordStore for CallStore {
    fn get_call(&self, call_id: &str) -> Result<Option<CallRecord>, StoreError> {
        let tree = self.db.open_tree(CALLS_TREE)?;
        match tree.get(call_id.as_bytes())? {
            Some(bytes) => Ok(Some(CallRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_call(&self, record: &CallRecord) -> Result<(), StoreError> {
        let tree = self.db.open_tree(CALLS_TREE)?;
        let bytes = record.to_bytes()?;
        let prev = tree.insert(record.call_id.as_bytes(), bytes.as_slice())?;
        if let Some(conversation_id) = record.conversation_id.as_deref().filter(|c| !c.is_empty()) {
            let index = self.db.open_tree(CONVERSATION_INDEX_TREE)?;
            index.insert(conversation_id.as_bytes(), record.call_id.as_bytes())?;
        }
        tracing::info!(
            target: "calltriage::store",
            call_id = %record.call_id,
            bytes = bytes.len(),
            action = if prev.is_some() { "UPDATE" } else { "INSERT" },
            "call record {} ({} segments)",
            if prev.is_some() { "updated" } else { "inserted" },
            record.transcript.len()
        );
        Ok(())
    }

    fn find_call_by_conversation(&self, conversation_id: &str) -> Result<Option<CallRecord>, StoreError> {
        let index = self.db.open_tree(CONVERSATION_INDEX_TREE)?;
        match index.get(conversation_id.as_bytes())? {
            Some(call_id) => self.get_call(&String::from_utf8_lossy(&call_id)),
            None => Ok(None),
        }
    }

    fn update_call_status(&self, call_id: &str, status: CallStatus) -> Result<(), StoreError> {
        self.modify_call(call_id, |record| record.status = status)
    }

    fn update_call_analysis(
        &self,
        call_id: &str,
        status: CallStatus,
        analysis: &CallAnalysis,
    ) -> Result<(), StoreError> {
        self.modify_call(call_id, |record| {
            record.status = status;
            record.analysis = Some(analysis.clone());
        })?;
        tracing::info!(
            target: "calltriage::store",
            call_id = call_id,
            status = ?status,
            "call analysis stored"
        );
        Ok(())
    }

    fn insert_ticket(&self, record: &TicketRecord) -> Result<(), StoreError> {
        let tree = self.db.open_tree(TICKETS_TREE)?;
        let prev = tree.insert(record.ticket_id.as_bytes(), record.to_bytes()?)?;
        if prev.is_some() {
            tracing::warn!(
                target: "calltriage::store",
                ticket_id = %record.ticket_id,
                "ticket record overwritten; identifier collision"
            );
        }
        Ok(())
    }

    fn get_ticket(&self, ticket_id: &str) -> Result<Option<TicketRecord>, StoreError> {
        let tree = self.db.open_tree(TICKETS_TREE)?;
        Ok(tree
            .get(ticket_id.as_bytes())?
            .and_then(|bytes| TicketRecord::from_bytes(&bytes)))
    }

    fn latest_ticket_id_with_prefix(&self, prefix: &str) -> Result<Option<String>, StoreError> {
        let tree = self.db.open_tree(TICKETS_TREE)?;
        let mut latest: Option<(i64, String)> = None;
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (k, v) = item?;
            let id = String::from_utf8_lossy(&k).to_string();
            let created = TicketRecord::from_bytes(&v).map(|r| r.created_at_ms).unwrap_or(0);
            let candidate = (created, id);
            if latest.as_ref().map_or(true, |current| candidate > *current) {
                latest = Some(candidate);
            }
        }
        Ok(latest.map(|(_, id)| id))
    }

    fn tickets_for_client(&self, client_id: &str) -> Result<Vec<TicketRecord>, StoreError> {
        self.scan_tickets(|t| t.client_id == client_id)
    }

    fn tickets_for_phone(&self, phone: &str) -> Result<Vec<TicketRecord>, StoreError> {
        self.scan_tickets(|t| t.caller_phone.as_deref() == Some(phone))
    }
}
