//! Record store: call records (transcript, analysis, status) and the denormalized
//! ticket records used for dashboards, identifier sequencing, and follow-up lookups.
//!
//! | Tree                 | Key             | Value                 |
//! |----------------------|-----------------|-----------------------|
//! | `calls`              | call id         | JSON [`CallRecord`]   |
//! | `tickets`            | ticket id       | JSON [`TicketRecord`] |
//! | `conversation_index` | conversation id | call id               |

mod calls;
mod records;

pub use calls::CallStore;
pub use records::{now_ms, CallAnalysis, CallRecord, CallStatus, TicketRecord};

use crate::error::StoreError;

/// Persistence operations the classifier, executor, and pipeline rely on.
pub trait RecordStore: Send + Sync {
    fn get_call(&self, call_id: &str) -> Result<Option<CallRecord>, StoreError>;

    /// Inserts or replaces a call record and indexes its conversation id.
    fn put_call(&self, record: &CallRecord) -> Result<(), StoreError>;

    fn find_call_by_conversation(&self, conversation_id: &str) -> Result<Option<CallRecord>, StoreError>;

    fn update_call_status(&self, call_id: &str, status: CallStatus) -> Result<(), StoreError>;

    /// Writes the denormalized analysis summary and terminal status.
    fn update_call_analysis(
        &self,
        call_id: &str,
        status: CallStatus,
        analysis: &CallAnalysis,
    ) -> Result<(), StoreError>;

    fn insert_ticket(&self, record: &TicketRecord) -> Result<(), StoreError>;

    fn get_ticket(&self, ticket_id: &str) -> Result<Option<TicketRecord>, StoreError>;

    /// Id of the most recently created ticket whose id starts with `prefix`.
    fn latest_ticket_id_with_prefix(&self, prefix: &str) -> Result<Option<String>, StoreError>;

    /// Tickets for a client, newest first.
    fn tickets_for_client(&self, client_id: &str) -> Result<Vec<TicketRecord>, StoreError>;

    /// Tickets opened from calls made by `phone`, newest first.
    fn tickets_for_phone(&self, phone: &str) -> Result<Vec<TicketRecord>, StoreError>;
}
