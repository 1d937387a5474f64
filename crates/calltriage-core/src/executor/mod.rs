//! Action executor: turns a Decision into client, ticket, and follow-up side effects.
//!
//! Stages run in order and fail independently. Every attempt lands in its own slot of
//! the [`ExecutionResult`]; nothing here returns an error.

mod payload;

pub use payload::{client_payload, new_client_id, split_full_name, ticket_notes, NameParts};

use crate::collaborators::{BackendAck, Backends, FollowUpPayload, TicketPayload};
use crate::decision::{Decision, TicketEntry};
use crate::error::BackendError;
use crate::execution::{ActionOutcome, ExecutionResult, TicketOutcome};
use crate::sanitizer::FieldSanitizer;
use crate::shared::{CoreConfig, FieldLimits};
use crate::store::{now_ms, CallRecord, RecordStore, TicketRecord};
use crate::ticket_id::next_ticket_id;
use chrono::NaiveDate;
use std::sync::Arc;

/// Identifier prefixes and field budgets.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub ticket_id_prefix: String,
    pub client_id_prefix: String,
    pub limits: FieldLimits,
}

impl ExecutorSettings {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            ticket_id_prefix: config.ticket_id_prefix.clone(),
            client_id_prefix: config.client_id_prefix.clone(),
            limits: config.limits,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_config(&CoreConfig::default())
    }
}

pub struct ActionExecutor {
    backends: Backends,
    store: Arc<dyn RecordStore>,
    settings: ExecutorSettings,
    sanitizer: FieldSanitizer,
}

/// Client stage output: the id tickets are filed under, and the creation attempt if any.
struct ResolvedClient {
    id: Option<String>,
    created: Option<ActionOutcome>,
}

impl ActionExecutor {
    pub fn new(backends: Backends, store: Arc<dyn RecordStore>, settings: ExecutorSettings) -> Self {
        let sanitizer = FieldSanitizer::new(settings.limits);
        Self {
            backends,
            store,
            settings,
            sanitizer,
        }
    }

    /// Runs all stages using today's local date for identifiers.
    pub async fn execute(&self, decision: &Decision, call: &CallRecord) -> ExecutionResult {
        self.execute_on(decision, call, chrono::Local::now().date_naive()).await
    }

    pub async fn execute_on(&self, decision: &Decision, call: &CallRecord, today: NaiveDate) -> ExecutionResult {
        let mut result = ExecutionResult::new(call.call_id.clone());

        let client = self.resolve_client(decision, call, today).await;
        result.client_created = client.created;

        if decision.ticket_decision.create_tickets {
            self.create_tickets(decision, call, client.id.as_deref(), today, &mut result)
                .await;
        }

        if decision.follow_up.should_log() {
            match client.id.as_deref() {
                Some(client_id) => {
                    result.follow_up_created = Some(self.log_follow_up(decision, call, client_id).await);
                }
                None => result
                    .flags
                    .push("follow-up skipped: no client id available".to_string()),
            }
        }

        result.finalize();
        tracing::info!(
            target: "calltriage::executor",
            call_id = %call.call_id,
            success = result.success,
            tickets_ok = result.tickets_ok(),
            tickets_failed = result.tickets_failed(),
            "{}",
            result.summary
        );
        result
    }

    async fn resolve_client(&self, decision: &Decision, call: &CallRecord, today: NaiveDate) -> ResolvedClient {
        let known = decision
            .client
            .existing_client_ref
            .as_ref()
            .map(|r| r.id.clone())
            .or_else(|| call.client_id.clone())
            .filter(|id| !id.trim().is_empty());

        let wants_new = decision.client_decision.create_client
            && !(decision.client_decision.use_existing && known.is_some());
        if !wants_new {
            return ResolvedClient {
                id: known,
                created: None,
            };
        }

        let client_id = new_client_id(&self.settings.client_id_prefix, today);
        let payload = client_payload(&client_id, decision, call.caller_phone.as_deref(), &self.sanitizer);
        tracing::info!(
            target: "calltriage::executor",
            call_id = %call.call_id,
            client_id = %payload.client_id,
            has_phone = payload.phone.is_some(),
            has_email = payload.email.is_some(),
            lead_id = ?payload.lead_id,
            "creating client"
        );
        let outcome = outcome_from(&client_id, self.backends.clients.create_client(&payload).await);
        if outcome.ok {
            ResolvedClient {
                id: outcome.id.clone(),
                created: Some(outcome),
            }
        } else {
            tracing::warn!(
                target: "calltriage::executor",
                call_id = %call.call_id,
                error = ?outcome.error,
                fallback_client = ?known,
                "client creation failed"
            );
            ResolvedClient {
                id: known,
                created: Some(outcome),
            }
        }
    }

    async fn create_tickets(
        &self,
        decision: &Decision,
        call: &CallRecord,
        client_id: Option<&str>,
        today: NaiveDate,
        result: &mut ExecutionResult,
    ) {
        let mut skipped = 0usize;
        let mut last_issued: Option<String> = None;

        for entry in &decision.ticket_decision.entries {
            let Some(incident) = decision.incident(entry.incident_ref) else {
                result.tickets_created.push(TicketOutcome {
                    outcome: ActionOutcome::failure(format!("unresolvable incident reference {}", entry.incident_ref)),
                    incident_ref: entry.incident_ref.to_string(),
                    category: String::new(),
                    reason: String::new(),
                });
                continue;
            };
            let owner = entry
                .client_id_to_use
                .as_deref()
                .filter(|id| !id.trim().is_empty())
                .or(client_id);
            let Some(owner) = owner else {
                skipped += 1;
                continue;
            };

            let ticket_id = next_ticket_id(
                self.store.as_ref(),
                &self.settings.ticket_id_prefix,
                today,
                now_ms(),
                last_issued.as_deref(),
            );
            last_issued = Some(ticket_id.clone());

            let payload = self.ticket_payload(decision, call, entry, owner, &ticket_id);
            let outcome = self.submit_ticket(call, entry, &payload).await;
            result.tickets_created.push(TicketOutcome {
                outcome,
                incident_ref: entry.incident_ref.to_string(),
                category: incident.category.clone(),
                reason: incident.reason.clone(),
            });
        }

        if skipped > 0 {
            tracing::warn!(
                target: "calltriage::executor",
                call_id = %call.call_id,
                skipped = skipped,
                "no client id available; tickets skipped"
            );
            result
                .flags
                .push(format!("{} ticket(s) skipped: no client id available", skipped));
        }
    }

    fn ticket_payload(
        &self,
        decision: &Decision,
        call: &CallRecord,
        entry: &TicketEntry,
        client_id: &str,
        ticket_id: &str,
    ) -> TicketPayload {
        let incident = decision.incident(entry.incident_ref).unwrap_or(&decision.primary_incident);
        let policy = entry
            .policy_number
            .as_deref()
            .or(incident.affected_policy_number.as_deref());
        TicketPayload {
            client_id: self.sanitizer.text("client_id", client_id),
            ticket_id: ticket_id.to_string(),
            call_id: call.call_id.clone(),
            category: self.sanitizer.text("category", &incident.category),
            reason: self.sanitizer.text("reason", &incident.reason),
            line_of_business: incident
                .line_of_business
                .as_deref()
                .map(|lob| self.sanitizer.text("line_of_business", lob))
                .filter(|lob| !lob.is_empty()),
            policy_number: self.sanitizer.policy_number(policy),
            notes: self.sanitizer.notes(&ticket_notes(decision, incident)),
            recording_ref: call.recording_ref.clone(),
        }
    }

    async fn submit_ticket(&self, call: &CallRecord, entry: &TicketEntry, payload: &TicketPayload) -> ActionOutcome {
        tracing::info!(
            target: "calltriage::executor",
            call_id = %payload.call_id,
            ticket_id = %payload.ticket_id,
            client_id = %payload.client_id,
            category = %payload.category,
            reason = %payload.reason,
            policy_number = ?payload.policy_number,
            notes_len = payload.notes.chars().count(),
            "submitting ticket"
        );
        let outcome = outcome_from(&payload.ticket_id, self.backends.tickets.create_ticket(payload).await);
        if !outcome.ok {
            tracing::warn!(
                target: "calltriage::executor",
                call_id = %payload.call_id,
                ticket_id = %payload.ticket_id,
                error = ?outcome.error,
                "ticket submission failed"
            );
            return outcome;
        }

        let record = TicketRecord {
            ticket_id: payload.ticket_id.clone(),
            call_id: payload.call_id.clone(),
            client_id: payload.client_id.clone(),
            kind: entry.kind,
            category: payload.category.clone(),
            reason: payload.reason.clone(),
            line_of_business: payload.line_of_business.clone(),
            policy_number: payload.policy_number.clone(),
            caller_phone: call.caller_phone.clone(),
            backend_ticket_id: outcome.id.clone().filter(|id| id != &payload.ticket_id),
            created_at_ms: now_ms(),
        };
        if let Err(e) = self.store.insert_ticket(&record) {
            tracing::warn!(
                target: "calltriage::executor",
                ticket_id = %record.ticket_id,
                error = %e,
                "ticket created but dashboard record write failed"
            );
        }
        outcome
    }

    async fn log_follow_up(&self, decision: &Decision, call: &CallRecord, client_id: &str) -> ActionOutcome {
        let related = decision.follow_up.related_ticket_id.clone().unwrap_or_default();
        let raw_notes = [
            decision.follow_up.reason.as_deref(),
            Some(decision.primary_incident.description.as_str()),
            decision.notes_for_ticket.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ");
        let payload = FollowUpPayload {
            client_id: self.sanitizer.text("client_id", client_id),
            related_ticket_id: related.clone(),
            call_id: call.call_id.clone(),
            notes: self.sanitizer.notes(&raw_notes),
            recording_ref: call.recording_ref.clone(),
        };
        tracing::info!(
            target: "calltriage::executor",
            call_id = %payload.call_id,
            related_ticket_id = %payload.related_ticket_id,
            notes_len = payload.notes.chars().count(),
            "logging follow-up"
        );
        outcome_from(&related, self.backends.follow_ups.log_follow_up(&payload).await)
    }
}

/// Maps a backend reply onto an action slot. The backend's echoed id wins on success.
fn outcome_from(attempted_id: &str, reply: Result<BackendAck, BackendError>) -> ActionOutcome {
    match reply {
        Ok(ack) if ack.accepted => {
            ActionOutcome::success(ack.ticket_id.filter(|id| !id.is_empty()).unwrap_or_else(|| attempted_id.to_string()))
        }
        Ok(ack) => ActionOutcome::failure_with_id(
            attempted_id,
            BackendError::Rejected(ack.message.unwrap_or_else(|| "no reason given".to_string())).to_string(),
        ),
        Err(e) => ActionOutcome::failure_with_id(attempted_id, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{ClientType, ExistingClientRef, Incident};
    use crate::store::CallStore;
    use crate::taxonomy::{category, reason};
    use crate::testing::{flaky_store, FlakyStore, RecordingBackend};
    use crate::transcript::{Speaker, TranscriptSegment};
    use std::sync::atomic::Ordering;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn call() -> CallRecord {
        let mut call = CallRecord::new(
            "call-1",
            vec![TranscriptSegment::new(0, Speaker::User, "I lost my card and want to cancel")],
        );
        call.caller_phone = Some("+34600111222".to_string());
        call.recording_ref = Some("rec-1".to_string());
        call
    }

    fn decision(incidents: &[(&str, &str)], create_client: bool) -> Decision {
        let mut iter = incidents
            .iter()
            .map(|(c, r)| Incident::new(c, r, format!("{} requested", r), 0.9));
        let mut d = Decision {
            client: Default::default(),
            primary_incident: iter.next().unwrap(),
            secondary_incidents: iter.collect(),
            follow_up: Default::default(),
            client_decision: Default::default(),
            ticket_decision: Default::default(),
            priority: Default::default(),
            confidence: 0.9,
            notes_for_ticket: None,
            warnings: Vec::new(),
        };
        d.client.client_type = ClientType::New;
        d.client
            .extracted_fields
            .insert("full_name".to_string(), "Ana Ruiz Peña".to_string());
        d.client_decision.create_client = create_client;
        d.plan_ticket_per_incident();
        d
    }

    fn two_incidents(create_client: bool) -> Decision {
        decision(
            &[
                (category::DOCUMENTATION, reason::DUPLICATE_CARD),
                (category::CANCELLATION, reason::CANCELLATION_REQUEST),
            ],
            create_client,
        )
    }

    fn executor(backend: Arc<RecordingBackend>, store: Arc<FlakyStore>) -> ActionExecutor {
        ActionExecutor::new(Backends::from_shared(backend), store, ExecutorSettings::default())
    }

    fn setup(backend: RecordingBackend) -> (tempfile::TempDir, Arc<RecordingBackend>, Arc<FlakyStore>) {
        let (dir, store) = flaky_store();
        (dir, Arc::new(backend), Arc::new(store))
    }

    #[tokio::test]
    async fn second_ticket_failure_is_isolated_and_client_still_reported() {
        let (_dir, backend, store) = setup(RecordingBackend::failing_tickets(&[1]));
        let d = two_incidents(true);
        assert_eq!(d.ticket_decision.count, 2);

        let result = executor(backend.clone(), store.clone()).execute_on(&d, &call(), day()).await;

        let client = result.client_created.as_ref().unwrap();
        assert!(client.ok);
        assert_eq!(result.tickets_created.len(), 2);
        assert!(result.tickets_created[0].outcome.ok);
        assert!(!result.tickets_created[1].outcome.ok);
        assert_eq!(result.tickets_created[1].outcome.id.as_deref(), Some("TKT-20261016-002"));
        assert!(result.tickets_created[1].outcome.error.as_deref().unwrap().contains("500"));
        assert!(!result.success);

        let payloads = backend.ticket_payloads();
        assert_eq!(payloads[0].client_id, *client.id.as_ref().unwrap());
        assert_eq!(payloads[0].recording_ref.as_deref(), Some("rec-1"));
        assert!(store.inner.get_ticket("TKT-20261016-001").unwrap().is_some());
        assert!(store.inner.get_ticket("TKT-20261016-002").unwrap().is_none());
    }

    #[tokio::test]
    async fn ids_do_not_repeat_after_a_failed_submission() {
        let (_dir, backend, store) = setup(RecordingBackend::failing_tickets(&[0]));
        let result = executor(backend.clone(), store)
            .execute_on(&two_incidents(true), &call(), day())
            .await;
        let ids: Vec<String> = backend.ticket_payloads().into_iter().map(|p| p.ticket_id).collect();
        assert_eq!(ids, vec!["TKT-20261016-001", "TKT-20261016-002"]);
        assert_eq!(result.tickets_ok(), 1);
    }

    #[tokio::test]
    async fn tickets_are_skipped_without_any_client_id() {
        let (_dir, backend, store) = setup(RecordingBackend::default());
        let result = executor(backend.clone(), store)
            .execute_on(&two_incidents(false), &call(), day())
            .await;
        assert!(result.client_created.is_none());
        assert!(result.tickets_created.is_empty());
        assert_eq!(result.flags, vec!["2 ticket(s) skipped: no client id available"]);
        assert!(!result.success);
        assert!(backend.ticket_payloads().is_empty());
    }

    #[tokio::test]
    async fn rejected_client_falls_back_to_known_client() {
        let backend = RecordingBackend {
            reject_clients: true,
            ..RecordingBackend::default()
        };
        let (_dir, backend, store) = setup(backend);
        let mut c = call();
        c.client_id = Some("CLI-OLD".to_string());

        let result = executor(backend.clone(), store)
            .execute_on(&two_incidents(true), &c, day())
            .await;
        let client = result.client_created.as_ref().unwrap();
        assert!(!client.ok);
        assert!(client.error.as_deref().unwrap().contains("duplicate national id"));
        assert_eq!(result.tickets_ok(), 2);
        assert!(backend.ticket_payloads().iter().all(|p| p.client_id == "CLI-OLD"));
    }

    #[tokio::test]
    async fn existing_client_is_used_without_creation() {
        let (_dir, backend, store) = setup(RecordingBackend::default());
        let mut d = two_incidents(false);
        d.client.existing_client_ref = Some(ExistingClientRef {
            id: "88123".to_string(),
            name: "Marta Gil".to_string(),
            policy_number: None,
        });
        d.client_decision.use_existing = true;
        let result = executor(backend.clone(), store).execute_on(&d, &call(), day()).await;
        assert!(result.success);
        assert!(backend.client_payloads().is_empty());
        assert_eq!(backend.ticket_payloads()[1].client_id, "88123");
    }

    #[tokio::test]
    async fn follow_up_is_logged_instead_of_a_ticket() {
        let (_dir, backend, store) = setup(RecordingBackend::default());
        let mut d = decision(&[(category::CLAIMS_ASSISTANCE, reason::CLAIM_STATUS)], false);
        d.follow_up.is_follow_up = true;
        d.follow_up.create_new_ticket = false;
        d.follow_up.related_ticket_id = Some("TKT-20261001-003".to_string());
        d.follow_up.reason = Some("Caller is chasing the claim".to_string());
        d.plan_no_tickets();
        let mut c = call();
        c.client_id = Some("CLI-7".to_string());

        let result = executor(backend.clone(), store).execute_on(&d, &c, day()).await;
        assert!(result.success);
        assert!(result.tickets_created.is_empty());
        assert_eq!(
            result.follow_up_created.as_ref().and_then(|f| f.id.as_deref()),
            Some("TKT-20261001-003")
        );
        let logged = backend.follow_up_payloads();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].client_id, "CLI-7");
        assert!(logged[0].notes.starts_with("Caller is chasing the claim"));
    }

    #[tokio::test]
    async fn dashboard_write_failure_keeps_ticket_success() {
        let (_dir, backend, store) = setup(RecordingBackend::default());
        store.fail_ticket_writes.store(true, Ordering::SeqCst);
        let result = executor(backend, store.clone())
            .execute_on(&two_incidents(true), &call(), day())
            .await;
        assert!(result.success);
        assert_eq!(result.tickets_ok(), 2);
        assert_eq!(store.inner.counts().unwrap().1, 0);
    }

    #[tokio::test]
    async fn backend_assigned_id_is_reported_when_dashboard_write_fails() {
        let backend = RecordingBackend {
            assigned_ticket_id: Some("BACKEND-777".to_string()),
            ..RecordingBackend::default()
        };
        let (_dir, backend, store) = setup(backend);
        store.fail_ticket_writes.store(true, Ordering::SeqCst);
        let d = decision(&[(category::DOCUMENTATION, reason::DUPLICATE_CARD)], true);

        let result = executor(backend.clone(), store).execute_on(&d, &call(), day()).await;
        assert!(result.success);
        assert_eq!(result.tickets_created[0].outcome.id.as_deref(), Some("BACKEND-777"));
        assert!(result.summary.contains("BACKEND-777"), "{}", result.summary);
        assert_eq!(backend.ticket_payloads()[0].ticket_id, "TKT-20261016-001");
    }

    #[tokio::test]
    async fn dashboard_copy_keeps_both_ids() {
        let backend = RecordingBackend {
            assigned_ticket_id: Some("BACKEND-777".to_string()),
            ..RecordingBackend::default()
        };
        let (_dir, backend, store) = setup(backend);
        let d = decision(&[(category::DOCUMENTATION, reason::DUPLICATE_CARD)], true);

        executor(backend, store.clone()).execute_on(&d, &call(), day()).await;
        let stored = store.inner.get_ticket("TKT-20261016-001").unwrap().unwrap();
        assert_eq!(stored.backend_ticket_id.as_deref(), Some("BACKEND-777"));
    }

    #[tokio::test]
    async fn payloads_are_sanitized_before_submission() {
        let (_dir, backend, _store) = setup(RecordingBackend::default());
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(CallStore::open_path(dir.path()).unwrap());
        let mut d = decision(&[(category::DOCUMENTATION, reason::DUPLICATE_CARD)], true);
        d.primary_incident.description = "Lost card 🪪\nneeds a copy".to_string();
        d.primary_incident.affected_policy_number = Some("POL-1, POL-2".to_string());
        d.plan_ticket_per_incident();
        let exec = ActionExecutor::new(Backends::from_shared(backend.clone()), store, ExecutorSettings::default());

        exec.execute_on(&d, &call(), day()).await;
        let payload = &backend.ticket_payloads()[0];
        assert_eq!(payload.policy_number.as_deref(), Some("POL-1|POL-2"));
        assert_eq!(payload.notes, "Lost card needs a copy Priority: medium.");
    }
}
