//! One pipeline run per call: load, classify, execute, persist.

use crate::classifier::{ClassificationContext, Classifier};
use crate::collaborators::{Backends, CompletionService};
use crate::execution::ExecutionResult;
use crate::executor::{ActionExecutor, ExecutorSettings};
use crate::shared::CoreConfig;
use crate::store::{now_ms, CallAnalysis, CallRecord, CallStatus, RecordStore, TicketRecord};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DAY_MS: i64 = 86_400_000;

/// Per-run switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// `false` skips the completion service and classifies with the rule table.
    #[serde(default = "default_use_llm")]
    pub use_llm: bool,
}

fn default_use_llm() -> bool {
    true
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self { use_llm: true }
    }
}

/// Removes the call id from the in-flight set when the run ends.
struct InFlightGuard<'a> {
    set: &'a DashSet<String>,
    call_id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a DashSet<String>, call_id: &str) -> Option<Self> {
        set.insert(call_id.to_string()).then(|| Self {
            set,
            call_id: call_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.call_id);
    }
}

pub struct CallPipeline {
    store: Arc<dyn RecordStore>,
    classifier: Classifier,
    executor: ActionExecutor,
    in_flight: DashSet<String>,
    follow_up_window_days: i64,
}

impl CallPipeline {
    pub fn new(
        config: &CoreConfig,
        store: Arc<dyn RecordStore>,
        completion: Option<Arc<dyn CompletionService>>,
        backends: Backends,
    ) -> Self {
        let classifier = match completion {
            Some(c) => Classifier::new(c),
            None => Classifier::heuristic_only(),
        }
        .with_folded_reason(config.folded_incident_reason.clone());
        let executor = ActionExecutor::new(backends, store.clone(), ExecutorSettings::from_config(config));
        Self {
            store,
            classifier,
            executor,
            in_flight: DashSet::new(),
            follow_up_window_days: config.follow_up_window_days,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Processes one stored call. Always returns a result and always leaves the call in a
    /// terminal status, except when another run of the same call is in progress.
    pub async fn process_call(&self, call_id: &str, opts: ProcessOptions) -> ExecutionResult {
        let call = match self.store.get_call(call_id) {
            Ok(Some(call)) => call,
            Ok(None) => {
                tracing::warn!(target: "calltriage::pipeline", call_id = %call_id, "call record not found");
                return ExecutionResult::fatal(call_id, format!("call record {} not found", call_id));
            }
            Err(e) => {
                tracing::error!(target: "calltriage::pipeline", call_id = %call_id, error = %e, "call record unreadable");
                return ExecutionResult::fatal(call_id, format!("call record could not be loaded: {}", e));
            }
        };

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, call_id) else {
            tracing::warn!(target: "calltriage::pipeline", call_id = %call_id, "call already being processed");
            return ExecutionResult::fatal(call_id, "call is already being processed");
        };

        if let Err(e) = self.store.update_call_status(call_id, CallStatus::Processing) {
            tracing::error!(target: "calltriage::pipeline", call_id = %call_id, error = %e, "could not mark call as processing");
            self.mark_failed(call_id);
            return ExecutionResult::fatal(call_id, format!("call could not be marked as processing: {}", e));
        }

        tracing::info!(
            target: "calltriage::pipeline",
            call_id = %call_id,
            segments = call.transcript.len(),
            use_llm = opts.use_llm,
            "processing call"
        );
        let ctx = self.context_for(&call);
        let classification = self.classifier.classify(&call.transcript, &ctx, opts.use_llm).await;
        let execution = self.executor.execute(&classification.decision, &call).await;

        let status = if execution.success {
            CallStatus::Processed
        } else {
            CallStatus::ProcessedWithErrors
        };
        let analysis = CallAnalysis {
            decision: Some(classification.decision),
            execution: execution.clone(),
            classifier_path: Some(classification.path),
            processed_at_ms: now_ms(),
        };
        if let Err(e) = self.store.update_call_analysis(call_id, status, &analysis) {
            tracing::warn!(
                target: "calltriage::pipeline",
                call_id = %call_id,
                error = %e,
                "analysis write failed; tickets already submitted stay authoritative"
            );
            if let Err(e) = self.store.update_call_status(call_id, status) {
                tracing::warn!(target: "calltriage::pipeline", call_id = %call_id, error = %e, "status write failed");
            }
        }
        execution
    }

    fn mark_failed(&self, call_id: &str) {
        if let Err(e) = self.store.update_call_status(call_id, CallStatus::Failed) {
            tracing::warn!(target: "calltriage::pipeline", call_id = %call_id, error = %e, "could not mark call as failed");
        }
    }

    /// Caller identity plus recent tickets. History errors only cost follow-up detection.
    fn context_for(&self, call: &CallRecord) -> ClassificationContext {
        let history = match (call.client_id.as_deref(), call.caller_phone.as_deref()) {
            (Some(client_id), _) => self.store.tickets_for_client(client_id),
            (None, Some(phone)) => self.store.tickets_for_phone(phone),
            (None, None) => Ok(Vec::new()),
        };
        let window_ms = self.follow_up_window_days.max(0).saturating_mul(DAY_MS);
        let cutoff = now_ms().saturating_sub(window_ms);
        let prior_tickets: Vec<TicketRecord> = match history {
            Ok(tickets) => tickets
                .into_iter()
                .filter(|t| t.call_id != call.call_id && t.created_at_ms >= cutoff)
                .collect(),
            Err(e) => {
                tracing::warn!(
                    target: "calltriage::pipeline",
                    call_id = %call.call_id,
                    error = %e,
                    "ticket history unavailable; follow-up detection disabled"
                );
                Vec::new()
            }
        };
        ClassificationContext {
            client_id: call.client_id.clone(),
            caller_phone: call.caller_phone.clone(),
            prior_tickets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{ClassificationPath, TicketKind};
    use crate::taxonomy::{category, reason};
    use crate::testing::{flaky_store, FlakyStore, RecordingBackend};
    use crate::transcript::{Speaker, TranscriptSegment};
    use std::sync::atomic::Ordering;

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<FlakyStore>,
        backend: Arc<RecordingBackend>,
        pipeline: CallPipeline,
    }

    fn harness(backend: RecordingBackend) -> Harness {
        harness_with(&CoreConfig::default(), backend)
    }

    fn harness_with(config: &CoreConfig, backend: RecordingBackend) -> Harness {
        let (dir, store) = flaky_store();
        let store = Arc::new(store);
        let backend = Arc::new(backend);
        let pipeline = CallPipeline::new(
            config,
            store.clone(),
            None,
            Backends::from_shared(backend.clone()),
        );
        Harness {
            _dir: dir,
            store,
            backend,
            pipeline,
        }
    }

    fn store_call(h: &Harness, call_id: &str, user_says: &str, client_id: Option<&str>) {
        let mut call = CallRecord::new(
            call_id,
            vec![
                TranscriptSegment::new(0, Speaker::Agent, "Hello, how can I help you today?"),
                TranscriptSegment::new(1, Speaker::User, user_says),
                TranscriptSegment::new(2, Speaker::Agent, "Understood, we will post it to the address on file."),
            ],
        );
        call.client_id = client_id.map(str::to_string);
        call.caller_phone = Some("+34600111222".to_string());
        h.store.put_call(&call).unwrap();
    }

    fn prior_ticket(id: &str, age_days: i64) -> TicketRecord {
        TicketRecord {
            ticket_id: id.to_string(),
            call_id: "earlier-call".to_string(),
            client_id: "CLI-7".to_string(),
            kind: TicketKind::Primary,
            category: category::CLAIMS_ASSISTANCE.to_string(),
            reason: reason::CLAIM_REPORT.to_string(),
            line_of_business: None,
            policy_number: None,
            caller_phone: None,
            backend_ticket_id: None,
            created_at_ms: now_ms() - age_days * DAY_MS,
        }
    }

    const NO_MODEL: ProcessOptions = ProcessOptions { use_llm: false };

    #[tokio::test]
    async fn missing_call_is_fatal() {
        let h = harness(RecordingBackend::default());
        let result = h.pipeline.process_call("ghost", ProcessOptions::default()).await;
        assert!(!result.success);
        assert!(result.summary.contains("not found"));
        assert!(h.backend.ticket_payloads().is_empty());
    }

    #[tokio::test]
    async fn processed_call_keeps_its_analysis() {
        let h = harness(RecordingBackend::default());
        store_call(&h, "call-1", "I lost my health card, can I get a duplicate?", Some("CLI-7"));

        let result = h.pipeline.process_call("call-1", NO_MODEL).await;
        assert!(result.success, "{}", result.summary);
        assert_eq!(result.tickets_ok(), 1);

        let stored = h.store.get_call("call-1").unwrap().unwrap();
        assert_eq!(stored.status, CallStatus::Processed);
        let analysis = stored.analysis.unwrap();
        assert_eq!(analysis.classifier_path, Some(ClassificationPath::Heuristic));
        assert_eq!(analysis.execution, result);
        let decision = analysis.decision.unwrap();
        assert_eq!(decision.primary_incident.category, category::DOCUMENTATION);
        assert_eq!(decision.primary_incident.reason, reason::DUPLICATE_CARD);
        assert_eq!(decision.ticket_decision.count, 1);

        let ticket_id = result.tickets_created[0].outcome.id.clone().unwrap();
        let ticket = h.store.get_ticket(&ticket_id).unwrap().unwrap();
        assert_eq!(ticket.client_id, "CLI-7");
        assert_eq!(ticket.call_id, "call-1");
    }

    #[tokio::test]
    async fn missing_completion_service_falls_back() {
        let h = harness(RecordingBackend::default());
        store_call(&h, "call-2", "I lost my card", Some("CLI-7"));
        h.pipeline.process_call("call-2", ProcessOptions::default()).await;
        let decision = h.store.get_call("call-2").unwrap().unwrap().analysis.unwrap().decision.unwrap();
        assert!(decision.confidence <= 0.5);
        assert!(decision.warnings[0].contains("no completion service"));
    }

    #[tokio::test]
    async fn backend_failure_ends_processed_with_errors() {
        let h = harness(RecordingBackend::failing_tickets(&[0]));
        store_call(&h, "call-3", "I lost my card", Some("CLI-7"));
        let result = h.pipeline.process_call("call-3", NO_MODEL).await;
        assert!(!result.success);
        let stored = h.store.get_call("call-3").unwrap().unwrap();
        assert_eq!(stored.status, CallStatus::ProcessedWithErrors);
    }

    #[tokio::test]
    async fn analysis_write_failure_still_reaches_terminal_status() {
        let h = harness(RecordingBackend::default());
        h.store.fail_analysis_writes.store(true, Ordering::SeqCst);
        store_call(&h, "call-4", "I lost my card", Some("CLI-7"));
        let result = h.pipeline.process_call("call-4", NO_MODEL).await;
        assert!(result.success);
        let stored = h.store.get_call("call-4").unwrap().unwrap();
        assert_eq!(stored.status, CallStatus::Processed);
        assert!(stored.analysis.is_none());
    }

    #[tokio::test]
    async fn concurrent_run_of_the_same_call_is_rejected() {
        let h = harness(RecordingBackend::default());
        store_call(&h, "call-5", "I lost my card", Some("CLI-7"));
        h.pipeline.in_flight.insert("call-5".to_string());
        let result = h.pipeline.process_call("call-5", NO_MODEL).await;
        assert!(!result.success);
        assert!(result.summary.contains("already being processed"));
        assert!(h.backend.ticket_payloads().is_empty());

        h.pipeline.in_flight.remove("call-5");
        assert!(h.pipeline.process_call("call-5", NO_MODEL).await.success);
        assert!(h.pipeline.in_flight.is_empty());
    }

    #[tokio::test]
    async fn recent_ticket_turns_chasing_call_into_follow_up() {
        let h = harness(RecordingBackend::default());
        h.store.inner.insert_ticket(&prior_ticket("TKT-20261010-004", 2)).unwrap();
        store_call(&h, "call-6", "I already called about my accident and I'm still waiting", Some("CLI-7"));

        let result = h.pipeline.process_call("call-6", NO_MODEL).await;
        assert!(result.success, "{}", result.summary);
        assert!(result.tickets_created.is_empty());
        assert_eq!(
            result.follow_up_created.and_then(|f| f.id),
            Some("TKT-20261010-004".to_string())
        );
        assert_eq!(h.backend.follow_up_payloads().len(), 1);
    }

    #[tokio::test]
    async fn stale_tickets_are_outside_the_follow_up_window() {
        let h = harness(RecordingBackend::default());
        h.store.inner.insert_ticket(&prior_ticket("TKT-20260801-004", 60)).unwrap();
        store_call(&h, "call-7", "I already called about my accident and I'm still waiting", Some("CLI-7"));

        let result = h.pipeline.process_call("call-7", NO_MODEL).await;
        assert!(result.follow_up_created.is_none());
        assert_eq!(result.tickets_ok(), 1);
    }

    #[tokio::test]
    async fn huge_follow_up_window_saturates() {
        let config = CoreConfig {
            follow_up_window_days: i64::MAX,
            ..CoreConfig::default()
        };
        let h = harness_with(&config, RecordingBackend::default());
        h.store.inner.insert_ticket(&prior_ticket("TKT-20200101-001", 2000)).unwrap();
        store_call(&h, "call-9", "I already called about my accident and I'm still waiting", Some("CLI-7"));

        let result = h.pipeline.process_call("call-9", NO_MODEL).await;
        assert_eq!(
            result.follow_up_created.and_then(|f| f.id),
            Some("TKT-20200101-001".to_string())
        );
    }

    #[tokio::test]
    async fn history_failure_does_not_block_processing() {
        let h = harness(RecordingBackend::default());
        h.store.fail_history.store(true, Ordering::SeqCst);
        store_call(&h, "call-8", "I already called about my accident and I'm still waiting", Some("CLI-7"));
        let result = h.pipeline.process_call("call-8", NO_MODEL).await;
        assert!(result.success);
        assert_eq!(result.tickets_ok(), 1);
    }
}
