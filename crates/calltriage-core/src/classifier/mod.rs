//! Decision classifier.
//!
//! Primary path: format the transcript, prompt the completion service once, extract
//! and validate the JSON into a [`Decision`]. Any failure on that path, or an explicit
//! no-model request, routes to the rule-based fallback. Classification never fails.

mod fallback;
mod lookup;
mod parse;
mod prompt;
mod rules;

pub use rules::{Rule, Signals, Tier, RULES};

use lookup::LookupFindings;
use parse::extract_json;
use prompt::build_prompt;

use crate::collaborators::CompletionService;
use crate::decision::{ClassificationPath, ClientType, DataSource, Decision, Incident, NormalizeOptions};
use crate::error::ClassificationError;
use crate::store::TicketRecord;
use crate::transcript::{format_transcript, TranscriptSegment};
use std::sync::Arc;

/// Confidence reported by every heuristic Decision.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// What the pipeline knows about the caller before classifying.
#[derive(Debug, Clone, Default)]
pub struct ClassificationContext {
    pub client_id: Option<String>,
    pub caller_phone: Option<String>,
    /// Recent tickets for this caller, newest first.
    pub prior_tickets: Vec<TicketRecord>,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub decision: Decision,
    pub path: ClassificationPath,
}

pub struct Classifier {
    completion: Option<Arc<dyn CompletionService>>,
    folded_reason: String,
}

impl Classifier {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion: Some(completion),
            folded_reason: NormalizeOptions::default().folded_reason.to_string(),
        }
    }

    /// Classifier that always uses the rule table.
    pub fn heuristic_only() -> Self {
        Self {
            completion: None,
            folded_reason: NormalizeOptions::default().folded_reason.to_string(),
        }
    }

    pub fn with_folded_reason(mut self, folded_reason: impl Into<String>) -> Self {
        self.folded_reason = folded_reason.into();
        self
    }

    pub async fn classify(
        &self,
        transcript: &[TranscriptSegment],
        ctx: &ClassificationContext,
        use_llm: bool,
    ) -> Classification {
        let signals = Signals::new(transcript);
        let findings = lookup::scan_tool_results(transcript);

        let warning = match (&self.completion, use_llm) {
            (Some(completion), true) => {
                match self.classify_with_model(completion.as_ref(), transcript, ctx, &signals, &findings).await {
                    Ok(decision) => {
                        tracing::info!(
                            target: "calltriage::classifier",
                            service = completion.name(),
                            category = %decision.primary_incident.category,
                            reason = %decision.primary_incident.reason,
                            secondary = decision.secondary_incidents.len(),
                            tickets = decision.ticket_decision.count,
                            "model classification accepted"
                        );
                        return Classification {
                            decision,
                            path: ClassificationPath::Model,
                        };
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "calltriage::classifier",
                            service = completion.name(),
                            error = %e,
                            "model classification failed; using heuristic fallback"
                        );
                        format!("Automated classification failed ({}); heuristic fallback used", e)
                    }
                }
            }
            (None, true) => "Automated classification failed (no completion service configured); heuristic fallback used"
                .to_string(),
            (_, false) => "Automated classification skipped on request; heuristic fallback used".to_string(),
        };

        let decision =
            fallback::heuristic_decision(transcript, &signals, &findings, ctx, &self.folded_reason, warning);
        tracing::info!(
            target: "calltriage::classifier",
            category = %decision.primary_incident.category,
            reason = %decision.primary_incident.reason,
            secondary = decision.secondary_incidents.len(),
            tickets = decision.ticket_decision.count,
            follow_up = decision.follow_up.should_log(),
            "heuristic classification produced"
        );
        Classification {
            decision,
            path: ClassificationPath::Heuristic,
        }
    }

    async fn classify_with_model(
        &self,
        completion: &dyn CompletionService,
        transcript: &[TranscriptSegment],
        ctx: &ClassificationContext,
        signals: &Signals,
        findings: &LookupFindings,
    ) -> Result<Decision, ClassificationError> {
        let prompt = build_prompt(&format_transcript(transcript), ctx, &self.folded_reason);
        let raw = completion.complete(&prompt).await?;
        let value = extract_json(&raw)?;
        let mut decision = Decision::from_model_value(
            &value,
            NormalizeOptions {
                folded_reason: &self.folded_reason,
            },
        )?;
        apply_lookups(&mut decision, findings, ctx);
        enforce_overrides(&mut decision, signals);
        if !decision.is_consistent() {
            return Err(ClassificationError::InvalidStructure(
                "ticket plan does not match incidents".to_string(),
            ));
        }
        Ok(decision)
    }
}

/// Fills client references the model missed from backend lookups and the call record.
fn apply_lookups(decision: &mut Decision, findings: &LookupFindings, ctx: &ClassificationContext) {
    if decision.client.existing_client_ref.is_none() {
        let from_lookup = findings.client.clone();
        let from_record = ctx.client_id.clone().map(|id| crate::decision::ExistingClientRef {
            id,
            name: String::new(),
            policy_number: None,
        });
        let source = if from_lookup.is_some() { "backend lookup" } else { "call record" };
        if let Some(client) = from_lookup.or(from_record) {
            decision.warnings.push(format!("existing client {} taken from {}", client.id, source));
            if findings.client.is_some() {
                decision.client_decision.data_source = if decision.client.extracted_fields.is_empty() {
                    DataSource::BackendLookup
                } else {
                    DataSource::Mixed
                };
            }
            decision.client.existing_client_ref = Some(client);
            decision.client.client_type = ClientType::Existing;
            decision.client_decision.use_existing = true;
            decision.client_decision.create_client = false;
            decision.client_decision.use_lead = false;
        }
    }
    if decision.client.lead_ref.is_none() {
        if let Some(lead) = findings.lead.clone() {
            if decision.client.existing_client_ref.is_none() {
                decision.client.client_type = ClientType::Lead;
                decision.client_decision.use_lead = true;
            }
            decision.client.lead_ref = Some(lead);
        }
    }
}

/// Re-applies the level-1 overrides so they hold regardless of what the model said.
fn enforce_overrides(decision: &mut Decision, signals: &Signals) {
    if let Some(rule) = rules::level_one(signals) {
        let already = decision.primary_incident.reason.eq_ignore_ascii_case(rule.reason)
            && decision.secondary_incidents.is_empty()
            && decision.ticket_decision.create_tickets
            && decision.ticket_decision.count == 1;
        if already {
            return;
        }
        let mut incident = Incident::new(rule.category, rule.reason, rule.description, decision.confidence);
        if decision.primary_incident.reason.eq_ignore_ascii_case(rule.reason) {
            incident.description = decision.primary_incident.description.clone();
        }
        incident.affected_policy_number = decision.primary_incident.affected_policy_number.clone();
        decision.priority = rule.priority;
        decision.collapse_to(
            incident,
            format!("'{}' overrides the model classification; single ticket planned", rule.reason),
        );
    } else if rules::is_override_reason(&decision.primary_incident.reason)
        && (!decision.secondary_incidents.is_empty() || decision.ticket_decision.count != 1)
    {
        let primary = decision.primary_incident.clone();
        let warning = format!("'{}' stands alone; other requests dropped", primary.reason);
        decision.collapse_to(primary, warning);
    }
}
