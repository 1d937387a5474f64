//! Heuristic Decision built from the rule table when the model path is unavailable.

use super::lookup::{self, LookupFindings};
use super::rules::{self, Rule, Signals, Tier};
use super::{ClassificationContext, FALLBACK_CONFIDENCE};
use crate::decision::{
    ClientDecision, ClientInfo, ClientType, DataSource, Decision, ExistingClientRef, FollowUp, Incident,
};
use crate::store::TicketRecord;
use crate::taxonomy::{self, category, reason};
use crate::transcript::TranscriptSegment;

/// Caller phrases that point back at an earlier request.
const FOLLOW_UP_PHRASES: &[&str] = &[
    "already called",
    "called before",
    "called last week",
    "called yesterday",
    "follow up",
    "follow-up",
    "my ticket",
    "still waiting",
    "reference number",
    "any news",
];

/// Extracted fields that are enough to open a client record.
const IDENTITY_FIELDS: &[&str] = &["full_name", "name", "given_name", "phone"];

pub(super) fn heuristic_decision(
    segments: &[TranscriptSegment],
    signals: &Signals,
    findings: &LookupFindings,
    ctx: &ClassificationContext,
    folded_reason: &str,
    warning: String,
) -> Decision {
    let selected = rules::select(signals);
    let is_override = selected.first().is_some_and(|r| r.tier == Tier::Override);

    let mut extracted = lookup::spoken_fields(segments);
    if let Some(phone) = ctx.caller_phone.as_deref().filter(|p| !p.is_empty()) {
        extracted.entry("phone".to_string()).or_insert_with(|| phone.to_string());
    }
    let policy_number = extracted
        .get("policy_number")
        .cloned()
        .or_else(|| (!findings.policy_numbers.is_empty()).then(|| findings.policy_numbers.join(", ")));

    let mut incidents: Vec<Incident> = selected
        .iter()
        .map(|rule| incident_for(rule, signals, policy_number.as_deref()))
        .collect();

    let mut follow_up = FollowUp::default();
    let mut follow_up_only = false;
    if !is_override && mentions(&signals.user, FOLLOW_UP_PHRASES) {
        if let Some(prior) = newest(&ctx.prior_tickets) {
            follow_up_only = incidents.iter().all(|i| same_request(i, prior));
            follow_up = FollowUp {
                is_follow_up: true,
                related_ticket_id: Some(prior.ticket_id.clone()),
                create_new_ticket: !follow_up_only,
                reason: Some(if follow_up_only {
                    format!("Caller is chasing ticket {}", prior.ticket_id)
                } else {
                    format!("Caller mentioned ticket {} but raised new requests", prior.ticket_id)
                }),
            };
            if incidents.is_empty() {
                let prior_category: &str = match taxonomy::canonical_category(&prior.category) {
                    Some(c) => c,
                    None => &prior.category,
                };
                let mut incident = Incident::new(
                    prior_category,
                    &prior.reason,
                    format!("Follow-up on ticket {}", prior.ticket_id),
                    FALLBACK_CONFIDENCE,
                );
                incident.line_of_business = prior.line_of_business.clone();
                incident.affected_policy_number = prior.policy_number.clone().or_else(|| policy_number.clone());
                incidents.push(incident);
            }
        }
    }

    if incidents.is_empty() {
        incidents.push(Incident::new(
            category::HUMAN_HANDOFF,
            reason::UNCLASSIFIED,
            "No heuristic rule matched; manual review required",
            FALLBACK_CONFIDENCE,
        ));
    }

    let priority = selected.iter().map(|r| r.priority).max().unwrap_or_default();
    let mut warnings = vec![warning];
    if is_override {
        warnings.push(format!("'{}' overrides any other request in the call", selected[0].reason));
    }
    let notes_for_ticket = if selected.is_empty() {
        None
    } else {
        Some(format!(
            "Heuristic classification matched: {}.",
            selected.iter().map(|r| r.name).collect::<Vec<_>>().join(", ")
        ))
    };

    let (client, client_decision) = client_section(extracted, findings, ctx);
    let primary_incident = incidents.remove(0);
    let mut decision = Decision {
        client,
        primary_incident,
        secondary_incidents: incidents,
        follow_up,
        client_decision,
        ticket_decision: Default::default(),
        priority,
        confidence: FALLBACK_CONFIDENCE,
        notes_for_ticket,
        warnings,
    };
    decision.fold_secondaries(folded_reason);
    if follow_up_only {
        decision.plan_no_tickets();
    } else {
        decision.plan_ticket_per_incident();
    }
    decision
}

fn mentions(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

fn incident_for(rule: &Rule, signals: &Signals, policy_number: Option<&str>) -> Incident {
    let mut incident = Incident::new(rule.category, rule.reason, rule.description, FALLBACK_CONFIDENCE);
    if rule.category == category::NEW_BUSINESS {
        incident.line_of_business = rules::line_of_business(signals).map(str::to_string);
    } else {
        incident.affected_policy_number = policy_number.map(str::to_string);
    }
    incident
}

fn newest(tickets: &[TicketRecord]) -> Option<&TicketRecord> {
    tickets
        .iter()
        .max_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.ticket_id.cmp(&b.ticket_id)))
}

fn same_request(incident: &Incident, prior: &TicketRecord) -> bool {
    incident.category.eq_ignore_ascii_case(&prior.category) && incident.reason.eq_ignore_ascii_case(&prior.reason)
}

fn client_section(
    extracted: std::collections::BTreeMap<String, String>,
    findings: &LookupFindings,
    ctx: &ClassificationContext,
) -> (ClientInfo, ClientDecision) {
    let existing_client_ref = findings.client.clone().or_else(|| {
        ctx.client_id.clone().map(|id| ExistingClientRef {
            id,
            name: String::new(),
            policy_number: None,
        })
    });
    let lead_ref = findings.lead.clone();
    let client_type = if existing_client_ref.is_some() {
        ClientType::Existing
    } else if lead_ref.is_some() {
        ClientType::Lead
    } else if extracted.contains_key("full_name") {
        ClientType::New
    } else {
        ClientType::Unknown
    };
    let data_source = match (&findings.client, &lead_ref) {
        (Some(_), _) if !extracted.is_empty() => DataSource::Mixed,
        (Some(_), _) => DataSource::BackendLookup,
        (None, Some(_)) if existing_client_ref.is_none() => DataSource::Lead,
        _ => DataSource::Extracted,
    };
    let use_existing = existing_client_ref.is_some();
    let identifiable = lead_ref.is_some() || IDENTITY_FIELDS.iter().any(|k| extracted.contains_key(*k));
    let decision = ClientDecision {
        create_client: !use_existing && identifiable,
        use_existing,
        use_lead: !use_existing && lead_ref.is_some(),
        data_source,
    };
    let info = ClientInfo {
        client_type,
        extracted_fields: extracted,
        existing_client_ref,
        lead_ref,
    };
    (info, decision)
}
