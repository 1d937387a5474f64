//! Prompt template for the completion service.

use super::ClassificationContext;
use crate::decision::MAX_SECONDARY_INCIDENTS;
use crate::taxonomy::{LINES_OF_BUSINESS, TAXONOMY};
use std::fmt::Write as _;

const PREAMBLE: &str = "You classify finished phone calls to an insurance contact centre. \
Read the transcript (including TOOL_RESULTS from backend lookups made during the call) and \
answer with ONE JSON object and nothing else.";

const PRIORITY_RULES: &str = "\
Apply these rules in order; categories overlap.
1. If the caller explicitly rejects the automated assistant, is not the policyholder, or explicitly \
cannot provide required data, use that Human Handoff or Incomplete Data reason as the ONLY incident \
and plan exactly one ticket, even if other requests appear.
2. Bill payment and roadside assistance are mandatory transfers; they win over any informational query.
3. Annual to fractional payment is Commercial Handling / Payment fractionation request. Fractional to \
annual is Policy Modification / Payment frequency consolidation.
4. If the agent answered an informational question, use Inquiry resolved by agent. If the agent said \
it cannot access the data, use Inquiry requiring human follow-up.
5. Everything else follows the taxonomy table with no special precedence.";

const EXAMPLES: &str = r#"Example A
USER: I don't want to talk to a machine, put me through to a person. I also moved house.
-> primary_incident: Human Handoff / Caller rejects automated assistant; secondary_incidents: []; ticket_decision.count: 1

Example B
USER: I lost my health card, can I get a duplicate?
AGENT: Sure, we'll post it to the address on file.
-> primary_incident: Documentation Request / Duplicate card request (the mailing remark does not change it)

Example C
USER: I want to know how much my renewal is, and I need to pay last month's bill.
-> primary_incident: Billing and Payments / Bill payment; the renewal question is not a separate incident"#;

const SCHEMA: &str = r#"{
  "client": {"type": "existing|lead|new|unknown", "extracted_fields": {"full_name": "", "phone": "", "email": "", "national_id": "", "policy_number": ""},
             "existing_client_ref": {"id": "", "name": "", "policy_number": ""} | null,
             "lead_ref": {"id": "", "campaign": "", "line_of_business": ""} | null},
  "primary_incident": {"category": "", "reason": "", "line_of_business": null, "description": "", "confidence": 0.0, "affected_policy_number": null},
  "secondary_incidents": [],
  "follow_up": {"is_follow_up": false, "related_ticket_id": null, "create_new_ticket": true, "reason": null},
  "client_decision": {"create_client": false, "use_existing": false, "use_lead": false, "data_source": "extracted|backend_lookup|lead|mixed"},
  "ticket_decision": {"create_tickets": true, "count": 1, "entries": [{"kind": "primary", "incident_ref": "primary", "client_id_to_use": null, "policy_number": null}]},
  "priority": "low|medium|high",
  "confidence": 0.0,
  "notes_for_ticket": "",
  "warnings": []
}"#;

/// Renders the full prompt for one call.
pub fn build_prompt(transcript: &str, ctx: &ClassificationContext, folded_reason: &str) -> String {
    let mut out = String::with_capacity(transcript.len() + 4096);
    let _ = writeln!(out, "{}\n", PREAMBLE);

    out.push_str("## Taxonomy\n| Category | Reasons | Notes |\n|---|---|---|\n");
    for spec in TAXONOMY {
        let _ = writeln!(out, "| {} | {} | {} |", spec.name, spec.reasons.join("; "), spec.note);
    }
    let _ = writeln!(
        out,
        "\nNew Business incidents must set line_of_business to one of: {}.\n",
        LINES_OF_BUSINESS.join(", ")
    );

    let _ = writeln!(out, "## Priority rules\n{}\n", PRIORITY_RULES);
    let _ = writeln!(
        out,
        "Independent requests go in secondary_incidents (at most {}). If there are more, the last \
         secondary incident must be Human Handoff / {} listing the remaining requests in its description.\n",
        MAX_SECONDARY_INCIDENTS, folded_reason
    );

    out.push_str("## Prior tickets for this caller\n");
    if ctx.prior_tickets.is_empty() {
        out.push_str("none\n");
    } else {
        for ticket in &ctx.prior_tickets {
            let day = chrono::DateTime::from_timestamp_millis(ticket.created_at_ms)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown date".to_string());
            let _ = writeln!(
                out,
                "- {} ({}): {} / {}{}",
                ticket.ticket_id,
                day,
                ticket.category,
                ticket.reason,
                ticket
                    .policy_number
                    .as_deref()
                    .map(|p| format!(", policy {}", p))
                    .unwrap_or_default()
            );
        }
        out.push_str(
            "If the caller is chasing one of these, set follow_up.is_follow_up = true, \
             related_ticket_id to it and create_new_ticket = false.\n",
        );
    }
    if let Some(client_id) = ctx.client_id.as_deref() {
        let _ = writeln!(out, "Known client id for this call: {}", client_id);
    }

    let _ = writeln!(out, "\n## Examples\n{}\n", EXAMPLES);
    let _ = writeln!(out, "## Response schema\n{}\n", SCHEMA);
    let _ = write!(out, "## Transcript\n{}\n", transcript);
    out
}
