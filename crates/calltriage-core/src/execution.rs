//! Per-call aggregate of every attempted side effect.

use serde::{Deserialize, Serialize};

/// Outcome of one backend action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn success(id: impl Into<String>) -> Self {
        Self {
            ok: true,
            id: Some(id.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            error: Some(error.into()),
        }
    }

    /// Failure that still carries the identifier that was attempted.
    pub fn failure_with_id(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: Some(id.into()),
            error: Some(error.into()),
        }
    }
}

/// Outcome of one ticket submission, attributable to the incident it was for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketOutcome {
    #[serde(flatten)]
    pub outcome: ActionOutcome,
    pub incident_ref: String,
    pub category: String,
    pub reason: String,
}

/// Aggregated result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub call_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_created: Option<ActionOutcome>,
    #[serde(default)]
    pub tickets_created: Vec<TicketOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_created: Option<ActionOutcome>,
    /// Conditions that prevented an action from being attempted at all.
    #[serde(default)]
    pub flags: Vec<String>,
    pub summary: String,
}

impl ExecutionResult {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            ..Self::default()
        }
    }

    /// Result for a run aborted before any action was attempted.
    pub fn fatal(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            call_id: call_id.into(),
            success: false,
            flags: vec![error.clone()],
            summary: format!("Processing aborted: {}", error),
            ..Self::default()
        }
    }

    pub fn tickets_ok(&self) -> usize {
        self.tickets_created.iter().filter(|t| t.outcome.ok).count()
    }

    pub fn tickets_failed(&self) -> usize {
        self.tickets_created.len() - self.tickets_ok()
    }

    /// True when any attempted action failed or a planned action was skipped.
    pub fn has_failures(&self) -> bool {
        self.client_created.as_ref().is_some_and(|c| !c.ok)
            || self.tickets_failed() > 0
            || self.follow_up_created.as_ref().is_some_and(|f| !f.ok)
            || !self.flags.is_empty()
    }

    /// Sets `success` and synthesizes the one-line `summary`.
    pub fn finalize(&mut self) {
        self.success = !self.has_failures();
        let mut parts: Vec<String> = Vec::new();
        match &self.client_created {
            Some(c) if c.ok => parts.push(format!("client {} created", c.id.as_deref().unwrap_or("?"))),
            Some(_) => parts.push("client creation failed".to_string()),
            None => {}
        }
        if !self.tickets_created.is_empty() {
            let ids: Vec<&str> = self
                .tickets_created
                .iter()
                .filter(|t| t.outcome.ok)
                .filter_map(|t| t.outcome.id.as_deref())
                .collect();
            let mut part = format!("{}/{} tickets created", self.tickets_ok(), self.tickets_created.len());
            if !ids.is_empty() {
                part.push_str(&format!(" ({})", ids.join(", ")));
            }
            parts.push(part);
        }
        match &self.follow_up_created {
            Some(f) if f.ok => parts.push(format!("follow-up logged on {}", f.id.as_deref().unwrap_or("?"))),
            Some(_) => parts.push("follow-up logging failed".to_string()),
            None => {}
        }
        parts.extend(self.flags.iter().cloned());
        if parts.is_empty() {
            parts.push("no actions required".to_string());
        }
        self.summary = parts.join("; ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(outcome: ActionOutcome) -> TicketOutcome {
        TicketOutcome {
            outcome,
            incident_ref: "primary".to_string(),
            category: "Documentation Request".to_string(),
            reason: "Duplicate card request".to_string(),
        }
    }

    #[test]
    fn summary_lists_counts_and_ids() {
        let mut result = ExecutionResult::new("call-1");
        result.client_created = Some(ActionOutcome::success("CLI-1"));
        result.tickets_created.push(ticket(ActionOutcome::success("TKT-20261016-001")));
        result.tickets_created.push(ticket(ActionOutcome::failure("status 500")));
        result.finalize();
        assert!(!result.success);
        assert_eq!(
            result.summary,
            "client CLI-1 created; 1/2 tickets created (TKT-20261016-001)"
        );
    }

    #[test]
    fn empty_result_is_successful() {
        let mut result = ExecutionResult::new("call-2");
        result.finalize();
        assert!(result.success);
        assert_eq!(result.summary, "no actions required");
    }

    #[test]
    fn fatal_result_reports_failure() {
        let result = ExecutionResult::fatal("call-3", "call record not found");
        assert!(!result.success);
        assert!(result.tickets_created.is_empty());
        assert!(result.summary.contains("call record not found"));
    }

    #[test]
    fn ticket_outcome_flattens_on_the_wire() {
        let json = serde_json::to_value(ticket(ActionOutcome::success("TKT-1"))).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["id"], "TKT-1");
        assert_eq!(json["incident_ref"], "primary");
    }
}
