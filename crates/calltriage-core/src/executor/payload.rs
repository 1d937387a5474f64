//! Builds backend payloads from a Decision.

use crate::collaborators::ClientPayload;
use crate::decision::{Decision, Incident, Priority};
use crate::sanitizer::FieldSanitizer;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Given name, first family name, second family name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameParts {
    pub given: String,
    pub first_surname: Option<String>,
    pub second_surname: Option<String>,
}

/// Splits a free-text full name. The last two words are family names; anything
/// before them is the given name (compound given names stay together).
pub fn split_full_name(full_name: &str) -> NameParts {
    let words: Vec<&str> = full_name.split_whitespace().collect();
    match words.len() {
        0 => NameParts::default(),
        1 => NameParts {
            given: words[0].to_string(),
            ..NameParts::default()
        },
        2 => NameParts {
            given: words[0].to_string(),
            first_surname: Some(words[1].to_string()),
            second_surname: None,
        },
        n => NameParts {
            given: words[..n - 2].join(" "),
            first_surname: Some(words[n - 2].to_string()),
            second_surname: Some(words[n - 1].to_string()),
        },
    }
}

/// `PREFIX-YYYYMMDD-XXXXXXXX`, random suffix.
pub fn new_client_id(prefix: &str, day: NaiveDate) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .to_uppercase()
        .chars()
        .take(8)
        .collect();
    format!("{}-{}-{}", prefix, day.format("%Y%m%d"), suffix)
}

fn first_field(fields: &BTreeMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| fields.get(*k))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

const UNKNOWN_GIVEN_NAME: &str = "Unknown caller";

/// Client-creation request from the extracted caller fields.
pub fn client_payload(
    client_id: &str,
    decision: &Decision,
    caller_phone: Option<&str>,
    sanitizer: &FieldSanitizer,
) -> ClientPayload {
    let fields = &decision.client.extracted_fields;
    let mut name = first_field(fields, &["full_name", "name"])
        .map(|n| split_full_name(&n))
        .unwrap_or_default();
    if let Some(given) = first_field(fields, &["given_name", "first_name"]) {
        name.given = given;
    }
    if let Some(s) = first_field(fields, &["first_surname", "last_name"]) {
        name.first_surname = Some(s);
    }
    if let Some(s) = first_field(fields, &["second_surname"]) {
        name.second_surname = Some(s);
    }
    if name.given.is_empty() {
        name.given = UNKNOWN_GIVEN_NAME.to_string();
    }

    let text = |field: &str, v: Option<String>| v.map(|v| sanitizer.text(field, &v)).filter(|v| !v.is_empty());
    let policy = first_field(fields, &["policy_number"]).or_else(|| {
        decision
            .client
            .existing_client_ref
            .as_ref()
            .and_then(|r| r.policy_number.clone())
    });

    ClientPayload {
        client_id: client_id.to_string(),
        given_name: sanitizer.text("given_name", &name.given),
        first_surname: text("first_surname", name.first_surname),
        second_surname: text("second_surname", name.second_surname),
        phone: text(
            "phone",
            first_field(fields, &["phone", "caller_phone"]).or_else(|| caller_phone.map(str::to_string)),
        ),
        email: text("email", first_field(fields, &["email"])),
        national_id: text("national_id", first_field(fields, &["national_id", "dni", "nif"])),
        address: text("address", first_field(fields, &["address"])),
        policy_number: sanitizer.policy_number(policy.as_deref()),
        lead_id: decision.client.lead_ref.as_ref().map(|l| l.id.clone()),
    }
}

/// Raw notes for one ticket; the sanitizer flattens them afterwards.
pub fn ticket_notes(decision: &Decision, incident: &Incident) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !incident.description.trim().is_empty() {
        parts.push(incident.description.trim().to_string());
    }
    if let Some(notes) = decision.notes_for_ticket.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        parts.push(notes.to_string());
    }
    if decision.follow_up.is_follow_up {
        if let Some(related) = decision.follow_up.related_ticket_id.as_deref() {
            parts.push(format!("Related to ticket {}.", related));
        }
    }
    parts.push(format!("Priority: {}.", priority_label(decision.priority)));
    parts.join(" ")
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{ClientInfo, ClientType, LeadRef};
    use crate::shared::FieldLimits;
    use crate::taxonomy::{category, reason};

    fn decision_with_fields(fields: &[(&str, &str)]) -> Decision {
        let mut d = Decision {
            client: ClientInfo {
                client_type: ClientType::New,
                extracted_fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                existing_client_ref: None,
                lead_ref: None,
            },
            primary_incident: Incident::new(category::NEW_BUSINESS, reason::NEW_POLICY_QUOTE, "Wants a home quote", 0.9),
            secondary_incidents: Vec::new(),
            follow_up: Default::default(),
            client_decision: Default::default(),
            ticket_decision: Default::default(),
            priority: Priority::Medium,
            confidence: 0.9,
            notes_for_ticket: None,
            warnings: Vec::new(),
        };
        d.plan_ticket_per_incident();
        d
    }

    #[test]
    fn names_split_into_slots() {
        assert_eq!(split_full_name("Ana").given, "Ana");
        let two = split_full_name("Ana Ruiz");
        assert_eq!(two.first_surname.as_deref(), Some("Ruiz"));
        assert_eq!(two.second_surname, None);
        let three = split_full_name("  Ana   Ruiz Peña ");
        assert_eq!(three.given, "Ana");
        assert_eq!(three.second_surname.as_deref(), Some("Peña"));
        let four = split_full_name("María José García López");
        assert_eq!(four.given, "María José");
        assert_eq!(four.first_surname.as_deref(), Some("García"));
        assert_eq!(four.second_surname.as_deref(), Some("López"));
    }

    #[test]
    fn client_ids_carry_prefix_and_day() {
        let id = new_client_id("CLI", NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        assert!(id.starts_with("CLI-20261016-"));
        assert_eq!(id.len(), "CLI-20261016-".len() + 8);
        assert_ne!(id, new_client_id("CLI", NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()));
    }

    #[test]
    fn client_payload_uses_fields_phone_and_lead() {
        let mut d = decision_with_fields(&[
            ("full_name", "Ana Ruiz Peña"),
            ("email", "ana@example.com"),
            ("policy_number", "to be obtained"),
        ]);
        d.client.lead_ref = Some(LeadRef {
            id: "L-4".to_string(),
            campaign: None,
            line_of_business: None,
        });
        let sanitizer = FieldSanitizer::new(FieldLimits::default());
        let payload = client_payload("CLI-1", &d, Some("+34600111222"), &sanitizer);
        assert_eq!(payload.given_name, "Ana");
        assert_eq!(payload.first_surname.as_deref(), Some("Ruiz"));
        assert_eq!(payload.phone.as_deref(), Some("+34600111222"));
        assert_eq!(payload.policy_number, None);
        assert_eq!(payload.lead_id.as_deref(), Some("L-4"));
    }

    #[test]
    fn nameless_client_gets_placeholder_given_name() {
        let d = decision_with_fields(&[]);
        let payload = client_payload("CLI-2", &d, None, &FieldSanitizer::default());
        assert_eq!(payload.given_name, UNKNOWN_GIVEN_NAME);
        assert!(payload.phone.is_none());
    }

    #[test]
    fn notes_mention_related_ticket_and_priority() {
        let mut d = decision_with_fields(&[]);
        d.notes_for_ticket = Some("Call back after 5pm".to_string());
        d.follow_up.is_follow_up = true;
        d.follow_up.related_ticket_id = Some("TKT-20261001-002".to_string());
        let notes = ticket_notes(&d, &d.primary_incident);
        assert_eq!(
            notes,
            "Wants a home quote Call back after 5pm Related to ticket TKT-20261001-002. Priority: medium."
        );
    }
}
