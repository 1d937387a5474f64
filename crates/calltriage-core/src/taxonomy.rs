//! Fixed incident taxonomy (category × reason) shared by the prompt, the validator,
//! and the keyword fallback.

/// Incident categories.
pub mod category {
    pub const NEW_BUSINESS: &str = "New Business";
    pub const POLICY_MODIFICATION: &str = "Policy Modification";
    pub const DOCUMENTATION: &str = "Documentation Request";
    pub const BILLING: &str = "Billing and Payments";
    pub const CLAIMS_ASSISTANCE: &str = "Claims and Assistance";
    pub const CUSTOMER_INQUIRY: &str = "Customer Inquiry";
    pub const CANCELLATION: &str = "Cancellation";
    pub const COMMERCIAL_HANDLING: &str = "Commercial Handling";
    pub const HUMAN_HANDOFF: &str = "Human Handoff";
    pub const INCOMPLETE_DATA: &str = "Incomplete Data";
}

/// Incident reasons, grouped by category.
pub mod reason {
    pub const NEW_POLICY_QUOTE: &str = "New policy quote";

    pub const EFFECTIVE_DATE_CHANGE: &str = "Effective date change";
    pub const INSURED_PARTY_CHANGE: &str = "Insured party modification";
    pub const PAYMENT_CONSOLIDATION: &str = "Payment frequency consolidation";
    pub const BANK_ACCOUNT_CHANGE: &str = "Bank account change";
    pub const CONTACT_DATA_CHANGE: &str = "Contact data change";
    pub const COVERAGE_CHANGE: &str = "Coverage change";

    pub const DUPLICATE_CARD: &str = "Duplicate card request";
    pub const POLICY_DOCUMENTS: &str = "Policy documents copy";
    pub const PAYMENT_CERTIFICATE: &str = "Payment certificate";

    pub const BILL_PAYMENT: &str = "Bill payment";
    pub const REFUND_REQUEST: &str = "Refund request";
    pub const UNRECOGNIZED_CHARGE: &str = "Unrecognized charge";

    pub const ROADSIDE_ASSISTANCE: &str = "Roadside assistance";
    pub const CLAIM_REPORT: &str = "Claim report";
    pub const CLAIM_STATUS: &str = "Claim status";

    pub const RESOLVED_INQUIRY: &str = "Inquiry resolved by agent";
    pub const UNRESOLVED_INQUIRY: &str = "Inquiry requiring human follow-up";

    pub const CANCELLATION_REQUEST: &str = "Policy cancellation request";

    pub const PAYMENT_FRACTIONATION: &str = "Payment fractionation request";
    pub const RETENTION: &str = "Retention opportunity";

    pub const REJECTS_AUTOMATION: &str = "Caller rejects automated assistant";
    pub const THIRD_PARTY_CALLER: &str = "Caller is not the policyholder";
    pub const UNCLASSIFIED: &str = "Unclassified request";

    pub const MISSING_REQUIRED_DATA: &str = "Missing required data";
}

/// One taxonomy row.
#[derive(Debug, Clone, Copy)]
pub struct CategorySpec {
    pub name: &'static str,
    pub reasons: &'static [&'static str],
    /// Handling note rendered into the prompt.
    pub note: &'static str,
}

/// Lines of business accepted on new-policy incidents.
pub const LINES_OF_BUSINESS: &[&str] = &["auto", "home", "health", "life", "travel", "pets", "business"];

pub const TAXONOMY: &[CategorySpec] = &[
    CategorySpec {
        name: category::NEW_BUSINESS,
        reasons: &[reason::NEW_POLICY_QUOTE],
        note: "Caller wants a new policy. Always set line_of_business.",
    },
    CategorySpec {
        name: category::POLICY_MODIFICATION,
        reasons: &[
            reason::EFFECTIVE_DATE_CHANGE,
            reason::INSURED_PARTY_CHANGE,
            reason::PAYMENT_CONSOLIDATION,
            reason::BANK_ACCOUNT_CHANGE,
            reason::CONTACT_DATA_CHANGE,
            reason::COVERAGE_CHANGE,
        ],
        note: "Direct changes to an existing policy. Fractional to annual payment is a consolidation.",
    },
    CategorySpec {
        name: category::DOCUMENTATION,
        reasons: &[reason::DUPLICATE_CARD, reason::POLICY_DOCUMENTS, reason::PAYMENT_CERTIFICATE],
        note: "Requests for cards, copies, or certificates. Mailing remarks by the agent do not change the category.",
    },
    CategorySpec {
        name: category::BILLING,
        reasons: &[reason::BILL_PAYMENT, reason::REFUND_REQUEST, reason::UNRECOGNIZED_CHARGE],
        note: "Bill payment is a mandatory transfer and wins over any informational query.",
    },
    CategorySpec {
        name: category::CLAIMS_ASSISTANCE,
        reasons: &[reason::ROADSIDE_ASSISTANCE, reason::CLAIM_REPORT, reason::CLAIM_STATUS],
        note: "Roadside assistance is a mandatory transfer and wins over any informational query.",
    },
    CategorySpec {
        name: category::CUSTOMER_INQUIRY,
        reasons: &[reason::RESOLVED_INQUIRY, reason::UNRESOLVED_INQUIRY],
        note: "Use the unresolved reason when the agent says it cannot access the data.",
    },
    CategorySpec {
        name: category::CANCELLATION,
        reasons: &[reason::CANCELLATION_REQUEST],
        note: "Caller asks to cancel or not renew a policy.",
    },
    CategorySpec {
        name: category::COMMERCIAL_HANDLING,
        reasons: &[reason::PAYMENT_FRACTIONATION, reason::RETENTION],
        note: "Annual to fractional payment is commercial handling, not a policy modification.",
    },
    CategorySpec {
        name: category::HUMAN_HANDOFF,
        reasons: &[reason::REJECTS_AUTOMATION, reason::THIRD_PARTY_CALLER, reason::UNCLASSIFIED],
        note: "Rejection of the automated assistant or a non-policyholder caller overrides everything else; one ticket only.",
    },
    CategorySpec {
        name: category::INCOMPLETE_DATA,
        reasons: &[reason::MISSING_REQUIRED_DATA],
        note: "Caller explicitly cannot provide required data; overrides everything else; one ticket only.",
    },
];

/// Case-insensitive match of `name` against the known categories.
pub fn canonical_category(name: &str) -> Option<&'static str> {
    let needle = name.trim();
    TAXONOMY
        .iter()
        .map(|c| c.name)
        .find(|c| c.eq_ignore_ascii_case(needle))
}

/// Case-insensitive match of `reason` within `category`.
pub fn canonical_reason(category: &str, reason: &str) -> Option<&'static str> {
    let needle = reason.trim();
    TAXONOMY
        .iter()
        .find(|c| c.name == category)?
        .reasons
        .iter()
        .copied()
        .find(|r| r.eq_ignore_ascii_case(needle))
}

/// Normalizes a line-of-business tag; unknown tags yield `None`.
pub fn canonical_line_of_business(tag: &str) -> Option<&'static str> {
    let needle = tag.trim().to_lowercase();
    LINES_OF_BUSINESS.iter().copied().find(|l| *l == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_reasons() {
        for spec in TAXONOMY {
            assert!(!spec.reasons.is_empty(), "{} has no reasons", spec.name);
        }
    }

    #[test]
    fn canonicalization_is_case_insensitive() {
        assert_eq!(canonical_category("human handoff"), Some(category::HUMAN_HANDOFF));
        assert_eq!(
            canonical_reason(category::DOCUMENTATION, "duplicate CARD request"),
            Some(reason::DUPLICATE_CARD)
        );
        assert_eq!(canonical_reason(category::BILLING, "duplicate card request"), None);
        assert_eq!(canonical_line_of_business(" Auto "), Some("auto"));
        assert_eq!(canonical_line_of_business("boats"), None);
    }
}
