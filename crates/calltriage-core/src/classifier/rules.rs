//! Ordered keyword rules for the heuristic classifier.
//!
//! Categories overlap, so precedence is explicit: [`RULES`] is evaluated top to
//! bottom and [`select`] applies the tier policy.
//!
//! | Tier | Effect |
//! |---|---|
//! | 1 `Override` | first match wins outright; one ticket |
//! | 2 `MandatoryTransfer` | suppresses every informational query |
//! | 3 `PaymentFrequency` | direction decides commercial handling vs. modification |
//! | 4 `Inquiry` | unresolved beats resolved; resolved is dropped beside real requests |
//! | 5 `General` | taxonomy order, no special precedence |

use crate::decision::Priority;
use crate::taxonomy::{category, reason};
use crate::transcript::{lowered_text_by, Speaker, TranscriptSegment};
use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Override = 1,
    MandatoryTransfer = 2,
    PaymentFrequency = 3,
    Inquiry = 4,
    General = 5,
}

/// Lower-cased transcript views the predicates read.
#[derive(Debug, Clone)]
pub struct Signals {
    pub user: String,
    pub agent: String,
}

impl Signals {
    pub fn new(segments: &[TranscriptSegment]) -> Self {
        Self {
            user: lowered_text_by(segments, Speaker::User),
            agent: lowered_text_by(segments, Speaker::Agent),
        }
    }
}

/// One predicate → classification pair.
pub struct Rule {
    pub name: &'static str,
    pub tier: Tier,
    pub category: &'static str,
    pub reason: &'static str,
    pub priority: Priority,
    pub description: &'static str,
    pub applies: fn(&Signals) -> bool,
}

fn any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

/// Whole-word match, so "son" does not fire on "person".
fn any_word(text: &str, words: &[&str]) -> bool {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
        .any(|w| words.contains(&w))
}

lazy_static! {
    static ref TO_FRACTIONAL: Regex = Regex::new(
        r"from (an? )?(annual|yearly|once a year)[a-z ]{0,20} to (monthly|quarterly|semi-?annual|installments|instalments)|instead of (annually|yearly|once a year|an annual|one payment)|(split|spread|divide) (the |my )?(payment|premium)|in (installments|instalments)|(pay|paying) (it |them )?(monthly|quarterly|every month) instead"
    )
    .unwrap();
    static ref TO_ANNUAL: Regex = Regex::new(
        r"from (monthly|quarterly|semi-?annual)[a-z ]{0,20} to (annual|yearly|once a year|a single payment)|instead of (monthly|quarterly|every month)|(pay|paying) (it |them )?(all )?(annually|yearly|once a year|in one go|all at once)|(single|one) (annual )?payment|consolidat|unify (the |my )?payments"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentDirection {
    ToFractional,
    ToAnnual,
}

/// Which way the caller wants to change payment frequency; `None` when absent or ambiguous.
pub fn payment_direction(text: &str) -> Option<PaymentDirection> {
    match (TO_FRACTIONAL.is_match(text), TO_ANNUAL.is_match(text)) {
        (true, false) => Some(PaymentDirection::ToFractional),
        (false, true) => Some(PaymentDirection::ToAnnual),
        _ => None,
    }
}

fn rejects_automation(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "talk to a machine",
            "speak to a machine",
            "talking to a machine",
            "talk to a robot",
            "speak to a robot",
            "talking to a robot",
            "don't want a machine",
            "don't want a robot",
            "real person",
            "human being",
            "talk to a human",
            "speak to a human",
            "talk to a person",
            "speak to a person",
            "through to a person",
            "transfer me to a person",
            "live agent",
            "human agent",
            "real agent",
        ],
    )
}

fn third_party_caller(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "not the policyholder",
            "not the policy holder",
            "i'm not the holder",
            "i am not the holder",
            "calling on behalf of",
            "on behalf of my",
            "it's my husband's policy",
            "it's my wife's policy",
            "it's my mother's policy",
            "it's my father's policy",
            "the policy is in my husband's name",
            "the policy is in my wife's name",
            "the policy is not in my name",
            "policy isn't in my name",
        ],
    )
}

fn missing_required_data(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "don't have the policy number",
            "do not have the policy number",
            "don't have my policy number",
            "don't know my policy number",
            "don't know the policy number",
            "don't remember my policy number",
            "can't find my policy number",
            "don't have my id",
            "don't have my id number",
            "don't have that information",
            "don't have the details",
            "don't have the data",
        ],
    ) || any(
        &s.agent,
        &["cannot proceed without", "can't proceed without", "unable to continue without"],
    )
}

fn bill_payment(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "pay my bill",
            "pay the bill",
            "pay a bill",
            "make a payment",
            "pay the receipt",
            "pay my receipt",
            "pending receipt",
            "outstanding receipt",
            "pay what i owe",
            "pay the premium",
            "pay my premium",
            "pay the outstanding",
        ],
    )
}

fn roadside_assistance(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "roadside",
            "tow truck",
            "need a tow",
            "towing",
            "broke down",
            "broken down",
            "breakdown",
            "flat tire",
            "flat tyre",
            "won't start",
            "battery is dead",
            "dead battery",
            "stuck on the road",
            "stuck on the highway",
        ],
    )
}

fn payment_to_fractional(s: &Signals) -> bool {
    payment_direction(&s.user) == Some(PaymentDirection::ToFractional)
}

fn payment_to_annual(s: &Signals) -> bool {
    payment_direction(&s.user) == Some(PaymentDirection::ToAnnual)
}

fn agent_cannot_access(s: &Signals) -> bool {
    any(
        &s.agent,
        &[
            "cannot access",
            "can't access",
            "don't have access",
            "do not have access",
            "unable to access",
            "not able to access",
            "cannot see that information",
            "can't see that information",
            "cannot check that",
            "can't check that",
        ],
    )
}

fn caller_asks(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "i wanted to know",
            "i want to know",
            "i'd like to know",
            "can you tell me",
            "could you tell me",
            "i have a question",
            "what is the",
            "how much",
            "when does",
            "when is",
            "information about",
        ],
    )
}

fn resolved_inquiry(s: &Signals) -> bool {
    caller_asks(s) && !agent_cannot_access(s)
}

fn duplicate_card(s: &Signals) -> bool {
    (s.user.contains("duplicate") && s.user.contains("card"))
        || any(&s.user, &["lost my card", "replacement card", "new card", "card was stolen"])
}

fn policy_documents(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "copy of my policy",
            "copy of the policy",
            "policy documents",
            "policy document",
            "policy conditions",
            "conditions of my policy",
            "send me the documents",
        ],
    )
}

fn payment_certificate(s: &Signals) -> bool {
    any(
        &s.user,
        &["payment certificate", "certificate of payment", "proof of payment", "tax certificate"],
    )
}

fn effective_date_change(s: &Signals) -> bool {
    any(&s.user, &["change", "move", "modify", "postpone", "bring forward"])
        && s.user.contains("date")
        && any(&s.user, &["policy", "start", "effective", "coverage", "renewal"])
}

fn insured_party_change(s: &Signals) -> bool {
    any_word(&s.user, &["include", "exclude", "add", "remove"])
        && any_word(
            &s.user,
            &["child", "children", "son", "daughter", "spouse", "wife", "husband", "partner", "baby", "kid", "kids"],
        )
}

fn bank_account_change(s: &Signals) -> bool {
    any(&s.user, &["bank account", "iban", "account number", "direct debit"])
        && any(&s.user, &["change", "update", "new", "different", "switch"])
}

fn contact_data_change(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "change my address",
            "update my address",
            "new address",
            "moved house",
            "change my phone",
            "update my phone",
            "new phone number",
            "change my email",
            "update my email",
            "new email",
        ],
    )
}

fn coverage_change(s: &Signals) -> bool {
    s.user.contains("coverage") && any(&s.user, &["add", "increase", "extend", "upgrade", "reduce", "change", "lower"])
}

fn refund_request(s: &Signals) -> bool {
    any(&s.user, &["refund", "reimburse", "money back", "return the money"])
}

fn unrecognized_charge(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "unrecognized charge",
            "don't recognize",
            "do not recognize",
            "charged twice",
            "double charge",
            "unknown charge",
            "wrong charge",
        ],
    )
}

fn claim_report(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "accident",
            "crash",
            "collision",
            "report a claim",
            "file a claim",
            "open a claim",
            "water leak",
            "flooded",
            "burglary",
            "was stolen",
            "broken window",
        ],
    ) && !claim_status(s)
}

fn claim_status(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "status of my claim",
            "claim status",
            "how is my claim",
            "update on my claim",
            "update on the claim",
            "news about my claim",
        ],
    )
}

fn cancellation(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "cancel my policy",
            "cancel the policy",
            "cancel my insurance",
            "cancel the insurance",
            "cancellation",
            "don't want to renew",
            "do not want to renew",
            "not renew",
        ],
    )
}

fn retention(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "cheaper",
            "better price",
            "another company",
            "another insurer",
            "too expensive",
            "lower the price",
            "better offer",
        ],
    )
}

fn new_business(s: &Signals) -> bool {
    any(
        &s.user,
        &[
            "new policy",
            "a quote",
            "quotation",
            "take out a policy",
            "take out insurance",
            "new insurance",
            "want to insure",
            "buy insurance",
            "get insurance",
            "hire insurance",
        ],
    )
}

/// Every rule in evaluation order.
pub static RULES: &[Rule] = &[
    Rule {
        name: "rejects_automation",
        tier: Tier::Override,
        category: category::HUMAN_HANDOFF,
        reason: reason::REJECTS_AUTOMATION,
        priority: Priority::Medium,
        description: "Caller refused the automated assistant and asked for a person",
        applies: rejects_automation,
    },
    Rule {
        name: "third_party_caller",
        tier: Tier::Override,
        category: category::HUMAN_HANDOFF,
        reason: reason::THIRD_PARTY_CALLER,
        priority: Priority::Medium,
        description: "Caller is not the policyholder",
        applies: third_party_caller,
    },
    Rule {
        name: "missing_required_data",
        tier: Tier::Override,
        category: category::INCOMPLETE_DATA,
        reason: reason::MISSING_REQUIRED_DATA,
        priority: Priority::Low,
        description: "Caller could not provide the data required to proceed",
        applies: missing_required_data,
    },
    Rule {
        name: "bill_payment",
        tier: Tier::MandatoryTransfer,
        category: category::BILLING,
        reason: reason::BILL_PAYMENT,
        priority: Priority::High,
        description: "Caller wants to pay an outstanding bill",
        applies: bill_payment,
    },
    Rule {
        name: "roadside_assistance",
        tier: Tier::MandatoryTransfer,
        category: category::CLAIMS_ASSISTANCE,
        reason: reason::ROADSIDE_ASSISTANCE,
        priority: Priority::High,
        description: "Caller needs roadside assistance",
        applies: roadside_assistance,
    },
    Rule {
        name: "payment_fractionation",
        tier: Tier::PaymentFrequency,
        category: category::COMMERCIAL_HANDLING,
        reason: reason::PAYMENT_FRACTIONATION,
        priority: Priority::Medium,
        description: "Caller wants to move from annual to fractional payments",
        applies: payment_to_fractional,
    },
    Rule {
        name: "payment_consolidation",
        tier: Tier::PaymentFrequency,
        category: category::POLICY_MODIFICATION,
        reason: reason::PAYMENT_CONSOLIDATION,
        priority: Priority::Medium,
        description: "Caller wants to consolidate fractional payments into one annual payment",
        applies: payment_to_annual,
    },
    Rule {
        name: "unresolved_inquiry",
        tier: Tier::Inquiry,
        category: category::CUSTOMER_INQUIRY,
        reason: reason::UNRESOLVED_INQUIRY,
        priority: Priority::Medium,
        description: "Caller asked for information the agent could not access",
        applies: agent_cannot_access,
    },
    Rule {
        name: "resolved_inquiry",
        tier: Tier::Inquiry,
        category: category::CUSTOMER_INQUIRY,
        reason: reason::RESOLVED_INQUIRY,
        priority: Priority::Low,
        description: "Caller asked a question the agent answered",
        applies: resolved_inquiry,
    },
    Rule {
        name: "duplicate_card",
        tier: Tier::General,
        category: category::DOCUMENTATION,
        reason: reason::DUPLICATE_CARD,
        priority: Priority::Medium,
        description: "Caller requested a duplicate insurance card",
        applies: duplicate_card,
    },
    Rule {
        name: "policy_documents",
        tier: Tier::General,
        category: category::DOCUMENTATION,
        reason: reason::POLICY_DOCUMENTS,
        priority: Priority::Low,
        description: "Caller requested a copy of the policy documents",
        applies: policy_documents,
    },
    Rule {
        name: "payment_certificate",
        tier: Tier::General,
        category: category::DOCUMENTATION,
        reason: reason::PAYMENT_CERTIFICATE,
        priority: Priority::Low,
        description: "Caller requested a payment certificate",
        applies: payment_certificate,
    },
    Rule {
        name: "effective_date_change",
        tier: Tier::General,
        category: category::POLICY_MODIFICATION,
        reason: reason::EFFECTIVE_DATE_CHANGE,
        priority: Priority::Medium,
        description: "Caller wants to change the policy effective date",
        applies: effective_date_change,
    },
    Rule {
        name: "insured_party_change",
        tier: Tier::General,
        category: category::POLICY_MODIFICATION,
        reason: reason::INSURED_PARTY_CHANGE,
        priority: Priority::Medium,
        description: "Caller wants to include or exclude an insured person",
        applies: insured_party_change,
    },
    Rule {
        name: "bank_account_change",
        tier: Tier::General,
        category: category::POLICY_MODIFICATION,
        reason: reason::BANK_ACCOUNT_CHANGE,
        priority: Priority::Medium,
        description: "Caller wants to change the bank account for payments",
        applies: bank_account_change,
    },
    Rule {
        name: "contact_data_change",
        tier: Tier::General,
        category: category::POLICY_MODIFICATION,
        reason: reason::CONTACT_DATA_CHANGE,
        priority: Priority::Low,
        description: "Caller wants to update contact details",
        applies: contact_data_change,
    },
    Rule {
        name: "coverage_change",
        tier: Tier::General,
        category: category::POLICY_MODIFICATION,
        reason: reason::COVERAGE_CHANGE,
        priority: Priority::Medium,
        description: "Caller wants to change the policy coverage",
        applies: coverage_change,
    },
    Rule {
        name: "refund_request",
        tier: Tier::General,
        category: category::BILLING,
        reason: reason::REFUND_REQUEST,
        priority: Priority::Medium,
        description: "Caller requested a refund",
        applies: refund_request,
    },
    Rule {
        name: "unrecognized_charge",
        tier: Tier::General,
        category: category::BILLING,
        reason: reason::UNRECOGNIZED_CHARGE,
        priority: Priority::Medium,
        description: "Caller disputes a charge",
        applies: unrecognized_charge,
    },
    Rule {
        name: "claim_report",
        tier: Tier::General,
        category: category::CLAIMS_ASSISTANCE,
        reason: reason::CLAIM_REPORT,
        priority: Priority::High,
        description: "Caller is reporting a claim",
        applies: claim_report,
    },
    Rule {
        name: "claim_status",
        tier: Tier::General,
        category: category::CLAIMS_ASSISTANCE,
        reason: reason::CLAIM_STATUS,
        priority: Priority::Medium,
        description: "Caller asked about an open claim",
        applies: claim_status,
    },
    Rule {
        name: "cancellation",
        tier: Tier::General,
        category: category::CANCELLATION,
        reason: reason::CANCELLATION_REQUEST,
        priority: Priority::Medium,
        description: "Caller wants to cancel a policy",
        applies: cancellation,
    },
    Rule {
        name: "retention",
        tier: Tier::General,
        category: category::COMMERCIAL_HANDLING,
        reason: reason::RETENTION,
        priority: Priority::Medium,
        description: "Caller is price-shopping or considering another insurer",
        applies: retention,
    },
    Rule {
        name: "new_business",
        tier: Tier::General,
        category: category::NEW_BUSINESS,
        reason: reason::NEW_POLICY_QUOTE,
        priority: Priority::Medium,
        description: "Caller wants a quote for a new policy",
        applies: new_business,
    },
];

/// First level-1 rule that fires, if any.
pub fn level_one(signals: &Signals) -> Option<&'static Rule> {
    RULES
        .iter()
        .take_while(|r| r.tier == Tier::Override)
        .find(|r| (r.applies)(signals))
}

/// True for the reasons that must always stand alone on one ticket.
pub fn is_override_reason(reason_name: &str) -> bool {
    RULES
        .iter()
        .filter(|r| r.tier == Tier::Override)
        .any(|r| r.reason.eq_ignore_ascii_case(reason_name))
}

/// Matching rules after precedence, primary first.
pub fn select(signals: &Signals) -> Vec<&'static Rule> {
    if let Some(rule) = level_one(signals) {
        return vec![rule];
    }
    let matched: Vec<&'static Rule> = RULES
        .iter()
        .filter(|r| r.tier != Tier::Override && (r.applies)(signals))
        .collect();
    let has_transfer = matched.iter().any(|r| r.tier == Tier::MandatoryTransfer);
    let has_request = matched.iter().any(|r| r.tier != Tier::Inquiry);
    matched
        .into_iter()
        .filter(|r| {
            if r.tier != Tier::Inquiry {
                return true;
            }
            if has_transfer {
                return false;
            }
            r.reason != reason::RESOLVED_INQUIRY || !has_request
        })
        .collect()
}

/// Line of business named by the caller, for new-policy incidents.
pub fn line_of_business(signals: &Signals) -> Option<&'static str> {
    const TAGS: &[(&str, &[&str])] = &[
        ("auto", &["car", "vehicle", "motorbike", "motorcycle", "scooter", "van"]),
        ("home", &["home", "house", "apartment", "flat", "property"]),
        ("health", &["health", "medical", "dental"]),
        ("life", &["life insurance", "life policy"]),
        ("travel", &["travel", "trip", "holiday"]),
        ("pets", &["dog", "cat", "pet"]),
        ("business", &["business", "company", "shop", "store", "self-employed"]),
    ];
    TAGS.iter()
        .find(|(_, words)| {
            words
                .iter()
                .any(|w| if w.contains(' ') { signals.user.contains(w) } else { any_word(&signals.user, &[w]) })
        })
        .map(|(tag, _)| *tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(user: &str, agent: &str) -> Signals {
        Signals {
            user: user.to_lowercase(),
            agent: agent.to_lowercase(),
        }
    }

    fn reasons(s: &Signals) -> Vec<&'static str> {
        select(s).into_iter().map(|r| r.reason).collect()
    }

    #[test]
    fn override_tier_is_listed_first() {
        let tiers: Vec<Tier> = RULES.iter().map(|r| r.tier).collect();
        let mut sorted = tiers.clone();
        sorted.sort();
        assert_eq!(tiers, sorted);
    }

    #[test]
    fn rejection_of_automation_wins_over_everything() {
        let s = signals(
            "I need to change my bank account. I don't want to talk to a machine, put me through to a person",
            "",
        );
        assert_eq!(reasons(&s), vec![reason::REJECTS_AUTOMATION]);
    }

    #[test]
    fn mandatory_transfer_suppresses_inquiries() {
        let s = signals("I want to know how much I owe and I want to pay my bill", "");
        assert_eq!(reasons(&s), vec![reason::BILL_PAYMENT]);
    }

    #[test]
    fn payment_direction_decides_category() {
        let s = signals("I'd like to pay monthly instead of once a year", "");
        assert_eq!(reasons(&s), vec![reason::PAYMENT_FRACTIONATION]);
        let s = signals("Can I switch from monthly payments to annual ones?", "");
        assert_eq!(reasons(&s), vec![reason::PAYMENT_CONSOLIDATION]);
        assert_eq!(payment_direction("pay monthly instead of annually, or pay annually instead of monthly"), None);
    }

    #[test]
    fn agent_without_access_makes_the_inquiry_unresolved() {
        let s = signals("Could you tell me when my renewal is?", "Sorry, I cannot access that information.");
        assert_eq!(reasons(&s), vec![reason::UNRESOLVED_INQUIRY]);
        let s = signals("Could you tell me when my renewal is?", "It renews on the first of March.");
        assert_eq!(reasons(&s), vec![reason::RESOLVED_INQUIRY]);
    }

    #[test]
    fn resolved_inquiry_is_dropped_beside_a_real_request() {
        let s = signals("I want to know the price, and I lost my card", "Your card will be posted.");
        assert_eq!(reasons(&s), vec![reason::DUPLICATE_CARD]);
    }

    #[test]
    fn duplicate_card_ignores_agent_mailing_talk() {
        let s = signals(
            "I need a duplicate of my health card please",
            "Of course, we will send it by post to the mailing address we have on file.",
        );
        assert_eq!(reasons(&s), vec![reason::DUPLICATE_CARD]);
    }

    #[test]
    fn multiple_requests_keep_table_order() {
        let s = signals("I want to include my daughter on the policy and also get a refund", "");
        assert_eq!(reasons(&s), vec![reason::INSURED_PARTY_CHANGE, reason::REFUND_REQUEST]);
    }

    #[test]
    fn line_of_business_detection() {
        assert_eq!(line_of_business(&signals("a quote for my new car", "")), Some("auto"));
        assert_eq!(line_of_business(&signals("insure my dog", "")), Some("pets"));
        assert_eq!(line_of_business(&signals("something else", "")), None);
    }

    #[test]
    fn override_reasons_are_recognized() {
        assert!(is_override_reason(reason::THIRD_PARTY_CALLER));
        assert!(!is_override_reason(reason::DUPLICATE_CARD));
    }
}
