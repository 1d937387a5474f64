//! The Decision record: the classifier's sole output.
//!
//! Model responses arrive as an untyped `serde_json::Value`. [`Decision::from_model_value`]
//! walks that tree field by field, coercing enums and numbers to known values and
//! rejecting structurally invalid shapes so the caller can fall back to heuristics.

use crate::error::ClassificationError;
use crate::taxonomy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound on `secondary_incidents`.
pub const MAX_SECONDARY_INCIDENTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Existing,
    Lead,
    New,
    #[default]
    Unknown,
}

impl ClientType {
    fn coerce(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("existing") | Some("existing_client") | Some("client") => Self::Existing,
            Some("lead") => Self::Lead,
            Some("new") | Some("new_client") => Self::New,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    #[default]
    Extracted,
    BackendLookup,
    Lead,
    Mixed,
}

impl DataSource {
    fn coerce(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase().replace([' ', '-'], "_")).as_deref() {
            Some("backend_lookup") | Some("backend") | Some("lookup") => Self::BackendLookup,
            Some("lead") => Self::Lead,
            Some("mixed") => Self::Mixed,
            _ => Self::Extracted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    fn coerce(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("low") => Self::Low,
            Some("high") | Some("urgent") | Some("critical") => Self::High,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingClientRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub policy_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRef {
    pub id: String,
    #[serde(default)]
    pub campaign: Option<String>,
    #[serde(default)]
    pub line_of_business: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(rename = "type")]
    pub client_type: ClientType,
    #[serde(default)]
    pub extracted_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub existing_client_ref: Option<ExistingClientRef>,
    #[serde(default)]
    pub lead_ref: Option<LeadRef>,
}

/// A single customer request drawn from the taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub category: String,
    pub reason: String,
    #[serde(default)]
    pub line_of_business: Option<String>,
    #[serde(default)]
    pub description: String,
    pub confidence: f64,
    #[serde(default)]
    pub affected_policy_number: Option<String>,
}

impl Incident {
    pub fn new(category: &str, reason: &str, description: impl Into<String>, confidence: f64) -> Self {
        Self {
            category: category.to_string(),
            reason: reason.to_string(),
            line_of_business: None,
            description: description.into(),
            confidence: clamp_unit(confidence),
            affected_policy_number: None,
        }
    }

    fn same_kind(&self, other: &Incident) -> bool {
        self.category.eq_ignore_ascii_case(&other.category) && self.reason.eq_ignore_ascii_case(&other.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub is_follow_up: bool,
    #[serde(default)]
    pub related_ticket_id: Option<String>,
    pub create_new_ticket: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Default for FollowUp {
    fn default() -> Self {
        Self {
            is_follow_up: false,
            related_ticket_id: None,
            create_new_ticket: true,
            reason: None,
        }
    }
}

impl FollowUp {
    /// True when the executor should log a follow-up instead of opening a ticket.
    pub fn should_log(&self) -> bool {
        !self.create_new_ticket && self.related_ticket_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientDecision {
    pub create_client: bool,
    pub use_existing: bool,
    pub use_lead: bool,
    pub data_source: DataSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Primary,
    Secondary,
}

/// Points a ticket entry at the primary incident or one secondary incident.
/// Serialized as `"primary"` or `"secondary_<n>"` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IncidentRef {
    Primary,
    /// Zero-based index into `secondary_incidents`.
    Secondary(usize),
}

impl IncidentRef {
    pub fn kind(&self) -> TicketKind {
        match self {
            IncidentRef::Primary => TicketKind::Primary,
            IncidentRef::Secondary(_) => TicketKind::Secondary,
        }
    }

    /// Lenient parse: `primary`, `secondary_1`, `secondary:1`, `secondary 1`, `secondary` (= first).
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        if lowered == "primary" || lowered == "primary_incident" {
            return Some(IncidentRef::Primary);
        }
        let rest = lowered
            .strip_prefix("secondary_incidents")
            .or_else(|| lowered.strip_prefix("secondary"))?;
        let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Some(IncidentRef::Secondary(0));
        }
        let n: usize = digits.parse().ok()?;
        // Bracketed forms (`secondary_incidents[0]`) are zero-based, the rest one-based.
        if rest.contains('[') {
            Some(IncidentRef::Secondary(n))
        } else {
            Some(IncidentRef::Secondary(n.checked_sub(1)?))
        }
    }
}

impl fmt::Display for IncidentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentRef::Primary => f.write_str("primary"),
            IncidentRef::Secondary(i) => write!(f, "secondary_{}", i + 1),
        }
    }
}

impl From<IncidentRef> for String {
    fn from(r: IncidentRef) -> Self {
        r.to_string()
    }
}

impl TryFrom<String> for IncidentRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        IncidentRef::parse(&value).ok_or_else(|| format!("invalid incident reference '{}'", value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketEntry {
    pub kind: TicketKind,
    pub incident_ref: IncidentRef,
    /// Explicit client id; `None` means "whichever client the executor resolves".
    #[serde(default)]
    pub client_id_to_use: Option<String>,
    #[serde(default)]
    pub policy_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketDecision {
    pub create_tickets: bool,
    pub count: usize,
    #[serde(default)]
    pub entries: Vec<TicketEntry>,
}

impl Default for TicketDecision {
    fn default() -> Self {
        Self {
            create_tickets: true,
            count: 0,
            entries: Vec::new(),
        }
    }
}

/// Structured classification of one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub client: ClientInfo,
    pub primary_incident: Incident,
    #[serde(default)]
    pub secondary_incidents: Vec<Incident>,
    #[serde(default)]
    pub follow_up: FollowUp,
    #[serde(default)]
    pub client_decision: ClientDecision,
    #[serde(default)]
    pub ticket_decision: TicketDecision,
    #[serde(default)]
    pub priority: Priority,
    pub confidence: f64,
    #[serde(default)]
    pub notes_for_ticket: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Which classifier path produced a Decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPath {
    Model,
    Heuristic,
}

/// Knobs applied while normalizing.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions<'a> {
    /// Reason given to the incident that absorbs a 4th+ distinct request.
    pub folded_reason: &'a str,
}

impl Default for NormalizeOptions<'_> {
    fn default() -> Self {
        Self {
            folded_reason: "Multiple pending requests",
        }
    }
}

impl Decision {
    /// Resolves an incident reference.
    pub fn incident(&self, r: IncidentRef) -> Option<&Incident> {
        match r {
            IncidentRef::Primary => Some(&self.primary_incident),
            IncidentRef::Secondary(i) => self.secondary_incidents.get(i),
        }
    }

    /// Primary followed by secondaries, paired with their references.
    pub fn incidents(&self) -> impl Iterator<Item = (IncidentRef, &Incident)> {
        std::iter::once((IncidentRef::Primary, &self.primary_incident)).chain(
            self.secondary_incidents
                .iter()
                .enumerate()
                .map(|(i, inc)| (IncidentRef::Secondary(i), inc)),
        )
    }

    /// Checks `count == len(entries)` and that every reference resolves.
    pub fn is_consistent(&self) -> bool {
        self.ticket_decision.count == self.ticket_decision.entries.len()
            && self
                .ticket_decision
                .entries
                .iter()
                .all(|e| self.incident(e.incident_ref).is_some())
            && self.secondary_incidents.len() <= MAX_SECONDARY_INCIDENTS
    }

    /// Replaces every incident with `incident` and plans exactly one ticket for it.
    pub fn collapse_to(&mut self, incident: Incident, warning: impl Into<String>) {
        self.primary_incident = incident;
        self.secondary_incidents.clear();
        self.follow_up = FollowUp::default();
        self.ticket_decision = TicketDecision {
            create_tickets: true,
            count: 0,
            entries: Vec::new(),
        };
        self.plan_tickets(1);
        self.warnings.push(warning.into());
    }

    /// Caps secondaries at [`MAX_SECONDARY_INCIDENTS`], folding the excess into one
    /// generic incident, and drops duplicates of the primary.
    pub fn fold_secondaries(&mut self, folded_reason: &str) {
        let primary = self.primary_incident.clone();
        let mut distinct: Vec<Incident> = Vec::new();
        for inc in self.secondary_incidents.drain(..) {
            if inc.same_kind(&primary) || distinct.iter().any(|d| d.same_kind(&inc)) {
                continue;
            }
            distinct.push(inc);
        }
        if distinct.len() > MAX_SECONDARY_INCIDENTS {
            let overflow: Vec<Incident> = distinct.split_off(MAX_SECONDARY_INCIDENTS - 1);
            let listed = overflow
                .iter()
                .map(|i| format!("{} ({})", i.reason, i.category))
                .collect::<Vec<_>>()
                .join("; ");
            let confidence = overflow.iter().map(|i| i.confidence).fold(1.0_f64, f64::min);
            let folded = Incident::new(
                taxonomy::category::HUMAN_HANDOFF,
                folded_reason,
                format!("Additional requests in the same call: {}", listed),
                confidence,
            );
            distinct.push(folded);
            self.warnings.push(format!(
                "{} additional requests folded into '{}'",
                overflow.len(),
                folded_reason
            ));
        }
        self.secondary_incidents = distinct;
    }

    /// Plans exactly one ticket per incident, primary first.
    pub fn plan_ticket_per_incident(&mut self) {
        self.ticket_decision = TicketDecision::default();
        self.plan_tickets(1 + self.secondary_incidents.len());
    }

    /// Plans no tickets; used when the call only continues an existing ticket.
    pub fn plan_no_tickets(&mut self) {
        self.ticket_decision = TicketDecision {
            create_tickets: false,
            count: 0,
            entries: Vec::new(),
        };
    }

    /// Builds ticket entries for the first `count` incidents not yet referenced and
    /// makes `count` agree with the entries.
    fn plan_tickets(&mut self, count: usize) {
        let referenced: Vec<IncidentRef> = self.ticket_decision.entries.iter().map(|e| e.incident_ref).collect();
        let missing: Vec<TicketEntry> = self
            .incidents()
            .filter(|(r, _)| !referenced.contains(r))
            .map(|(r, inc)| TicketEntry {
                kind: r.kind(),
                incident_ref: r,
                client_id_to_use: None,
                policy_number: inc.affected_policy_number.clone(),
            })
            .take(count.saturating_sub(referenced.len()))
            .collect();
        self.ticket_decision.entries.extend(missing);
        self.ticket_decision.count = self.ticket_decision.entries.len();
    }

    /// Validates and coerces a model response into a Decision.
    pub fn from_model_value(value: &Value, opts: NormalizeOptions<'_>) -> Result<Self, ClassificationError> {
        let root = value
            .as_object()
            .ok_or_else(|| ClassificationError::InvalidStructure("response root is not an object".into()))?;
        let mut warnings: Vec<String> = string_list(root.get("warnings"));

        let primary_obj = root
            .get("primary_incident")
            .and_then(Value::as_object)
            .ok_or_else(|| ClassificationError::InvalidStructure("primary_incident missing".into()))?;
        let primary_incident = parse_incident(primary_obj, &mut warnings)
            .ok_or_else(|| ClassificationError::InvalidStructure("primary_incident lacks category or reason".into()))?;

        let mut secondary_incidents = Vec::new();
        match root.get("secondary_incidents") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    match item.as_object().and_then(|o| parse_incident(o, &mut warnings)) {
                        Some(inc) => secondary_incidents.push(inc),
                        None => warnings.push("dropped malformed secondary incident".to_string()),
                    }
                }
            }
            Some(_) => {
                return Err(ClassificationError::InvalidStructure(
                    "secondary_incidents is not an array".into(),
                ))
            }
        }

        let client = parse_client(root.get("client"));
        let follow_up = parse_follow_up(root.get("follow_up"), &mut warnings);
        let client_decision = parse_client_decision(root.get("client_decision"), &client);

        let mut decision = Decision {
            client,
            primary_incident,
            secondary_incidents,
            follow_up,
            client_decision,
            ticket_decision: TicketDecision::default(),
            priority: Priority::coerce(root.get("priority").and_then(Value::as_str)),
            confidence: f64_field(root, "confidence").map(clamp_unit).unwrap_or(0.5),
            notes_for_ticket: str_field(root, "notes_for_ticket"),
            warnings,
        };
        decision.fold_secondaries(opts.folded_reason);
        decision.ticket_decision = parse_ticket_decision(root.get("ticket_decision"), &mut decision);
        Ok(decision)
    }
}

fn parse_incident(obj: &Map<String, Value>, warnings: &mut Vec<String>) -> Option<Incident> {
    let raw_category = str_field(obj, "category")?;
    let raw_reason = str_field(obj, "reason")?;
    let category = match taxonomy::canonical_category(&raw_category) {
        Some(c) => c.to_string(),
        None => {
            warnings.push(format!("category '{}' is outside the taxonomy", raw_category));
            raw_category
        }
    };
    let reason = taxonomy::canonical_reason(&category, &raw_reason)
        .map(str::to_string)
        .unwrap_or(raw_reason);
    let line_of_business = str_field(obj, "line_of_business").map(|lob| {
        taxonomy::canonical_line_of_business(&lob)
            .map(str::to_string)
            .unwrap_or(lob)
    });
    Some(Incident {
        category,
        reason,
        line_of_business,
        description: str_field(obj, "description").unwrap_or_default(),
        confidence: f64_field(obj, "confidence").map(clamp_unit).unwrap_or(0.5),
        affected_policy_number: str_field(obj, "affected_policy_number"),
    })
}

fn parse_client(value: Option<&Value>) -> ClientInfo {
    let Some(obj) = value.and_then(Value::as_object) else {
        return ClientInfo::default();
    };
    let extracted_fields = obj
        .get("extracted_fields")
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(k, v)| scalar_string(v).map(|s| (k.clone(), s)))
                .collect()
        })
        .unwrap_or_default();
    let existing_client_ref = obj
        .get("existing_client_ref")
        .and_then(Value::as_object)
        .and_then(|r| {
            Some(ExistingClientRef {
                id: str_field(r, "id")?,
                name: str_field(r, "name").unwrap_or_default(),
                policy_number: str_field(r, "policy_number"),
            })
        });
    let lead_ref = obj.get("lead_ref").and_then(Value::as_object).and_then(|r| {
        Some(LeadRef {
            id: str_field(r, "id")?,
            campaign: str_field(r, "campaign"),
            line_of_business: str_field(r, "line_of_business"),
        })
    });
    ClientInfo {
        client_type: ClientType::coerce(obj.get("type").and_then(Value::as_str)),
        extracted_fields,
        existing_client_ref,
        lead_ref,
    }
}

fn parse_follow_up(value: Option<&Value>, warnings: &mut Vec<String>) -> FollowUp {
    let Some(obj) = value.and_then(Value::as_object) else {
        return FollowUp::default();
    };
    let mut follow_up = FollowUp {
        is_follow_up: bool_field(obj, "is_follow_up").unwrap_or(false),
        related_ticket_id: str_field(obj, "related_ticket_id"),
        create_new_ticket: bool_field(obj, "create_new_ticket").unwrap_or(true),
        reason: str_field(obj, "reason"),
    };
    if !follow_up.create_new_ticket && (!follow_up.is_follow_up || follow_up.related_ticket_id.is_none()) {
        warnings.push("follow-up without a related ticket; a new ticket will be created".to_string());
        follow_up.create_new_ticket = true;
    }
    follow_up
}

fn parse_client_decision(value: Option<&Value>, client: &ClientInfo) -> ClientDecision {
    let obj = value.and_then(Value::as_object);
    let flag = |key: &str| obj.and_then(|o| bool_field(o, key));
    let has_existing = client.existing_client_ref.is_some();
    ClientDecision {
        create_client: flag("create_client")
            .unwrap_or(!has_existing && matches!(client.client_type, ClientType::New | ClientType::Lead)),
        use_existing: flag("use_existing").unwrap_or(has_existing),
        use_lead: flag("use_lead").unwrap_or(client.lead_ref.is_some()),
        data_source: DataSource::coerce(obj.and_then(|o| o.get("data_source")).and_then(Value::as_str)),
    }
}

fn parse_ticket_decision(value: Option<&Value>, decision: &mut Decision) -> TicketDecision {
    let obj = value.and_then(Value::as_object);
    let create_tickets = obj
        .and_then(|o| bool_field(o, "create_tickets"))
        .unwrap_or(decision.follow_up.create_new_ticket);
    if !create_tickets {
        return TicketDecision {
            create_tickets: false,
            count: 0,
            entries: Vec::new(),
        };
    }

    let provided_count = obj.and_then(|o| f64_field(o, "count")).map(|c| c.max(0.0) as usize);
    let mut entries: Vec<TicketEntry> = Vec::new();
    if let Some(items) = obj.and_then(|o| o.get("entries")).and_then(Value::as_array) {
        for item in items {
            let Some(entry_obj) = item.as_object() else {
                decision.warnings.push("dropped malformed ticket entry".to_string());
                continue;
            };
            let kind_hint = str_field(entry_obj, "kind").map(|k| k.to_lowercase());
            let incident_ref = str_field(entry_obj, "incident_ref")
                .and_then(|r| IncidentRef::parse(&r))
                .or_else(|| match kind_hint.as_deref() {
                    Some("primary") => Some(IncidentRef::Primary),
                    _ => None,
                });
            let Some(incident_ref) = incident_ref.filter(|r| decision.incident(*r).is_some()) else {
                decision
                    .warnings
                    .push("dropped ticket entry with unresolvable incident reference".to_string());
                continue;
            };
            if entries.iter().any(|e: &TicketEntry| e.incident_ref == incident_ref) {
                continue;
            }
            let policy_number = str_field(entry_obj, "policy_number").or_else(|| {
                decision
                    .incident(incident_ref)
                    .and_then(|i| i.affected_policy_number.clone())
            });
            entries.push(TicketEntry {
                kind: incident_ref.kind(),
                incident_ref,
                client_id_to_use: str_field(entry_obj, "client_id_to_use").filter(|id| !is_placeholder_client_id(id)),
                policy_number,
            });
        }
    }

    let wanted = provided_count.unwrap_or(entries.len()).max(1);
    if let Some(c) = provided_count {
        if c != 0 && c < entries.len() {
            decision.warnings.push(format!(
                "ticket count {} disagrees with {} entries; using entries",
                c,
                entries.len()
            ));
        }
    }
    decision.ticket_decision = TicketDecision {
        create_tickets: true,
        count: entries.len(),
        entries,
    };
    let target = wanted.max(decision.ticket_decision.entries.len());
    decision.plan_tickets(target);
    std::mem::take(&mut decision.ticket_decision)
}

fn is_placeholder_client_id(id: &str) -> bool {
    let lowered = id.trim().to_lowercase();
    lowered.is_empty()
        || lowered == "new"
        || lowered == "new_client"
        || lowered == "null"
        || lowered == "none"
        || lowered.starts_with("<")
}

/// Clamps to `[0, 1]`; NaN becomes 0.
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(scalar_string)
}

fn f64_field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(scalar_string).collect())
        .unwrap_or_default()
}
