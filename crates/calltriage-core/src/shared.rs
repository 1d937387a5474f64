//! Shared configuration used across the call triage crates.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Completion-service mode when none is configured.
pub const DEFAULT_LLM_MODE: &str = "mock";

/// Global application configuration (gateway, collaborators, sanitizer budgets).
/// Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity shown by `/v1/status`.
    pub app_name: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Base directory for the sled record store.
    pub storage_path: String,

    /// Completion service mode ("mock" or "live").
    #[serde(default = "default_llm_mode")]
    pub llm_mode: String,
    /// OpenAI-compatible chat completions endpoint (live mode only).
    #[serde(default)]
    pub llm_api_url: Option<String>,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Base URL of the ticket backend. Empty or absent means the mock backend is used.
    #[serde(default)]
    pub ticket_backend_url: Option<String>,
    #[serde(default = "default_backend_timeout_secs")]
    pub ticket_backend_timeout_secs: u64,

    /// Prefix for `PREFIX-YYYYMMDD-NNN` ticket identifiers.
    #[serde(default = "default_ticket_prefix")]
    pub ticket_id_prefix: String,
    /// Prefix for freshly generated client identifiers.
    #[serde(default = "default_client_prefix")]
    pub client_id_prefix: String,

    #[serde(default)]
    pub limits: FieldLimits,

    /// Reason used when more than three distinct requests are detected in one call.
    #[serde(default = "default_folded_reason")]
    pub folded_incident_reason: String,
    /// How far back prior tickets count as candidates for a follow-up.
    #[serde(default = "default_follow_up_window_days")]
    pub follow_up_window_days: i64,
}

/// Character budgets imposed by the ticket backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldLimits {
    #[serde(default = "default_policy_max")]
    pub policy_number_max_len: usize,
    #[serde(default = "default_notes_max")]
    pub notes_max_len: usize,
    #[serde(default = "default_text_max")]
    pub text_field_max_len: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            policy_number_max_len: default_policy_max(),
            notes_max_len: default_notes_max(),
            text_field_max_len: default_text_max(),
        }
    }
}

fn default_llm_mode() -> String {
    DEFAULT_LLM_MODE.to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_backend_timeout_secs() -> u64 {
    15
}
fn default_ticket_prefix() -> String {
    "TKT".to_string()
}
fn default_client_prefix() -> String {
    "CLI".to_string()
}
fn default_folded_reason() -> String {
    "Multiple pending requests".to_string()
}
fn default_follow_up_window_days() -> i64 {
    30
}
fn default_policy_max() -> usize {
    50
}
fn default_notes_max() -> usize {
    500
}
fn default_text_max() -> usize {
    255
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_name: "Call Triage Gateway".to_string(),
            port: 8011,
            storage_path: "./data".to_string(),
            llm_mode: default_llm_mode(),
            llm_api_url: None,
            llm_api_key: None,
            llm_model: None,
            llm_timeout_secs: default_llm_timeout_secs(),
            ticket_backend_url: None,
            ticket_backend_timeout_secs: default_backend_timeout_secs(),
            ticket_id_prefix: default_ticket_prefix(),
            client_id_prefix: default_client_prefix(),
            limits: FieldLimits::default(),
            folded_incident_reason: default_folded_reason(),
            follow_up_window_days: default_follow_up_window_days(),
        }
    }
}

impl CoreConfig {
    /// Ticket backend URL when one is configured (non-empty).
    pub fn ticket_backend_url(&self) -> Option<&str> {
        self.ticket_backend_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Load config from file and environment.
    /// Precedence: env `CALLTRIAGE_*` > file at `CALLTRIAGE_CONFIG` (or `config/calltriage.toml`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("CALLTRIAGE_CONFIG")
            .unwrap_or_else(|_| "config/calltriage.toml".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "Call Triage Gateway")?
            .set_default("port", 8011_i64)?
            .set_default("storage_path", "./data")?
            .set_default("llm_mode", DEFAULT_LLM_MODE)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("CALLTRIAGE").separator("__"))
            .build()?;

        built.try_deserialize()
    }
}
