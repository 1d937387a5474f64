//! Model Router: sends the classification prompt to a mock or live LLM and returns the generated text.

use calltriage_core::{CompletionError, CompletionService, CoreConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const ERROR_BODY_PREVIEW: usize = 500;

/// Mode for LLM invocation: mock (returns simulated generation) or live (OpenAI-compatible API).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LlmMode {
    #[default]
    Mock,
    Live,
}

impl LlmMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "live" => LlmMode::Live,
            _ => LlmMode::Mock,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LlmMode::Mock => "mock",
            LlmMode::Live => "live",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Routes a prompt to a mock generator or a live chat-completions endpoint.
pub struct ModelRouter {
    mode: LlmMode,
    api_url: Option<String>,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl ModelRouter {
    pub fn from_config(config: &CoreConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            mode: LlmMode::parse(&config.llm_mode),
            api_url: config.llm_api_url.clone().filter(|u| !u.trim().is_empty()),
            api_key: config.llm_api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config
                .llm_model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client,
        }
    }

    pub fn with_mode(mode: LlmMode) -> Self {
        let mut router = Self::from_config(&CoreConfig::default());
        router.mode = mode;
        router
    }

    pub fn mode(&self) -> LlmMode {
        self.mode
    }

    /// Mock LLM: a deterministic prose reply with no JSON in it, so callers exercise
    /// their fallback path.
    fn mock_generate(&self, prompt: &str) -> String {
        let transcript = prompt.rsplit("## Transcript").next().unwrap_or(prompt).trim();
        let preview: String = transcript
            .chars()
            .filter(|c| !matches!(c, '{' | '}'))
            .take(80)
            .collect();
        let ellipsis = if transcript.chars().count() > 80 { "..." } else { "" };
        format!(
            "[Generated - Mock LLM]\n\nI reviewed the call ({}{}). A live model is not configured, so no structured classification is available for this transcript.",
            preview, ellipsis
        )
    }

    async fn live_generate(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = self
            .api_url
            .as_deref()
            .ok_or_else(|| CompletionError::NotConfigured("llm_api_url is not set".to_string()))?;
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a contact-centre call classifier. Reply with a single JSON object.",
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
        };

        let mut request = self.client.post(url).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::Timeout
            } else {
                CompletionError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_PREVIEW).collect(),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CompletionError::InvalidResponse("no content in first choice".to_string()))
    }
}

#[async_trait::async_trait]
impl CompletionService for ModelRouter {
    fn name(&self) -> &str {
        self.mode.label()
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        tracing::debug!(
            target: "calltriage::llm",
            mode = self.mode.label(),
            model = %self.model,
            prompt_len = prompt.len(),
            "completion requested"
        );
        let result = match self.mode {
            LlmMode::Mock => Ok(self.mock_generate(prompt)),
            LlmMode::Live => self.live_generate(prompt).await,
        };
        match &result {
            Ok(text) => tracing::debug!(target: "calltriage::llm", reply_len = text.len(), "completion received"),
            Err(e) => tracing::warn!(target: "calltriage::llm", error = %e, "completion failed"),
        }
        result
    }
}
