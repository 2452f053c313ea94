use std::env;
use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde_json::Value;
use tracing::debug;

use crate::error::DetectError;
use crate::request::ClassificationRequest;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// Boundary to the external vision model. Exactly one outbound call per
/// invocation; failures are terminal for the current capture, never retried.
pub trait VisionGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the model's raw answer text, still untrusted.
    fn classify(&self, request: &ClassificationRequest) -> Result<String, DetectError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: non_empty_env("BINSIGHT_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: non_empty_env("BINSIGHT_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(
                non_empty_env("BINSIGHT_GATEWAY_TIMEOUT_SECS")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Gateway for any chat-completions-compatible vision endpoint. The bearer
/// credential is read from the server environment and never reaches the
/// capturing client.
pub struct OpenAiCompatGateway {
    api_base: String,
    http: HttpClient,
}

impl OpenAiCompatGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, DetectError> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| DetectError::Transport(format!("http client init failed: {err}")))?;
        Ok(Self {
            api_base: config.api_base.clone(),
            http,
        })
    }

    fn api_key() -> Option<String> {
        non_empty_env("BINSIGHT_API_KEY").or_else(|| non_empty_env("OPENAI_API_KEY"))
    }

    fn completions_endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn extract_answer_text(payload: &Value) -> Result<String, DetectError> {
        payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                DetectError::MalformedResponse("answer text missing from response".to_string())
            })
    }
}

impl VisionGateway for OpenAiCompatGateway {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn classify(&self, request: &ClassificationRequest) -> Result<String, DetectError> {
        let api_key = Self::api_key().ok_or(DetectError::MissingCredential)?;
        let endpoint = self.completions_endpoint();

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&request.payload())
            .send()
            .map_err(|err| DetectError::Transport(format!("request failed ({endpoint}): {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| DetectError::Transport(format!("response body read failed: {err}")))?;
        if !status.is_success() {
            return Err(DetectError::Transport(format!(
                "vision model returned {}: {}",
                status.as_u16(),
                truncate_text(&body, 512)
            )));
        }

        let payload: Value = serde_json::from_str(&body).map_err(|err| {
            DetectError::Transport(format!("vision model returned invalid JSON envelope: {err}"))
        })?;
        let answer = Self::extract_answer_text(&payload)?;
        debug!(model = request.model(), answer_len = answer.len(), "vision answer received");
        Ok(answer)
    }
}

/// Offline stand-in that answers every capture with a canned, fenced reply.
/// The fencing is deliberate so the dry-run path exercises the same
/// tolerance the real parser needs.
pub struct DryrunGateway;

impl VisionGateway for DryrunGateway {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn classify(&self, _request: &ClassificationRequest) -> Result<String, DetectError> {
        Ok("```json\n{\"item\": \"Smartphone\", \"category\": \"electronic\", \
            \"confidence\": 0.91, \"value\": 12.5, \
            \"message\": \"Touchscreen slab with visible charging port.\"}\n```"
            .to_string())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
