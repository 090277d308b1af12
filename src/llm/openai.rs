use super::{Completion, CompletionRequest, GenerationError, TextGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 2000;

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_keys: Vec<String>,
    pub models: Vec<String>,
    pub api_base: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Picks the (key, model) pair for a call. An explicit index must be in range
/// of the key list; without one the key rotates on the current unix second.
/// Models parallel keys, falling back to the first model.
pub fn select_provider<'a>(
    api_keys: &'a [String],
    models: &'a [String],
    provider_index: Option<i64>,
    unix_seconds: i64,
) -> Result<(&'a str, &'a str), GenerationError> {
    if api_keys.is_empty() {
        return Err(GenerationError::Configuration("OPENAI_API_KEY(S) not configured".to_string()));
    }

    let index = match provider_index {
        Some(index) if index < 0 || index as usize >= api_keys.len() => {
            return Err(GenerationError::Configuration(format!(
                "provider_index {} out of range for {} configured keys",
                index,
                api_keys.len()
            )));
        }
        Some(index) => index as usize,
        None => unix_seconds.rem_euclid(api_keys.len() as i64) as usize,
    };

    let model = models
        .get(index)
        .or_else(|| models.first())
        .map(String::as_str)
        .unwrap_or(DEFAULT_MODEL);
    Ok((api_keys[index].as_str(), model))
}

pub struct OpenAiClient {
    http: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| GenerationError::Configuration(e.to_string()))?;
        Ok(Self { http, settings })
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GenerationError> {
        let (api_key, model) = select_provider(
            &self.settings.api_keys,
            &self.settings.models,
            request.provider_index,
            chrono::Utc::now().timestamp(),
        )?;

        let context_message = request
            .context
            .as_deref()
            .map(|context| format!("Context and source materials:\n{}", context));

        let mut messages = vec![ChatMessage { role: "system", content: &request.system_prompt }];
        if let Some(context) = context_message.as_deref() {
            messages.push(ChatMessage { role: "system", content: context });
        }
        messages.push(ChatMessage { role: "user", content: &request.prompt });

        let body = ChatRequest { model, messages, temperature: TEMPERATURE, max_tokens: MAX_TOKENS };
        let url = format!("{}/chat/completions", self.settings.api_base.trim_end_matches('/'));

        log::info!("Calling chat completions with model {} (prompt {} chars)", model, request.prompt.len());

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.settings.request_timeout_secs)
                } else {
                    GenerationError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Chat completions returned HTTP {}", status.as_u16());
            return Err(GenerationError::Provider { status: status.as_u16(), body });
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(format!("Unexpected provider response: {}", e)))?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Parse("Unexpected provider response: no choices".to_string()))?;

        log::info!("Chat completions response received ({} chars)", text.len());
        Ok(Completion { text, provider: "openai".to_string() })
    }
}
