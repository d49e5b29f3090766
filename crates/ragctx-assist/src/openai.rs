//! OpenAI-compatible chat completions client.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use ragctx_core::config::GenerationSettings;
use ragctx_core::{Error, Result};

use crate::generation::{GenerationRequest, Generator, ResponseFormat};

pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    default_temperature: f32,
}

impl OpenAiChatClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(Error::backend)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            default_temperature: GenerationSettings::default().temperature,
        })
    }

    /// Reads the API key from the environment variable named in the settings.
    /// An empty `api_key_env` means the endpoint needs no key.
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self> {
        let api_key = if settings.api_key_env.is_empty() {
            None
        } else {
            Some(std::env::var(&settings.api_key_env).map_err(|_| {
                Error::InvalidConfig(format!("{} not set", settings.api_key_env))
            })?)
        };
        let mut client = Self::new(&settings.base_url, &settings.model, api_key, Duration::from_secs(settings.timeout_secs))?;
        client.default_temperature = settings.temperature;
        Ok(client)
    }

    pub fn model(&self) -> &str { &self.model }

    fn body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature.unwrap_or(self.default_temperature),
        });
        if request.format == ResponseFormat::JsonObject {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

#[derive(Deserialize)]
struct Envelope {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Extracts the first choice's content from a chat completions response body.
pub fn extract_content(raw: &str) -> Result<String> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(|e| Error::parse(format!("malformed completion envelope: {e}"), raw))?;
    envelope
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::parse("completion has no message content", raw))
}

#[async_trait]
impl Generator for OpenAiChatClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut call = self.client.post(&url).json(&self.body(request));
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let response = call.send().await.map_err(|e| Error::backend(format!("chat completion request failed: {e}")))?;
        let status = response.status();
        let raw = response.text().await.map_err(|e| Error::backend(format!("reading completion body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::backend(format!("chat completion error {status}: {raw}")));
        }
        debug!(model = %self.model, bytes = raw.len(), "completion received");
        extract_content(&raw)
    }
}
