use super::http::{JsonClient, join_text_blocks};
use super::{BackendSettings, CompletionBackend, ImagePayload, Provider};
use crate::error::{BackendError, Result};
use serde_json::{Value, json};

/// OpenAI chat completions, and every server that speaks the same dialect (OpenRouter, Ollama,
/// LM Studio).
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleBackend {
    http: JsonClient,
    provider: Provider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl OpenAiCompatibleBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let base = settings.resolved_base_url()?;
        Ok(Self {
            http: JsonClient::new(settings.provider.as_str(), settings.timeout)?,
            provider: settings.provider,
            endpoint: format!("{base}/chat/completions"),
            model: settings.model.clone(),
            api_key: settings.resolved_api_key(),
            max_tokens: settings.max_tokens,
        })
    }

    fn complete(&self, content: Value) -> std::result::Result<String, BackendError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": content }],
        });
        let response = self
            .http
            .post(&self.endpoint, &[], self.api_key.as_deref(), &body)?;
        self.http.non_empty(response_text(&response))
    }
}

/// `choices[0].message.content` is either a string or an array of text parts.
fn response_text(response: &Value) -> String {
    let content = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"));
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(other @ Value::Array(_)) => join_text_blocks(Some(other)),
        _ => String::new(),
    }
}

impl CompletionBackend for OpenAiCompatibleBackend {
    fn id(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }

    fn vision_complete(
        &self,
        image: &ImagePayload<'_>,
        prompt: &str,
    ) -> std::result::Result<String, BackendError> {
        self.complete(json!([
            { "type": "image_url", "image_url": { "url": image.data_url() } },
            { "type": "text", "text": prompt },
        ]))
    }

    fn text_complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        self.complete(Value::String(prompt.to_string()))
    }
}
