use super::http::JsonClient;
use super::{BackendSettings, CompletionBackend, ImagePayload};
use crate::error::{BackendError, Result};
use serde_json::{Value, json};

/// Google Gemini `generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    http: JsonClient,
    base: String,
    model: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        Ok(Self {
            http: JsonClient::new("google", settings.timeout)?,
            base: settings.resolved_base_url()?,
            model: settings.model.clone(),
            api_key: settings.resolved_api_key().unwrap_or_default(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base,
            self.model.trim_start_matches("models/")
        )
    }

    fn complete(&self, parts: Value) -> std::result::Result<String, BackendError> {
        let body = json!({ "contents": [{ "role": "user", "parts": parts }] });
        let response = self.http.post(
            &self.endpoint(),
            &[("x-goog-api-key", self.api_key.as_str())],
            None,
            &body,
        )?;
        self.http.non_empty(response_text(&response))
    }
}

fn response_text(response: &Value) -> String {
    let Some(parts) = response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
    else {
        return String::new();
    };
    parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

impl CompletionBackend for GeminiBackend {
    fn id(&self) -> String {
        format!("google/{}", self.model)
    }

    fn vision_complete(
        &self,
        image: &ImagePayload<'_>,
        prompt: &str,
    ) -> std::result::Result<String, BackendError> {
        self.complete(json!([
            { "inline_data": { "mime_type": image.media_type, "data": image.base64() } },
            { "text": prompt },
        ]))
    }

    fn text_complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        self.complete(json!([{ "text": prompt }]))
    }
}
