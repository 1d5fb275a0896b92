use super::http::{JsonClient, join_text_blocks};
use super::{BackendSettings, CompletionBackend, ImagePayload};
use crate::error::{BackendError, Result};
use serde_json::{Value, json};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    http: JsonClient,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let base = settings.resolved_base_url()?;
        let base = base.trim_end_matches("/v1");
        Ok(Self {
            http: JsonClient::new("anthropic", settings.timeout)?,
            endpoint: format!("{base}/v1/messages"),
            model: settings.model.clone(),
            api_key: settings.resolved_api_key().unwrap_or_default(),
            max_tokens: settings.max_tokens,
        })
    }

    fn complete(&self, content: Value) -> std::result::Result<String, BackendError> {
        let body = request_body(&self.model, self.max_tokens, content);
        let response = self.http.post(
            &self.endpoint,
            &[
                ("x-api-key", self.api_key.as_str()),
                ("anthropic-version", ANTHROPIC_VERSION),
            ],
            None,
            &body,
        )?;
        self.http.non_empty(response_text(&response))
    }
}

fn request_body(model: &str, max_tokens: u32, content: Value) -> Value {
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": [{ "role": "user", "content": content }],
    })
}

fn response_text(response: &Value) -> String {
    join_text_blocks(response.get("content"))
}

impl CompletionBackend for AnthropicBackend {
    fn id(&self) -> String {
        format!("anthropic/{}", self.model)
    }

    fn vision_complete(
        &self,
        image: &ImagePayload<'_>,
        prompt: &str,
    ) -> std::result::Result<String, BackendError> {
        self.complete(json!([
            {
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.media_type,
                    "data": image.base64(),
                },
            },
            { "type": "text", "text": prompt },
        ]))
    }

    fn text_complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        self.complete(json!([{ "type": "text", "text": prompt }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Provider;

    #[test]
    fn endpoint_does_not_double_the_version_segment() {
        let mut settings = BackendSettings::new(Provider::Anthropic, "claude-test");
        settings.api_key = Some("k".to_string());
        settings.base_url = Some("https://proxy.example/v1".to_string());
        let backend = AnthropicBackend::new(&settings).unwrap();
        assert_eq!(backend.endpoint, "https://proxy.example/v1/messages");
    }

    #[test]
    fn extracts_text_from_message_response() {
        let response = json!({
            "id": "msg_1",
            "content": [{ "type": "text", "text": "<svg/>" }],
        });
        assert_eq!(response_text(&response), "<svg/>");
        let body = request_body("m", 10, json!([]));
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
