use crate::error::{BackendError, Error, Result};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;

/// Thin JSON-over-HTTP helper shared by the vendor backends.
#[derive(Debug, Clone)]
pub(crate) struct JsonClient {
    provider: &'static str,
    client: Client,
}

impl JsonClient {
    pub(crate) fn new(provider: &'static str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { provider, client })
    }

    pub(crate) fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        bearer: Option<&str>,
        body: &Value,
    ) -> std::result::Result<Value, BackendError> {
        let mut req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        if let Some(token) = bearer.filter(|t| !t.is_empty()) {
            req = req.bearer_auth(token);
        }

        let response = req.send().map_err(|err| self.transport_error(&err))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let message: String = text.chars().take(500).collect();
            let code = status.as_u16();
            // Throttling and server-side failures are transient.
            if code == 408 || code == 429 || status.is_server_error() {
                return Err(BackendError::Connectivity {
                    provider: self.provider.to_string(),
                    message: format!("HTTP {code}: {message}"),
                });
            }
            return Err(BackendError::Api {
                provider: self.provider.to_string(),
                status: code,
                message,
            });
        }

        response.json::<Value>().map_err(|err| BackendError::Api {
            provider: self.provider.to_string(),
            status: status.as_u16(),
            message: format!("invalid JSON body: {err}"),
        })
    }

    fn transport_error(&self, err: &reqwest::Error) -> BackendError {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            BackendError::Connectivity {
                provider: self.provider.to_string(),
                message: err.to_string(),
            }
        } else {
            BackendError::Api {
                provider: self.provider.to_string(),
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn non_empty(
        &self,
        text: String,
    ) -> std::result::Result<String, BackendError> {
        if text.trim().is_empty() {
            return Err(BackendError::EmptyResponse {
                provider: self.provider.to_string(),
            });
        }
        Ok(text)
    }
}

/// Concatenates the `text` fields of an array of content blocks.
pub(crate) fn join_text_blocks(blocks: Option<&Value>) -> String {
    let Some(blocks) = blocks.and_then(Value::as_array) else {
        return String::new();
    };
    blocks
        .iter()
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let blocks = json!([
            { "type": "text", "text": "first" },
            { "type": "tool_use", "id": "x" },
            { "type": "text", "text": "second" }
        ]);
        assert_eq!(join_text_blocks(Some(&blocks)), "first\nsecond");
        assert_eq!(join_text_blocks(None), "");
    }
}
