//! Model backends.
//!
//! The refinement loop only needs two capabilities from a model: describe an image, and
//! complete a text prompt. Each vendor wire shape is one [`CompletionBackend`] implementation.

#[cfg(feature = "http")]
mod anthropic;
#[cfg(feature = "http")]
mod gemini;
#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
mod openai;

#[cfg(feature = "http")]
pub use anthropic::AnthropicBackend;
#[cfg(feature = "http")]
pub use gemini::GeminiBackend;
#[cfg(feature = "http")]
pub use openai::OpenAiCompatibleBackend;

use crate::error::{BackendError, Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Image bytes handed to a vision-capable backend.
#[derive(Debug, Clone, Copy)]
pub struct ImagePayload<'a> {
    pub media_type: &'a str,
    pub bytes: &'a [u8],
}

impl ImagePayload<'_> {
    pub fn base64(&self) -> String {
        BASE64.encode(self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64())
    }
}

pub trait CompletionBackend: Send + Sync {
    /// Stable identity (`provider/model`), part of response cache keys.
    fn id(&self) -> String;

    fn vision_complete(
        &self,
        image: &ImagePayload<'_>,
        prompt: &str,
    ) -> std::result::Result<String, BackendError>;

    fn text_complete(&self, prompt: &str) -> std::result::Result<String, BackendError>;
}

impl<B: CompletionBackend + ?Sized> CompletionBackend for &B {
    fn id(&self) -> String {
        (**self).id()
    }

    fn vision_complete(
        &self,
        image: &ImagePayload<'_>,
        prompt: &str,
    ) -> std::result::Result<String, BackendError> {
        (**self).vision_complete(image, prompt)
    }

    fn text_complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        (**self).text_complete(prompt)
    }
}

impl<B: CompletionBackend + ?Sized> CompletionBackend for Arc<B> {
    fn id(&self) -> String {
        (**self).id()
    }

    fn vision_complete(
        &self,
        image: &ImagePayload<'_>,
        prompt: &str,
    ) -> std::result::Result<String, BackendError> {
        (**self).vision_complete(image, prompt)
    }

    fn text_complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        (**self).text_complete(prompt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAi,
    OpenRouter,
    Google,
    Ollama,
    LmStudio,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::Anthropic,
        Provider::OpenAi,
        Provider::OpenRouter,
        Provider::Google,
        Provider::Ollama,
        Provider::LmStudio,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Google => "google",
            Provider::Ollama => "ollama",
            Provider::LmStudio => "lmstudio",
        }
    }

    /// Local servers accept any (or no) credential.
    pub fn is_local(self) -> bool {
        matches!(self, Provider::Ollama | Provider::LmStudio)
    }

    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::Google => Some("GOOGLE_API_KEY"),
            Provider::Ollama | Provider::LmStudio => None,
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Google => "https://generativelanguage.googleapis.com",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::LmStudio => "http://localhost:1234/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-3-5-sonnet-20241022",
            Provider::OpenAi => "gpt-4o",
            Provider::OpenRouter => "anthropic/claude-3.5-sonnet",
            Provider::Google => "gemini-1.5-pro",
            Provider::Ollama => "llava",
            Provider::LmStudio => "llava",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| {
                Error::config(format!(
                    "unsupported provider '{s}' (expected one of: {})",
                    Provider::ALL.map(Provider::as_str).join(", ")
                ))
            })
    }
}

/// Everything needed to address one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl BackendSettings {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: None,
            base_url: None,
            timeout: Duration::from_secs(120),
            max_tokens: 4096,
        }
    }

    /// Explicit key, else the provider's environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Some(key.to_string());
        }
        let var = self.provider.api_key_env()?;
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Base URL without a trailing slash; overrides are validated.
    pub fn resolved_base_url(&self) -> Result<String> {
        let Some(raw) = self.base_url.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(self.provider.default_base_url().to_string());
        };
        let parsed = url::Url::parse(raw)
            .map_err(|err| Error::config(format!("invalid base URL '{raw}': {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "base URL must use http or https: {raw}"
            )));
        }
        Ok(raw.trim_end_matches('/').to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }
        if !self.provider.is_local() && self.resolved_api_key().is_none() {
            let hint = self
                .provider
                .api_key_env()
                .map(|v| format!(" (pass an API key or set {v})"))
                .unwrap_or_default();
            return Err(Error::config(format!(
                "no API key for provider {}{hint}",
                self.provider
            )));
        }
        self.resolved_base_url()?;
        Ok(())
    }
}

/// Builds the backend matching `settings.provider`.
#[cfg(feature = "http")]
pub fn backend_from_settings(settings: &BackendSettings) -> Result<Arc<dyn CompletionBackend>> {
    settings.validate()?;
    let backend: Arc<dyn CompletionBackend> = match settings.provider {
        Provider::Anthropic => Arc::new(AnthropicBackend::new(settings)?),
        Provider::Google => Arc::new(GeminiBackend::new(settings)?),
        Provider::OpenAi | Provider::OpenRouter | Provider::Ollama | Provider::LmStudio => {
            Arc::new(OpenAiCompatibleBackend::new(settings)?)
        }
    };
    Ok(backend)
}
