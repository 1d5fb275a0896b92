//! Run configuration, loadable from JSON or YAML.

use crate::backend::{BackendSettings, Provider};
use crate::cache::CacheConfig;
use crate::error::{Error, Result};
use crate::generator::OptimizeLevel;
use crate::prompts::DetailLevel;
use crate::refine::LoopOptions;
use crate::retry::{RetryConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    pub provider: Provider,
    /// Empty means the provider's default model.
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_iterations: u32,
    pub quality_threshold: f64,
    pub detail_level: DetailLevel,
    pub optimize_level: OptimizeLevel,
    pub few_shot: bool,
    pub style: String,
    pub temp_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        let loop_defaults = LoopOptions::default();
        Self {
            provider: Provider::default(),
            model: String::new(),
            api_key: None,
            base_url: None,
            max_iterations: loop_defaults.max_iterations,
            quality_threshold: loop_defaults.quality_threshold,
            detail_level: DetailLevel::default(),
            optimize_level: loop_defaults.optimize_level,
            few_shot: true,
            style: "flat".to_string(),
            temp_dir: None,
            timeout_secs: 120,
            max_tokens: 4096,
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl VectorizerConfig {
    /// Reads a `.json`, `.yaml` or `.yml` file. Missing fields take their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::config(format!("cannot read config {}: {err}", path.display()))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Self::from_json_str(&text),
            "yaml" | "yml" => Self::from_yaml_str(&text),
            other => Err(Error::config(format!(
                "unsupported config format '.{other}' (expected .json, .yaml or .yml)"
            ))),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| Error::config(format!("invalid JSON config: {err}")))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|err| Error::config(format!("invalid YAML config: {err}")))?;
        let value = serde_json::to_value(raw).unwrap_or(Value::Null);
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|err| Error::config(format!("invalid config: {err}")))
    }

    pub fn model_or_default(&self) -> String {
        let model = self.model.trim();
        if model.is_empty() {
            self.provider.default_model().to_string()
        } else {
            model.to_string()
        }
    }

    /// Checks ranges. Credentials are checked separately by [`BackendSettings::validate`].
    pub fn validate(&self) -> Result<()> {
        self.loop_options().validate()?;
        if self.timeout_secs == 0 {
            return Err(Error::config("timeout_secs must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.cache.enabled && self.cache.dir.as_os_str().is_empty() {
            return Err(Error::config("cache.dir must be set when the cache is enabled"));
        }
        Ok(())
    }

    pub fn backend_settings(&self) -> BackendSettings {
        let mut settings = BackendSettings::new(self.provider, self.model_or_default());
        settings.api_key = self.api_key.clone();
        settings.base_url = self.base_url.clone();
        settings.timeout = Duration::from_secs(self.timeout_secs);
        settings.max_tokens = self.max_tokens;
        settings
    }

    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            max_iterations: self.max_iterations,
            quality_threshold: self.quality_threshold,
            optimize_level: self.optimize_level,
            temp_dir: self.temp_dir.clone(),
            ..LoopOptions::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_only_given_fields() {
        let cfg = VectorizerConfig::from_yaml_str(
            "provider: ollama\nmax_iterations: 4\ncache:\n  enabled: true\n",
        )
        .unwrap();
        assert_eq!(cfg.provider, Provider::Ollama);
        assert_eq!(cfg.max_iterations, 4);
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.ttl_secs, 3600);
        assert_eq!(cfg.quality_threshold, 0.85);
        assert_eq!(cfg.model_or_default(), "llava");
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(
            VectorizerConfig::from_yaml_str("").unwrap(),
            VectorizerConfig::default()
        );
    }

    #[test]
    fn json_with_unknown_provider_is_rejected() {
        let err = VectorizerConfig::from_json_str(r#"{"provider": "watson"}"#).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        let cfg = VectorizerConfig {
            max_iterations: 101,
            ..VectorizerConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = VectorizerConfig {
            quality_threshold: 1.5,
            ..VectorizerConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(VectorizerConfig::default().validate().is_ok());
    }

    #[test]
    fn from_path_picks_format_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let json = tmp.path().join("svgloop.json");
        std::fs::write(&json, r#"{"quality_threshold": 0.9, "retry": {"max_attempts": 5}}"#).unwrap();
        let cfg = VectorizerConfig::from_path(&json).unwrap();
        assert_eq!(cfg.quality_threshold, 0.9);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay_ms, 2_000);

        let toml = tmp.path().join("svgloop.toml");
        std::fs::write(&toml, "x = 1").unwrap();
        assert!(VectorizerConfig::from_path(&toml).is_err());
    }
}
