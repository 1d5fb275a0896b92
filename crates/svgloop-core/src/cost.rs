//! Rough pre-run cost estimates for paid providers.

use crate::backend::Provider;
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

const ANTHROPIC: &[(&str, Pricing)] = &[
    ("claude-3-5-sonnet-20241022", Pricing { input: 3.0, output: 15.0 }),
    ("claude-3-opus-20240229", Pricing { input: 15.0, output: 75.0 }),
];

const OPENAI: &[(&str, Pricing)] = &[
    ("gpt-4-vision-preview", Pricing { input: 10.0, output: 30.0 }),
    ("gpt-4-turbo", Pricing { input: 10.0, output: 30.0 }),
];

const GOOGLE: &[(&str, Pricing)] = &[
    ("gemini-2.0-flash-exp", Pricing { input: 0.0, output: 0.0 }),
    ("gemini-1.5-pro", Pricing { input: 1.25, output: 5.0 }),
];

fn price_table(provider: Provider) -> &'static [(&'static str, Pricing)] {
    match provider {
        Provider::Anthropic => ANTHROPIC,
        Provider::OpenAi => OPENAI,
        Provider::Google => GOOGLE,
        Provider::OpenRouter | Provider::Ollama | Provider::LmStudio => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenEstimate {
    pub input: u64,
    pub output: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub provider: Provider,
    pub model: String,
    pub tokens: TokenEstimate,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total: f64,
}

impl CostEstimate {
    pub fn is_free(&self) -> bool {
        self.total == 0.0
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_free() {
            return write!(f, "Estimated cost: free ({}/{})", self.provider, self.model);
        }
        writeln!(f, "Estimated cost: ${:.4}", self.total)?;
        writeln!(
            f,
            "  - Input: ${:.4} ({} tokens)",
            self.input_cost, self.tokens.input
        )?;
        writeln!(
            f,
            "  - Output: ${:.4} ({} tokens)",
            self.output_cost, self.tokens.output
        )?;
        write!(f, "  - Provider: {}/{}", self.provider, self.model)
    }
}

#[derive(Debug, Clone)]
pub struct CostEstimator {
    provider: Provider,
    model: String,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

impl CostEstimator {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// One analysis plus the initial generation, then one revision per further iteration.
    pub fn estimate_tokens(max_iterations: u32) -> TokenEstimate {
        let extra = u64::from(max_iterations.saturating_sub(1));
        TokenEstimate {
            input: 1_500 + extra * 1_000,
            output: 2_500 + extra * 2_000,
        }
    }

    /// Price for the configured model, else the provider's first listed model.
    pub fn pricing(&self) -> Option<Pricing> {
        let table = price_table(self.provider);
        if let Some((_, p)) = table.iter().find(|(m, _)| *m == self.model) {
            return Some(*p);
        }
        let (fallback_model, p) = table.first()?;
        warn!(model = %self.model, fallback = fallback_model, "no pricing for model; using provider default");
        Some(*p)
    }

    pub fn estimate(&self, max_iterations: u32) -> CostEstimate {
        let tokens = Self::estimate_tokens(max_iterations);
        let pricing = self.pricing().unwrap_or(Pricing {
            input: 0.0,
            output: 0.0,
        });
        let input_cost = tokens.input as f64 / 1_000_000.0 * pricing.input;
        let output_cost = tokens.output as f64 / 1_000_000.0 * pricing.output;
        CostEstimate {
            provider: self.provider,
            model: self.model.clone(),
            tokens,
            input_cost: round4(input_cost),
            output_cost: round4(output_cost),
            total: round4(input_cost + output_cost),
        }
    }
}
