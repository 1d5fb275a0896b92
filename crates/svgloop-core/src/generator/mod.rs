//! Candidate generation: scene description or revision instructions in, SVG candidate out.
//!
//! Model output goes through [`extract_markup`] and [`validate_markup`]. Anything that fails
//! either step is replaced by a deterministic placeholder so the loop always holds a candidate.

mod extract;
mod optimize;
mod validate;

pub use extract::extract_markup;
pub use optimize::{OptimizeLevel, optimize_markup};
pub use validate::{MarkupReport, SVG_NAMESPACE, validate_markup};

use crate::backend::CompletionBackend;
use crate::error::{ContentError, Result, blank_reply_as_text};
use crate::model::{Candidate, SceneDescription};
use crate::prompts::{generation_prompt, revision_prompt};
use crate::retry::RetryPolicy;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const PLACEHOLDER_COLOR: &str = "#000000";

pub trait CandidateGenerator: Send + Sync {
    fn generate(&self, scene: &SceneDescription) -> Result<Candidate>;

    /// `history` holds the instructions of recent iterations, oldest first.
    fn revise(
        &self,
        markup: &str,
        instructions: &[String],
        history: &[Vec<String>],
    ) -> Result<Candidate>;

    fn optimize(&self, markup: &str, level: OptimizeLevel) -> String {
        optimize_markup(markup, level)
    }
}

/// Extracts and validates markup from a raw model response.
pub fn parse_candidate_markup(raw: &str) -> std::result::Result<String, ContentError> {
    let markup = extract_markup(raw)?;
    let report = validate_markup(&markup)?;
    for warning in &report.warnings {
        warn!("{warning}");
    }
    Ok(markup)
}

fn hex_color_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#(?:[0-9A-Fa-f]{8}|[0-9A-Fa-f]{6}|[0-9A-Fa-f]{3,4})\b").unwrap())
}

fn fill_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"fill\s*[=:]\s*["']?\s*([^"';>\s]+)"#).unwrap())
}

/// Reduces a free-form color label to something safe to put in an attribute.
fn sanitize_color(label: &str) -> Option<String> {
    if let Some(m) = hex_color_re().find(label) {
        return Some(m.as_str().to_string());
    }
    let word = label.trim();
    let ok = !word.is_empty() && word.chars().all(|c| c.is_ascii_alphabetic());
    ok.then(|| word.to_ascii_lowercase())
}

/// A single full-canvas rectangle.
pub fn placeholder_markup(color: Option<&str>) -> String {
    let color = color
        .and_then(sanitize_color)
        .unwrap_or_else(|| PLACEHOLDER_COLOR.to_string());
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100"><rect width="100" height="100" fill="{color}"/></svg>"#
    )
}

/// First usable fill color in `markup`, skipping `none`, `transparent` and paint-server refs.
pub fn first_fill_color(markup: &str) -> Option<String> {
    fill_attr_re()
        .captures_iter(markup)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|v| !matches!(*v, "none" | "transparent") && !v.starts_with("url("))
        .find_map(sanitize_color)
}

fn placeholder_candidate(color: Option<&str>, cause: &ContentError) -> Candidate {
    warn!(error = %cause, "substituting placeholder candidate");
    Candidate::new(placeholder_markup(color))
        .with_meta("placeholder", true)
        .with_meta("content_error", cause.to_string())
}

/// Generator backed by a text-completion model.
pub struct MarkupGenerator<B> {
    backend: B,
    retry: RetryPolicy,
    style: String,
}

impl<B: CompletionBackend> MarkupGenerator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
            style: "flat".to_string(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let raw = blank_reply_as_text(self.retry.run(|| self.backend.text_complete(prompt)))?;
        debug!(chars = raw.len(), "generation response received");
        Ok(raw)
    }
}

impl<B: CompletionBackend> CandidateGenerator for MarkupGenerator<B> {
    fn generate(&self, scene: &SceneDescription) -> Result<Candidate> {
        let raw = self.complete(&generation_prompt(scene, &self.style))?;
        let candidate = match parse_candidate_markup(&raw) {
            Ok(markup) => Candidate::new(markup),
            Err(err) => placeholder_candidate(scene.colors.first().map(String::as_str), &err),
        };
        Ok(candidate
            .with_meta("style", self.style.clone())
            .with_meta("shapes_count", scene.shapes.len())
            .with_meta("colors_count", scene.colors.len()))
    }

    fn revise(
        &self,
        markup: &str,
        instructions: &[String],
        history: &[Vec<String>],
    ) -> Result<Candidate> {
        let raw = self.complete(&revision_prompt(markup, instructions, history))?;
        let candidate = match parse_candidate_markup(&raw) {
            Ok(revised) => Candidate::new(revised),
            Err(err) => placeholder_candidate(first_fill_color(markup).as_deref(), &err),
        };
        Ok(candidate.with_meta("modifications_applied", instructions.len()))
    }
}
