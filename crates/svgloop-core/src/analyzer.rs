//! Scene analysis: raster in, [`SceneDescription`] out.

use crate::backend::{CompletionBackend, ImagePayload};
use crate::cache::ResponseCache;
use crate::error::{ContentError, Result, blank_reply_as_text};
use crate::input::SourceImage;
use crate::model::SceneDescription;
use crate::prompts::{DetailLevel, analysis_prompt};
use crate::retry::RetryPolicy;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

pub trait SceneAnalyzer: Send + Sync {
    fn analyze(&self, image: &SourceImage) -> Result<SceneDescription>;
}

/// Analyzer backed by a vision-capable model.
pub struct VisionAnalyzer<B> {
    backend: B,
    retry: RetryPolicy,
    detail: DetailLevel,
    few_shot: bool,
    cache: Option<ResponseCache>,
}

impl<B: CompletionBackend> VisionAnalyzer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
            detail: DetailLevel::default(),
            few_shot: true,
            cache: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_detail(mut self, detail: DetailLevel) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_few_shot(mut self, few_shot: bool) -> Self {
        self.few_shot = few_shot;
        self
    }

    pub fn with_cache(mut self, cache: Option<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    fn cache_key(&self, image: &SourceImage) -> String {
        ResponseCache::key(&[
            b"scene-analysis",
            self.backend.id().as_bytes(),
            self.detail.as_str().as_bytes(),
            &image.bytes,
        ])
    }
}

impl<B: CompletionBackend> SceneAnalyzer for VisionAnalyzer<B> {
    fn analyze(&self, image: &SourceImage) -> Result<SceneDescription> {
        let key = self.cache.as_ref().map(|_| self.cache_key(image));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(scene) = cache.get_as::<SceneDescription>(key) {
                info!(path = %image.path.display(), "scene description served from cache");
                return Ok(scene);
            }
        }

        let prompt = analysis_prompt(self.detail, self.few_shot);
        let payload = ImagePayload {
            media_type: image.media_type,
            bytes: &image.bytes,
        };
        let raw = blank_reply_as_text(
            self.retry
                .run(|| self.backend.vision_complete(&payload, &prompt)),
        )?;
        debug!(chars = raw.len(), "analysis response received");

        match parse_scene_description(&raw) {
            Ok(scene) => {
                if let (Some(cache), Some(key)) = (&self.cache, &key) {
                    match serde_json::to_value(&scene) {
                        Ok(value) => {
                            if let Err(err) = cache.put(key, &value) {
                                warn!(error = %err, "failed to store scene description in cache");
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to serialize scene description"),
                    }
                }
                Ok(scene)
            }
            Err(err) => {
                warn!(error = %err, "using default scene description");
                Ok(SceneDescription::fallback(&raw))
            }
        }
    }
}

/// Decodes model output into a scene description.
///
/// Tries the whole text as JSON first, then the largest JSON object embedded in surrounding
/// prose or code fences.
pub fn parse_scene_description(raw: &str) -> std::result::Result<SceneDescription, ContentError> {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(scene_from_object(&obj));
    }
    largest_embedded_object(raw)
        .map(|obj| scene_from_object(&obj))
        .ok_or(ContentError::UnparseableDescription)
}

/// Same as [`parse_scene_description`], substituting the default description on failure.
pub fn parse_scene_description_lenient(raw: &str) -> SceneDescription {
    parse_scene_description(raw).unwrap_or_else(|_| SceneDescription::fallback(raw))
}

/// Byte ranges of balanced `{...}` spans, honoring JSON string escapes.
fn balanced_object_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    for start in bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'{')
        .map(|(i, _)| i)
    {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, &b) in bytes[start..].iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        spans.push((start, start + offset + 1));
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    spans
}

fn largest_embedded_object(text: &str) -> Option<Map<String, Value>> {
    let mut spans = balanced_object_spans(text);
    spans.sort_by_key(|(s, e)| std::cmp::Reverse(e - s));
    spans.into_iter().find_map(|(s, e)| {
        match serde_json::from_str::<Value>(&text[s..e]) {
            Ok(Value::Object(obj)) => Some(obj),
            _ => None,
        }
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str, default: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn scene_from_object(obj: &Map<String, Value>) -> SceneDescription {
    SceneDescription {
        shapes: string_list(obj.get("shapes")),
        colors: string_list(obj.get("colors")),
        composition: string_field(obj, "composition", SceneDescription::UNKNOWN),
        complexity: string_field(obj, "complexity", "medium"),
        style: string_field(obj, "style", SceneDescription::UNKNOWN),
        description: string_field(obj, "description", ""),
    }
}
