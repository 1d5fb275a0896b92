use crate::error::ContentError;
use regex::Regex;
use std::sync::OnceLock;

fn tagged_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```[ \t]*(?:svg|xml|html)[ \t]*\r?\n(.*?)```").unwrap())
}

fn plain_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[ \t]*\r?\n(.*?)```").unwrap())
}

fn tag_pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<svg(?:\s[^>]*)?>.*</svg\s*>").unwrap())
}

fn svg_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<svg(?:\s[^>]*)?>|</svg\s*>").unwrap())
}

/// The first `<svg>` element up to its matching close tag, allowing nested `<svg>` elements.
fn balanced_svg(text: &str) -> Option<&str> {
    let mut start = None;
    let mut depth = 0usize;
    for m in svg_tag_re().find_iter(text) {
        let tag = m.as_str();
        if tag.starts_with("</") {
            let Some(begin) = start else { continue };
            depth -= 1;
            if depth == 0 {
                return Some(&text[begin..m.end()]);
            }
        } else if !tag.ends_with("/>") {
            start.get_or_insert(m.start());
            depth += 1;
        }
    }
    None
}

/// Balanced element first; an unbalanced reply keeps everything up to its last close tag.
fn svg_element(text: &str) -> Option<&str> {
    balanced_svg(text).or_else(|| tag_pair_re().find(text).map(|m| m.as_str()))
}

fn self_closed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<svg(?:\s[^>]*)?/>").unwrap())
}

fn fenced_markup(re: &Regex, text: &str) -> Option<String> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .find(|body| body.contains("<svg"))
        .map(str::to_string)
}

/// Pulls SVG markup out of free-form model output.
///
/// Tried in order: a fence tagged `svg`/`xml`, an untagged fence, an `<svg>...</svg>` pair,
/// a self-closed `<svg .../>`. A fence whose body carries prose around the markup is narrowed
/// to the tag pair inside it.
pub fn extract_markup(text: &str) -> Result<String, ContentError> {
    let fenced =
        fenced_markup(tagged_fence_re(), text).or_else(|| fenced_markup(plain_fence_re(), text));
    if let Some(body) = fenced {
        if body.starts_with('<') {
            return Ok(body);
        }
        if let Some(svg) = svg_element(&body) {
            return Ok(svg.to_string());
        }
    }
    if let Some(svg) = svg_element(text) {
        return Ok(svg.to_string());
    }
    if let Some(m) = self_closed_re().find(text) {
        return Ok(m.as_str().to_string());
    }
    Err(ContentError::MarkupExtractionFailed)
}
