//! Textual repairs for markup that strict parsers reject.

use regex::Regex;
use std::sync::OnceLock;

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

fn doctype_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<!DOCTYPE[^>\[]*(?:\[.*?\])?\s*>").unwrap())
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").unwrap())
}

fn dropped_elements_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<script\b[^>]*/>|<script\b.*?</script\s*>|<foreignObject\b[^>]*/>|<foreignObject\b.*?</foreignObject\s*>",
        )
        .unwrap()
    })
}

fn root_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<svg\b[^>]*>").unwrap())
}

fn is_entity_tail(rest: &str) -> bool {
    let Some(end) = rest.find(';') else {
        return false;
    };
    let body = &rest[..end];
    if let Some(num) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
        return !num.is_empty() && num.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(num) = body.strip_prefix('#') {
        return !num.is_empty() && num.chars().all(|c| c.is_ascii_digit());
    }
    !body.is_empty() && body.len() <= 32 && body.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Replaces `&` that do not start an entity reference with `&amp;`.
pub fn escape_bare_ampersands(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        let tail = &rest[i + 1..];
        if is_entity_tail(tail) {
            out.push('&');
        } else {
            out.push_str("&amp;");
        }
        rest = tail;
    }
    out.push_str(rest);
    out
}

/// Adds missing namespace declarations to the first `<svg>` start tag.
fn declare_namespaces(markup: &str) -> String {
    let Some(m) = root_open_re().find(markup) else {
        return markup.to_string();
    };
    let tag = m.as_str();
    let mut extra = String::new();
    if !tag.contains("xmlns=") {
        extra.push_str(&format!(r#" xmlns="{SVG_NS}""#));
    }
    if markup.contains("xlink:") && !tag.contains("xmlns:xlink") {
        extra.push_str(&format!(r#" xmlns:xlink="{XLINK_NS}""#));
    }
    if extra.is_empty() {
        return markup.to_string();
    }
    let insert_at = m.start() + "<svg".len();
    let mut out = String::with_capacity(markup.len() + extra.len());
    out.push_str(&markup[..insert_at]);
    out.push_str(&extra);
    out.push_str(&markup[insert_at..]);
    out
}

/// Drops doctype, comments, scripts and foreign objects, escapes stray ampersands and
/// declares the SVG and XLink namespaces when missing.
pub fn sanitize_markup(markup: &str) -> String {
    let text = markup.trim_start_matches('\u{feff}').trim();
    let text = doctype_re().replace_all(text, "");
    let text = comment_re().replace_all(&text, "");
    let text = dropped_elements_re().replace_all(&text, "");
    let text = escape_bare_ampersands(&text);
    declare_namespaces(&text)
}
