use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeLevel {
    /// Comments only.
    Low,
    /// Also collapses whitespace.
    #[default]
    Medium,
    /// Also drops default-valued attributes and truncates numbers to three decimals.
    High,
}

impl OptimizeLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            OptimizeLevel::Low => "low",
            OptimizeLevel::Medium => "medium",
            OptimizeLevel::High => "high",
        }
    }
}

impl FromStr for OptimizeLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(OptimizeLevel::Low),
            "medium" => Ok(OptimizeLevel::Medium),
            "high" => Ok(OptimizeLevel::High),
            other => Err(Error::config(format!(
                "unknown optimization level '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").unwrap())
}

fn inter_tag_ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r">\s+<").unwrap())
}

fn ws_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Presentation attributes whose initial value can be written out without changing the render.
/// `fill="none"` is absent: the initial fill is black.
const DEFAULT_ATTRS: [(&str, &str); 5] = [
    ("stroke", "none"),
    ("stroke-width", "1"),
    ("stroke-opacity", "1"),
    ("fill-opacity", "1"),
    ("opacity", "1"),
];

struct DefaultAttr {
    default: &'static str,
    /// Every value the property takes, as an attribute or inside `style`.
    any_value: Regex,
    /// ` name="default"` as an attribute.
    written: Regex,
}

fn default_attrs() -> &'static [DefaultAttr] {
    static ATTRS: OnceLock<Vec<DefaultAttr>> = OnceLock::new();
    ATTRS.get_or_init(|| {
        DEFAULT_ATTRS
            .iter()
            .map(|&(name, default)| DefaultAttr {
                default,
                any_value: Regex::new(&format!(
                    r#"(?:^|[\s;"'])(?:{name})\s*[=:]\s*["']?\s*([^"';>\s]+)"#
                ))
                .unwrap(),
                written: Regex::new(&format!(r#"\s(?:{name})=["']{default}["']"#)).unwrap(),
            })
            .collect()
    })
}

/// Drops default-valued attributes, but only for properties the document never sets to anything
/// else; inherited properties would otherwise change on descendants.
fn strip_default_attrs(markup: &str) -> String {
    let mut out = markup.to_string();
    for attr in default_attrs() {
        let uniform = attr
            .any_value
            .captures_iter(&out)
            .filter_map(|c| c.get(1))
            .all(|v| v.as_str() == attr.default);
        if uniform {
            out = attr.written.replace_all(&out, "").into_owned();
        }
    }
    out
}

fn precision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+\.\d{3})\d+").unwrap())
}

/// Textual size reduction. Never parses the document.
pub fn optimize_markup(markup: &str, level: OptimizeLevel) -> String {
    let mut out = comment_re().replace_all(markup, "").into_owned();
    if matches!(level, OptimizeLevel::Medium | OptimizeLevel::High) {
        out = inter_tag_ws_re().replace_all(&out, "><").into_owned();
        out = ws_run_re().replace_all(&out, " ").into_owned();
    }
    if level == OptimizeLevel::High {
        out = strip_default_attrs(&out);
        out = precision_re().replace_all(&out, "$1").into_owned();
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = r##"
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10">
  <!-- background -->
  <rect width="10"   height="10" fill="#fff" stroke-width="1"/>
  <circle cx="5.123456" cy="5" r="2"/>
</svg>
"##;

    #[test]
    fn low_strips_comments_only() {
        let out = optimize_markup(INPUT, OptimizeLevel::Low);
        assert!(!out.contains("background"));
        assert!(out.contains("\n  <rect"));
    }

    #[test]
    fn medium_collapses_whitespace() {
        let out = optimize_markup(INPUT, OptimizeLevel::Medium);
        assert_eq!(
            out,
            r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><rect width="10" height="10" fill="#fff" stroke-width="1"/><circle cx="5.123456" cy="5" r="2"/></svg>"##
        );
    }

    #[test]
    fn high_drops_defaults_and_precision() {
        let out = optimize_markup(INPUT, OptimizeLevel::High);
        assert!(out.contains(r##"<rect width="10" height="10" fill="#fff"/>"##));
        assert!(out.contains(r#"cx="5.123""#));
    }

    #[test]
    fn high_keeps_paint_that_changes_the_render() {
        let outline = r#"<svg xmlns="http://www.w3.org/2000/svg"><circle cx="5" cy="5" r="4" fill="none" stroke="red"/></svg>"#;
        assert_eq!(optimize_markup(outline, OptimizeLevel::High), outline);

        // `stroke="none"` on a child overrides the group's stroke.
        let inherited = r#"<svg xmlns="http://www.w3.org/2000/svg"><g stroke="blue" stroke-width="3"><rect width="4" height="4" stroke="none" stroke-width="1"/></g></svg>"#;
        assert_eq!(optimize_markup(inherited, OptimizeLevel::High), inherited);

        let opaque = r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="4" height="4" opacity="1" fill-opacity="1" stroke="none"/></svg>"#;
        assert_eq!(
            optimize_markup(opaque, OptimizeLevel::High),
            r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="4" height="4"/></svg>"#
        );
    }

    #[test]
    fn parses_levels() {
        assert_eq!("HIGH".parse::<OptimizeLevel>().unwrap(), OptimizeLevel::High);
        assert!("extreme".parse::<OptimizeLevel>().is_err());
    }
}
