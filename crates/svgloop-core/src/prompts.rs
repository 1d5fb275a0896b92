//! Prompt templates for analysis, generation and revision.

use crate::error::Error;
use crate::model::SceneDescription;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl DetailLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            DetailLevel::Low => "low",
            DetailLevel::Medium => "medium",
            DetailLevel::High => "high",
        }
    }
}

impl FromStr for DetailLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(DetailLevel::Low),
            "medium" => Ok(DetailLevel::Medium),
            "high" => Ok(DetailLevel::High),
            other => Err(Error::config(format!(
                "unknown detail level '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

const ANALYSIS_EXAMPLES: &str = r##"Example 1:
Image: logo with the word "ACME" in blue next to a yellow star
Analysis:
{
  "shapes": ["text", "star", "rectangle"],
  "colors": ["#0066CC", "#FFD700"],
  "composition": "centered",
  "complexity": "simple",
  "style": "flat",
  "description": "Corporate logo with blue ACME lettering and a yellow star"
}

Example 2:
Image: red heart icon with a soft drop shadow
Analysis:
{
  "shapes": ["heart", "shadow"],
  "colors": ["#FF0000", "#00000033"],
  "composition": "centered",
  "complexity": "simple",
  "style": "flat with shadow",
  "description": "Red heart icon with a subtle shadow"
}
"##;

const GENERATION_EXAMPLES: &str = r##"Example 1:
Description: centered red circle
SVG:
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
  <circle cx="50" cy="50" r="40" fill="#FF0000"/>
</svg>

Example 2:
Description: rounded panel with a label
SVG:
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 200 100">
  <rect x="10" y="10" width="180" height="80" rx="10" fill="#F0F0F0"/>
  <text x="100" y="55" text-anchor="middle" font-family="Arial" font-size="20" fill="#333333">LOGO</text>
</svg>
"##;

pub fn analysis_prompt(detail: DetailLevel, few_shot: bool) -> String {
    let mut out = String::from(
        "Analyze this image and report:\n\
         1. The main shapes present (circles, rectangles, paths, text, ...)\n\
         2. The main color palette as hexadecimal values, most prominent first\n\
         3. The overall composition (centered, asymmetric, grid, ...)\n\
         4. The complexity level (simple, medium, complex)\n\
         5. The visual style (flat, detailed, minimalist, ...)\n\
         6. A short description of the content\n",
    );
    if detail == DetailLevel::High {
        out.push_str(
            "Also mention decorative elements, gradients or special effects, and any typography.\n",
        );
    }
    if few_shot {
        out.push('\n');
        out.push_str(ANALYSIS_EXAMPLES);
    }
    out.push_str(
        "\nRespond with a single JSON object using exactly these keys:\n\
         {\n  \"shapes\": [\"shape1\", ...],\n  \"colors\": [\"#RRGGBB\", ...],\n  \
         \"composition\": \"...\",\n  \"complexity\": \"simple|medium|complex\",\n  \
         \"style\": \"...\",\n  \"description\": \"...\"\n}\n",
    );
    out
}

fn list_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}

pub fn generation_prompt(scene: &SceneDescription, style: &str) -> String {
    let colors = list_or(&scene.colors, "appropriate colors");
    let shapes = list_or(&scene.shapes, "basic shapes");
    let mut out = String::new();
    let _ = write!(
        out,
        "Write SVG markup that reproduces the following image.\n\n\
         Description: {}\n\
         Shapes: {shapes}\n\
         Colors: {colors}\n\
         Composition: {}\n\
         Complexity: {}\n\
         Style: {style}\n\n",
        scene.description, scene.composition, scene.complexity
    );
    out.push_str(GENERATION_EXAMPLES);
    let _ = write!(
        out,
        "\nRequirements:\n\
         1. Use only these colors: {colors}\n\
         2. The SVG must be valid and well formed\n\
         3. Include xmlns=\"http://www.w3.org/2000/svg\"\n\
         4. Use a viewBox so the drawing scales\n\
         5. Keep text as <text> elements, not paths\n\
         6. Do not include comments\n\
         7. Return ONLY the SVG markup, no explanations\n"
    );
    out
}

pub fn revision_prompt(markup: &str, instructions: &[String], previous: &[Vec<String>]) -> String {
    let mut out = String::from("Modify the following SVG by applying these changes:\n\n");
    for instruction in instructions {
        let _ = writeln!(out, "- {instruction}");
    }
    let earlier: Vec<&String> = previous.iter().flatten().collect();
    if !earlier.is_empty() {
        out.push_str("\nPrevious attempts (these did not reach the target; do not repeat them):\n");
        for instruction in earlier {
            let _ = writeln!(out, "- {instruction}");
        }
    }
    let _ = write!(
        out,
        "\nCurrent SVG:\n{markup}\n\n\
         Instructions:\n\
         1. Apply only the requested changes\n\
         2. Keep the rest of the SVG as it is\n\
         3. The result must be valid SVG\n\
         4. Keep text as <text> elements\n\
         5. Return ONLY the modified SVG markup, no explanations\n"
    );
    out
}
