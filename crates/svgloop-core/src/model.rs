use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Structured description of a source raster, produced once per run by the scene analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    /// Shape-kind labels, most salient first.
    pub shapes: Vec<String>,
    /// Hex colors, most salient first. Duplicates are kept.
    pub colors: Vec<String>,
    pub composition: String,
    pub complexity: String,
    pub style: String,
    pub description: String,
}

impl SceneDescription {
    pub const UNKNOWN: &'static str = "unknown";

    /// Description used when model output cannot be parsed at all.
    pub fn fallback(raw_text: &str) -> Self {
        Self {
            shapes: Vec::new(),
            colors: Vec::new(),
            composition: Self::UNKNOWN.to_string(),
            complexity: "medium".to_string(),
            style: Self::UNKNOWN.to_string(),
            description: truncate_chars(raw_text, 200),
        }
    }
}

impl Default for SceneDescription {
    fn default() -> Self {
        Self::fallback("")
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// One iteration's generated vector markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub markup: String,
    /// Auxiliary generation info (style used, counts, whether a fallback was substituted).
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
}

impl Candidate {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            metadata: IndexMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// True when the markup is the deterministic placeholder rather than model output.
    pub fn is_placeholder(&self) -> bool {
        self.metadata
            .get("placeholder")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Spatial zone used by the scorer's difference partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl Area {
    pub const ALL: [Area; 5] = [
        Area::TopLeft,
        Area::TopRight,
        Area::BottomLeft,
        Area::BottomRight,
        Area::Center,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Area::TopLeft => "top_left",
            Area::TopRight => "top_right",
            Area::BottomLeft => "bottom_left",
            Area::BottomRight => "bottom_right",
            Area::Center => "center",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ColorMismatch,
    ShapePrecision,
    MissingDetails,
    /// Issue kinds this version does not know how to act on.
    #[serde(untagged)]
    Other(String),
}

impl IssueKind {
    pub fn as_str(&self) -> &str {
        match self {
            IssueKind::ColorMismatch => "color_mismatch",
            IssueKind::ShapePrecision => "shape_precision",
            IssueKind::MissingDetails => "missing_details",
            IssueKind::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceRegion {
    pub area: Area,
    pub issue: IssueKind,
    /// Fraction of the zone's pixels that differ beyond the per-channel threshold.
    pub ratio: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub structural_similarity: f64,
    pub pixel_similarity: f64,
    pub quality_score: f64,
    pub difference_regions: Vec<DifferenceRegion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub quality_score: f64,
    /// Whether this iteration's candidate could be rendered and scored.
    pub scored: bool,
    pub instructions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    ThresholdReached,
    BudgetExhausted,
    BackendUnavailable,
}

impl TerminalReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalReason::ThresholdReached => "threshold_reached",
            TerminalReason::BudgetExhausted => "budget_exhausted",
            TerminalReason::BackendUnavailable => "backend_unavailable",
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalMetrics {
    pub structural_similarity: f64,
    pub pixel_similarity: f64,
}

/// Outcome of a completed (non-aborted) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    /// Optimized markup of the best candidate, as written to the destination.
    pub markup: String,
    pub quality_score: f64,
    pub iterations: u32,
    pub terminal_reason: TerminalReason,
    pub metrics: FinalMetrics,
    pub history: Vec<IterationRecord>,
    pub metadata: IndexMap<String, Value>,
}

/// Pixel dimensions of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterSize {
    pub width: u32,
    pub height: u32,
}

impl RasterSize {
    pub const DEFAULT_MAX_SIDE: u32 = 1024;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Keeps the aspect ratio of `source` and scales it so the long side is at most `max_side`.
    ///
    /// Sources smaller than `max_side` are kept at their own resolution.
    pub fn fit_within(source: RasterSize, max_side: u32) -> Self {
        let max_side = max_side.max(1);
        let long = source.width.max(source.height).max(1);
        if long <= max_side {
            return Self::new(source.width, source.height);
        }
        let scale = max_side as f64 / long as f64;
        Self::new(
            ((source.width as f64) * scale).round() as u32,
            ((source.height as f64) * scale).round() as u32,
        )
    }
}

impl fmt::Display for RasterSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
