#![forbid(unsafe_code)]

//! Iterative raster-to-SVG refinement driven by vision-capable language models (headless core).
//!
//! Design goals:
//! - the loop depends only on capability traits (analyzer, generator, renderer, scorer)
//! - a monotonic best-so-far candidate and exactly one artifact per non-aborted run
//! - model output is never trusted: every parse has a deterministic fallback
//!
//! Rasterization and image comparison live in `svgloop-render`.

pub mod analyzer;
pub mod backend;
pub mod batch;
pub mod cache;
pub mod config;
pub mod cost;
pub mod error;
pub mod generator;
pub mod input;
pub mod model;
pub mod oracle;
pub mod prompts;
pub mod refine;
pub mod report;
pub mod retry;

pub use analyzer::{SceneAnalyzer, VisionAnalyzer, parse_scene_description};
#[cfg(feature = "http")]
pub use backend::backend_from_settings;
pub use backend::{BackendSettings, CompletionBackend, ImagePayload, Provider};
pub use batch::{BatchInput, BatchOptions, BatchResult, run_batch};
pub use cache::{CacheConfig, ResponseCache};
pub use config::VectorizerConfig;
pub use cost::{CostEstimate, CostEstimator};
pub use error::{BackendError, ContentError, Error, ErrorKind, RenderAttempt, RenderError, Result};
pub use generator::{CandidateGenerator, MarkupGenerator, OptimizeLevel};
pub use input::SourceImage;
pub use model::{
    Area, Candidate, ComparisonResult, DifferenceRegion, FinalMetrics, FinalResult, IssueKind,
    IterationRecord, RasterSize, SceneDescription, Severity, TerminalReason,
};
pub use oracle::{Renderer, Scorer};
pub use prompts::DetailLevel;
pub use refine::{LoopOptions, LoopPhase, LoopState, RefinementLoop};
pub use report::{BatchReport, RunReport, write_json_report};
pub use retry::{RetryConfig, RetryPolicy};

#[cfg(test)]
mod tests;
