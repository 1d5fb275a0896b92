//! The refinement loop: analyze, generate, then render, score and revise until the quality
//! threshold or the iteration budget is reached.
//!
//! All four collaborators are injected as trait objects, so the loop can be driven entirely by
//! in-memory fakes. State lives in an explicit [`LoopState`] owned by a single `run` call.

use crate::analyzer::SceneAnalyzer;
use crate::error::{Error, Result};
use crate::generator::{CandidateGenerator, OptimizeLevel};
use crate::input::{SourceImage, validate_output_path};
use crate::model::{
    Candidate, ComparisonResult, DifferenceRegion, FinalMetrics, FinalResult, IssueKind,
    IterationRecord, RasterSize, TerminalReason,
};
use crate::oracle::{Renderer, Scorer};
use image::RgbaImage;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Instruction issued when a candidate could not be rendered, so there is nothing to compare.
pub const GENERIC_INSTRUCTION: &str = "improve the SVG representation";

pub const MAX_ITERATIONS_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopOptions {
    pub max_iterations: u32,
    pub quality_threshold: f64,
    /// Long side of every render; the short side follows the source aspect ratio.
    pub max_side: u32,
    pub optimize_level: OptimizeLevel,
    /// How many earlier iterations' instructions are passed back as "do not repeat" context.
    pub history_window: usize,
    /// When set, rendered iterations are kept as `<temp_dir>/<run id>/iteration_<n>.png`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            quality_threshold: 0.85,
            max_side: RasterSize::DEFAULT_MAX_SIDE,
            optimize_level: OptimizeLevel::Medium,
            history_window: 2,
            temp_dir: None,
        }
    }
}

impl LoopOptions {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ITERATIONS_LIMIT).contains(&self.max_iterations) {
            return Err(Error::input(format!(
                "max iterations must be between 1 and {MAX_ITERATIONS_LIMIT}, got {}",
                self.max_iterations
            )));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(Error::input(format!(
                "quality threshold must be between 0.0 and 1.0, got {}",
                self.quality_threshold
            )));
        }
        if self.max_side == 0 {
            return Err(Error::input("render size must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Initializing,
    Analyzing,
    GeneratingInitial,
    Rendering,
    Scoring,
    Deciding,
    Revising,
    Finalizing,
    Done,
    Aborted,
}

/// Mutable state of one run.
#[derive(Debug, Clone)]
pub struct LoopState {
    pub phase: LoopPhase,
    pub current: Candidate,
    pub best: Candidate,
    /// Starts at 0.0 so the first scored iteration always becomes the best.
    pub best_score: f64,
    /// Iteration that produced `best`; 0 while nothing has been scored.
    pub best_iteration: u32,
    pub best_comparison: Option<ComparisonResult>,
    pub iteration: u32,
    pub terminal_reason: Option<TerminalReason>,
    pub history: Vec<IterationRecord>,
}

impl LoopState {
    pub fn new(initial: Candidate) -> Self {
        Self {
            phase: LoopPhase::GeneratingInitial,
            best: initial.clone(),
            current: initial,
            best_score: 0.0,
            best_iteration: 0,
            best_comparison: None,
            iteration: 0,
            terminal_reason: None,
            history: Vec::new(),
        }
    }

    /// Applies a scored iteration to the best-so-far tracking. Returns true on a strict improvement.
    pub fn observe(&mut self, comparison: &ComparisonResult) -> bool {
        if comparison.quality_score > self.best_score {
            self.best_score = comparison.quality_score;
            self.best = self.current.clone();
            self.best_iteration = self.iteration;
            self.best_comparison = Some(comparison.clone());
            return true;
        }
        false
    }

    /// Instructions of the last `window` recorded iterations, oldest first.
    pub fn recent_instructions(&self, window: usize) -> Vec<Vec<String>> {
        let start = self.history.len().saturating_sub(window);
        self.history[start..]
            .iter()
            .map(|r| r.instructions.clone())
            .filter(|i| !i.is_empty())
            .collect()
    }
}

/// Maps difference regions to revision instructions, preserving region order.
///
/// Issue kinds without a mapping are dropped.
pub fn instructions_for(regions: &[DifferenceRegion]) -> Vec<String> {
    regions
        .iter()
        .filter_map(|region| match &region.issue {
            IssueKind::ColorMismatch => Some(format!("adjust colors in region {}", region.area)),
            IssueKind::ShapePrecision => Some(format!("improve shape precision in {}", region.area)),
            IssueKind::MissingDetails => Some(format!("add missing details in {}", region.area)),
            IssueKind::Other(kind) => {
                debug!(kind = %kind, area = %region.area, "ignoring unknown issue kind");
                None
            }
        })
        .collect()
}

pub struct RefinementLoop<'a> {
    analyzer: &'a dyn SceneAnalyzer,
    generator: &'a dyn CandidateGenerator,
    renderer: &'a dyn Renderer,
    scorer: &'a dyn Scorer,
    options: LoopOptions,
}

impl<'a> RefinementLoop<'a> {
    pub fn new(
        analyzer: &'a dyn SceneAnalyzer,
        generator: &'a dyn CandidateGenerator,
        renderer: &'a dyn Renderer,
        scorer: &'a dyn Scorer,
    ) -> Self {
        Self {
            analyzer,
            generator,
            renderer,
            scorer,
            options: LoopOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoopOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    /// Vectorizes `source` into `destination`.
    ///
    /// Input problems are reported before any backend call. On every non-aborted path exactly one
    /// file is written to `destination`.
    pub fn run(
        &self,
        source: &Path,
        destination: &Path,
        on_progress: Option<&mut dyn FnMut(u32, f64)>,
    ) -> Result<FinalResult> {
        self.options.validate()?;
        validate_output_path(destination)?;
        let image = SourceImage::load(source)?;
        self.run_image(&image, destination, on_progress)
    }

    /// Same as [`RefinementLoop::run`] for an already loaded source.
    pub fn run_image(
        &self,
        source: &SourceImage,
        destination: &Path,
        mut on_progress: Option<&mut dyn FnMut(u32, f64)>,
    ) -> Result<FinalResult> {
        self.options.validate()?;
        validate_output_path(destination)?;
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let size = RasterSize::fit_within(source.size(), self.options.max_side);
        let scratch = self.scratch_dir(&run_id);
        info!(
            input = %source.path.display(),
            render_size = %size,
            max_iterations = self.options.max_iterations,
            threshold = self.options.quality_threshold,
            "starting vectorization"
        );

        info!("analyzing image");
        let scene = self.analyzer.analyze(source)?;
        debug!(description = %scene.description, shapes = scene.shapes.len(), "analysis complete");

        info!("generating initial candidate");
        let initial = self.generator.generate(&scene)?;
        let mut state = LoopState::new(initial);

        for iteration in 1..=self.options.max_iterations {
            state.iteration = iteration;
            state.phase = LoopPhase::Rendering;
            info!(iteration, max = self.options.max_iterations, "iteration");

            let record = match self.renderer.render(&state.current.markup, size) {
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "no renderer available; aborting run");
                    state.phase = LoopPhase::Aborted;
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(iteration, error = %err, "candidate could not be rendered");
                    IterationRecord {
                        iteration,
                        quality_score: state.best_score,
                        scored: false,
                        instructions: vec![GENERIC_INSTRUCTION.to_string()],
                    }
                }
                Ok(raster) => {
                    if let Some(dir) = &scratch {
                        save_iteration_raster(dir, iteration, &raster);
                    }
                    state.phase = LoopPhase::Scoring;
                    let comparison = self.scorer.compare(&source.pixels, &raster);
                    let quality = comparison.quality_score;
                    if let Some(callback) = on_progress.as_mut() {
                        callback(iteration, quality);
                    }

                    state.phase = LoopPhase::Deciding;
                    if state.observe(&comparison) {
                        info!(iteration, quality, "new best candidate");
                    }
                    info!(iteration, quality, best = state.best_score, "scored");

                    if quality >= self.options.quality_threshold {
                        state.history.push(IterationRecord {
                            iteration,
                            quality_score: quality,
                            scored: true,
                            instructions: Vec::new(),
                        });
                        state.terminal_reason = Some(TerminalReason::ThresholdReached);
                        info!(iteration, quality, "quality threshold reached");
                        break;
                    }

                    let mut instructions = instructions_for(&comparison.difference_regions);
                    if instructions.is_empty() {
                        instructions.push(GENERIC_INSTRUCTION.to_string());
                    }
                    IterationRecord {
                        iteration,
                        quality_score: quality,
                        scored: true,
                        instructions,
                    }
                }
            };

            let context = state.recent_instructions(self.options.history_window);
            let instructions = record.instructions.clone();
            state.history.push(record);
            if iteration == self.options.max_iterations {
                break;
            }

            state.phase = LoopPhase::Revising;
            debug!(iteration, instructions = instructions.len(), "revising candidate");
            match self
                .generator
                .revise(&state.current.markup, &instructions, &context)
            {
                Ok(next) => state.current = next,
                Err(Error::Backend(err)) => {
                    warn!(iteration, error = %err, "backend unavailable during revision; finalizing best candidate");
                    state.terminal_reason = Some(TerminalReason::BackendUnavailable);
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let terminal_reason = *state
            .terminal_reason
            .get_or_insert(TerminalReason::BudgetExhausted);
        state.phase = LoopPhase::Finalizing;
        let mut result = self.finalize(source, destination, size, &state)?;
        state.phase = LoopPhase::Done;

        let meta = &mut result.metadata;
        meta.insert("run_id".into(), Value::from(run_id));
        meta.insert(
            "input_path".into(),
            Value::from(source.path.display().to_string()),
        );
        meta.insert(
            "output_path".into(),
            Value::from(destination.display().to_string()),
        );
        meta.insert("max_iterations".into(), Value::from(self.options.max_iterations));
        meta.insert(
            "quality_threshold".into(),
            Value::from(self.options.quality_threshold),
        );
        meta.insert("render_size".into(), Value::from(size.to_string()));
        meta.insert("best_iteration".into(), Value::from(state.best_iteration));
        meta.insert("placeholder".into(), Value::from(state.best.is_placeholder()));
        meta.insert(
            "scene".into(),
            serde_json::to_value(&scene).unwrap_or(Value::Null),
        );
        meta.insert(
            "elapsed_secs".into(),
            Value::from(started.elapsed().as_secs_f64()),
        );
        info!(
            iterations = result.iterations,
            quality = result.quality_score,
            reason = %terminal_reason,
            output = %destination.display(),
            "vectorization finished"
        );
        Ok(result)
    }

    fn scratch_dir(&self, run_id: &str) -> Option<PathBuf> {
        let dir = self.options.temp_dir.as_ref()?.join(run_id);
        match std::fs::create_dir_all(&dir) {
            Ok(()) => Some(dir),
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "cannot create iteration directory");
                None
            }
        }
    }

    fn finalize(
        &self,
        source: &SourceImage,
        destination: &Path,
        size: RasterSize,
        state: &LoopState,
    ) -> Result<FinalResult> {
        let markup = self
            .generator
            .optimize(&state.best.markup, self.options.optimize_level);
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(destination, &markup)?;
        info!(path = %destination.display(), bytes = markup.len(), "markup written");

        let (quality_score, metrics) = match self.renderer.render(&markup, size) {
            Ok(raster) => {
                let comparison = self.scorer.compare(&source.pixels, &raster);
                (comparison.quality_score, metrics_of(&comparison))
            }
            Err(err) => {
                warn!(error = %err, "final render failed; reporting best score");
                let metrics = state
                    .best_comparison
                    .as_ref()
                    .map(metrics_of)
                    .unwrap_or_default();
                (state.best_score, metrics)
            }
        };

        let mut metadata = IndexMap::new();
        if let Some(reason) = state.terminal_reason {
            metadata.insert("terminal_reason".to_string(), Value::from(reason.as_str()));
        }
        Ok(FinalResult {
            markup,
            quality_score,
            iterations: state.iteration,
            terminal_reason: state
                .terminal_reason
                .unwrap_or(TerminalReason::BudgetExhausted),
            metrics,
            history: state.history.clone(),
            metadata,
        })
    }
}

fn metrics_of(comparison: &ComparisonResult) -> FinalMetrics {
    FinalMetrics {
        structural_similarity: comparison.structural_similarity,
        pixel_similarity: comparison.pixel_similarity,
    }
}

fn save_iteration_raster(dir: &Path, iteration: u32, raster: &RgbaImage) {
    let path = dir.join(format!("iteration_{iteration}.png"));
    if let Err(err) = raster.save(&path) {
        warn!(path = %path.display(), error = %err, "cannot save iteration raster");
    }
}
