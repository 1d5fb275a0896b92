use super::*;
use crate::error::ErrorKind;
use crate::model::TerminalReason;
use crate::refine::{GENERIC_INSTRUCTION, LoopOptions, LoopState, RefinementLoop, instructions_for};

struct Harness {
    analyzer: FakeAnalyzer,
    generator: FakeGenerator,
    renderer: FakeRenderer,
    scorer: ScriptedScorer,
    dir: tempfile::TempDir,
}

impl Harness {
    fn new(scores: &[f64]) -> Self {
        Self {
            analyzer: FakeAnalyzer::default(),
            generator: FakeGenerator::default(),
            renderer: FakeRenderer::default(),
            scorer: ScriptedScorer::new(scores),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn source(&self) -> PathBuf {
        write_png(self.dir.path(), "source.png")
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("out/result.svg")
    }

    fn looper(&self, max_iterations: u32, quality_threshold: f64) -> RefinementLoop<'_> {
        RefinementLoop::new(&self.analyzer, &self.generator, &self.renderer, &self.scorer)
            .with_options(LoopOptions {
                max_iterations,
                quality_threshold,
                ..LoopOptions::default()
            })
    }
}

#[test]
fn best_score_is_the_running_maximum() {
    let h = Harness::new(&[0.5, 0.3, 0.7, 0.6]);
    let mut seen = Vec::new();
    let mut on_progress = |iteration: u32, quality: f64| seen.push((iteration, quality));
    let result = h
        .looper(4, 0.95)
        .run(&h.source(), &h.output(), Some(&mut on_progress))
        .unwrap();

    assert_eq!(seen, vec![(1, 0.5), (2, 0.3), (3, 0.7), (4, 0.6)]);
    assert_eq!(result.iterations, 4);
    assert_eq!(result.terminal_reason, TerminalReason::BudgetExhausted);
    assert_eq!(candidate_number(&result.markup), Some(2));
    assert_eq!(result.quality_score, 0.7);
    assert_eq!(result.metadata["best_iteration"], 3);
    let written = std::fs::read_to_string(h.output()).unwrap();
    assert_eq!(written, result.markup);
}

#[test]
fn observe_never_lowers_the_best() {
    let mut state = LoopState::new(Candidate::new("<svg data-n=\"0\"/>"));
    let mut running_max: f64 = 0.0;
    for (i, score) in [0.5, 0.3, 0.7, 0.6, 0.7].into_iter().enumerate() {
        state.iteration = i as u32 + 1;
        state.current = Candidate::new(format!("<svg data-n=\"{i}\"/>"));
        state.observe(&ComparisonResult {
            structural_similarity: score,
            pixel_similarity: score,
            quality_score: score,
            difference_regions: Vec::new(),
        });
        running_max = running_max.max(score);
        assert_eq!(state.best_score, running_max);
    }
    // Ties do not replace the earlier best.
    assert_eq!(state.best_iteration, 3);
    assert_eq!(candidate_number(&state.best.markup), Some(2));
}

#[test]
fn stops_as_soon_as_threshold_is_reached() {
    let h = Harness::new(&[0.9]);
    let result = h.looper(10, 0.85).run(&h.source(), &h.output(), None).unwrap();

    assert_eq!(result.iterations, 1);
    assert_eq!(result.terminal_reason, TerminalReason::ThresholdReached);
    assert_eq!(h.generator.revise_calls(), 0);
    assert_eq!(result.history.len(), 1);
}

#[test]
fn exhausts_budget_without_revising_after_the_last_iteration() {
    let h = Harness::new(&[0.1, 0.2, 0.3]);
    let result = h.looper(3, 0.85).run(&h.source(), &h.output(), None).unwrap();

    assert_eq!(result.iterations, 3);
    assert_eq!(result.terminal_reason, TerminalReason::BudgetExhausted);
    // Three scored iterations plus the final metrics pass.
    assert_eq!(h.scorer.calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.generator.revise_calls(), 2);
    assert_eq!(candidate_number(&result.markup), Some(2));
}

#[test]
fn artifact_is_written_even_when_nothing_scores() {
    let h = Harness::new(&[]);
    let result = h.looper(3, 0.85).run(&h.source(), &h.output(), None).unwrap();

    assert!(h.output().is_file());
    assert_eq!(result.quality_score, 0.0);
    // Nothing ever beat 0.0, so the initial candidate is kept.
    assert_eq!(candidate_number(&result.markup), Some(0));
    assert_eq!(result.metadata["best_iteration"], 0);
}

#[test]
fn fatal_render_failure_aborts_without_artifact() {
    let mut h = Harness::new(&[0.5]);
    h.renderer.unavailable = true;
    let err = h
        .looper(3, 0.85)
        .run(&h.source(), &h.output(), None)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RenderFatal);
    assert!(!h.output().exists());
    assert_eq!(h.generator.revise_calls(), 0);
}

#[test]
fn unrenderable_candidate_is_a_zero_improvement_iteration() {
    let mut h = Harness::new(&[0.0, 0.6]);
    h.renderer.reject.insert(0);
    let mut seen = Vec::new();
    let mut on_progress = |iteration: u32, quality: f64| seen.push((iteration, quality));
    let result = h
        .looper(2, 0.95)
        .run(&h.source(), &h.output(), Some(&mut on_progress))
        .unwrap();

    assert_eq!(seen, vec![(2, 0.6)]);
    let revisions = h.generator.revisions.lock().unwrap();
    assert_eq!(revisions[0].0, vec![GENERIC_INSTRUCTION.to_string()]);
    assert!(!result.history[0].scored);
    assert_eq!(result.history[0].quality_score, 0.0);
    assert_eq!(candidate_number(&result.markup), Some(1));
}

#[test]
fn invalid_input_fails_before_any_backend_call() {
    let h = Harness::new(&[0.9]);
    let missing = h.dir.path().join("missing.png");
    let err = h.looper(3, 0.85).run(&missing, &h.output(), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputValidation);
    assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);

    let err = h
        .looper(0, 0.85)
        .run(&h.source(), &h.output(), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputValidation);
    assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn backend_outage_during_revision_still_finalizes() {
    let mut h = Harness::new(&[0.4, 0.5]);
    h.generator.fail_revision = Some(2);
    let result = h.looper(5, 0.95).run(&h.source(), &h.output(), None).unwrap();

    assert_eq!(result.terminal_reason, TerminalReason::BackendUnavailable);
    assert_eq!(result.iterations, 2);
    assert_eq!(candidate_number(&result.markup), Some(1));
    assert!(h.output().is_file());
}

#[test]
fn revision_context_is_a_bounded_window_of_earlier_iterations() {
    let h = Harness::new(&[0.1, 0.2, 0.3, 0.4]);
    h.looper(4, 0.95).run(&h.source(), &h.output(), None).unwrap();

    let revisions = h.generator.revisions.lock().unwrap();
    let context_sizes: Vec<usize> = revisions.iter().map(|(_, ctx)| ctx.len()).collect();
    assert_eq!(context_sizes, vec![0, 1, 2]);
    for (instructions, _) in revisions.iter() {
        assert_eq!(instructions, &vec!["adjust colors in region center".to_string()]);
    }
}

#[test]
fn renders_follow_source_aspect_ratio() {
    let h = Harness::new(&[0.9]);
    h.looper(1, 0.85).run(&h.source(), &h.output(), None).unwrap();
    let sizes = h.renderer.sizes.lock().unwrap();
    assert!(sizes.iter().all(|s| *s == RasterSize::new(8, 6)));
}

#[test]
fn iteration_rasters_are_kept_per_run() {
    let h = Harness::new(&[0.1, 0.2]);
    let scratch = h.dir.path().join("scratch");
    let looper = RefinementLoop::new(&h.analyzer, &h.generator, &h.renderer, &h.scorer)
        .with_options(LoopOptions {
            max_iterations: 2,
            quality_threshold: 0.9,
            temp_dir: Some(scratch.clone()),
            ..LoopOptions::default()
        });
    let result = looper.run(&h.source(), &h.output(), None).unwrap();

    let run_id = result.metadata["run_id"].as_str().unwrap();
    assert!(scratch.join(run_id).join("iteration_1.png").is_file());
    assert!(scratch.join(run_id).join("iteration_2.png").is_file());
}

#[test]
fn difference_regions_map_to_instructions_in_order() {
    let region = |area, issue| DifferenceRegion {
        area,
        issue,
        ratio: 0.05,
        severity: Severity::Medium,
    };
    let instructions = instructions_for(&[
        region(Area::TopLeft, IssueKind::MissingDetails),
        region(Area::TopRight, IssueKind::Other("alignment".into())),
        region(Area::BottomLeft, IssueKind::ShapePrecision),
        region(Area::Center, IssueKind::ColorMismatch),
    ]);
    assert_eq!(
        instructions,
        vec![
            "add missing details in top_left",
            "improve shape precision in bottom_left",
            "adjust colors in region center",
        ]
    );
}
