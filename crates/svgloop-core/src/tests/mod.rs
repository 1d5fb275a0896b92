//! In-memory fakes for the loop's collaborators.
//!
//! The fake generator numbers its candidates (`data-n="<n>"`, 0 for the initial one), the fake
//! renderer encodes that number into the red channel of a 1x1 raster, and the scripted scorer
//! looks the number up in its score table. A candidate's score therefore does not depend on
//! when it is rendered.

mod refine;

use crate::analyzer::SceneAnalyzer;
use crate::error::{BackendError, Error, RenderAttempt, RenderError, Result};
use crate::generator::{CandidateGenerator, OptimizeLevel};
use crate::input::SourceImage;
use crate::model::{
    Area, Candidate, ComparisonResult, DifferenceRegion, IssueKind, RasterSize, SceneDescription,
    Severity,
};
use crate::oracle::{Renderer, Scorer};
use image::{Rgba, RgbaImage};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbaImage::from_pixel(8, 6, Rgba([200, 30, 30, 255]))
        .save(&path)
        .unwrap();
    path
}

pub(crate) fn candidate_number(markup: &str) -> Option<u8> {
    let start = markup.find("data-n=\"")? + "data-n=\"".len();
    let end = markup[start..].find('"')? + start;
    markup[start..end].parse().ok()
}

#[derive(Default)]
pub(crate) struct FakeAnalyzer {
    pub calls: AtomicUsize,
}

impl SceneAnalyzer for FakeAnalyzer {
    fn analyze(&self, _image: &SourceImage) -> Result<SceneDescription> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SceneDescription {
            shapes: vec!["circle".into()],
            colors: vec!["#C81E1E".into()],
            ..SceneDescription::default()
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeGenerator {
    next: AtomicUsize,
    pub revisions: Mutex<Vec<(Vec<String>, Vec<Vec<String>>)>>,
    /// Revision calls (1-based) that fail with a connectivity error.
    pub fail_revision: Option<usize>,
}

impl FakeGenerator {
    fn numbered(&self) -> Candidate {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Candidate::new(format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" data-n="{n}"><rect width="1" height="1"/></svg>"#
        ))
    }

    pub fn revise_calls(&self) -> usize {
        self.revisions.lock().unwrap().len()
    }
}

impl CandidateGenerator for FakeGenerator {
    fn generate(&self, _scene: &SceneDescription) -> Result<Candidate> {
        Ok(self.numbered())
    }

    fn revise(
        &self,
        _markup: &str,
        instructions: &[String],
        history: &[Vec<String>],
    ) -> Result<Candidate> {
        let call = {
            let mut revisions = self.revisions.lock().unwrap();
            revisions.push((instructions.to_vec(), history.to_vec()));
            revisions.len()
        };
        if self.fail_revision == Some(call) {
            return Err(Error::Backend(BackendError::Connectivity {
                provider: "fake".into(),
                message: "connection reset".into(),
            }));
        }
        Ok(self.numbered())
    }

    fn optimize(&self, markup: &str, _level: OptimizeLevel) -> String {
        markup.to_string()
    }
}

#[derive(Default)]
pub(crate) struct FakeRenderer {
    pub unavailable: bool,
    /// Candidate numbers whose markup is rejected.
    pub reject: HashSet<u8>,
    pub sizes: Mutex<Vec<RasterSize>>,
}

impl Renderer for FakeRenderer {
    fn render(&self, markup: &str, size: RasterSize) -> std::result::Result<RgbaImage, RenderError> {
        self.sizes.lock().unwrap().push(size);
        let attempt = |message: &str| RenderAttempt {
            strategy: "fake".into(),
            message: message.into(),
        };
        if self.unavailable {
            return Err(RenderError::Unavailable {
                attempts: vec![attempt("no backend")],
            });
        }
        let n = candidate_number(markup).ok_or_else(|| RenderError::Candidate {
            attempts: vec![attempt("unnumbered markup")],
        })?;
        if self.reject.contains(&n) {
            return Err(RenderError::Candidate {
                attempts: vec![attempt("malformed path data")],
            });
        }
        Ok(RgbaImage::from_pixel(1, 1, Rgba([n, 0, 0, 255])))
    }
}

pub(crate) struct ScriptedScorer {
    /// Score per candidate number; missing entries score 0.0.
    pub scores: Vec<f64>,
    pub regions: Vec<DifferenceRegion>,
    pub calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn new(scores: &[f64]) -> Self {
        Self {
            scores: scores.to_vec(),
            regions: vec![DifferenceRegion {
                area: Area::Center,
                issue: IssueKind::ColorMismatch,
                ratio: 0.2,
                severity: Severity::High,
            }],
            calls: AtomicUsize::new(0),
        }
    }
}

impl Scorer for ScriptedScorer {
    fn compare(&self, _reference: &RgbaImage, candidate: &RgbaImage) -> ComparisonResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n = candidate.get_pixel(0, 0)[0] as usize;
        let quality = self.scores.get(n).copied().unwrap_or(0.0);
        ComparisonResult {
            structural_similarity: quality,
            pixel_similarity: quality,
            quality_score: quality,
            difference_regions: self.regions.clone(),
        }
    }
}
