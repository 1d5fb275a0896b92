//! Seams for rasterization and image comparison.
//!
//! The core never links a rasterizer; `svgloop-render` provides the production implementations.

use crate::error::RenderError;
use crate::model::{ComparisonResult, RasterSize};
use image::RgbaImage;
use std::sync::Arc;

pub trait Renderer: Send + Sync {
    /// Rasterizes `markup` to exactly `size`.
    fn render(&self, markup: &str, size: RasterSize) -> Result<RgbaImage, RenderError>;
}

pub trait Scorer: Send + Sync {
    fn compare(&self, reference: &RgbaImage, candidate: &RgbaImage) -> ComparisonResult;
}

impl<R: Renderer + ?Sized> Renderer for Arc<R> {
    fn render(&self, markup: &str, size: RasterSize) -> Result<RgbaImage, RenderError> {
        (**self).render(markup, size)
    }
}

impl<S: Scorer + ?Sized> Scorer for Arc<S> {
    fn compare(&self, reference: &RgbaImage, candidate: &RgbaImage) -> ComparisonResult {
        (**self).compare(reference, candidate)
    }
}
