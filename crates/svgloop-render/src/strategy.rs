use crate::raster::{RasterError, Result, canvas, into_rgba};
use crate::sanitize::sanitize_markup;
use image::RgbaImage;
use std::sync::Arc;
use svgloop_core::RasterSize;

/// One way of turning markup into pixels. A [`crate::RenderChain`] tries several in order.
pub trait RenderStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Rasterizes `markup` onto an opaque canvas of exactly `size`.
    fn try_render(&self, markup: &str, size: RasterSize) -> Result<RgbaImage>;
}

/// Font database shared by every resvg-backed strategy of a chain.
pub type FontDatabase = Arc<usvg::fontdb::Database>;

pub fn system_font_database() -> FontDatabase {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    Arc::new(db)
}

/// Full SVG rendering through usvg + resvg.
#[derive(Clone)]
pub struct ResvgStrategy {
    fontdb: FontDatabase,
    font_family: String,
    background: tiny_skia::Color,
}

impl ResvgStrategy {
    pub fn new(fontdb: FontDatabase, background: tiny_skia::Color) -> Self {
        Self {
            fontdb,
            // Keep output stable-ish across environments while still using system fonts.
            font_family: "Arial".to_string(),
            background,
        }
    }

    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    fn rasterize(&self, svg: &str, size: RasterSize) -> Result<RgbaImage> {
        let mut opt = usvg::Options::default();
        opt.fontdb = self.fontdb.clone();
        opt.font_family = self.font_family.clone();

        let tree =
            usvg::Tree::from_str(svg, &opt).map_err(|err| RasterError::SvgParse(err.to_string()))?;

        // usvg already maps the root viewBox into the tree size; stretch that to the target.
        let tree_size = tree.size();
        let (w, h) = (tree_size.width(), tree_size.height());
        if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
            return Err(RasterError::EmptyCanvas);
        }

        let mut pixmap = canvas(size, self.background)?;
        let transform =
            tiny_skia::Transform::from_scale(size.width as f32 / w, size.height as f32 / h);
        resvg::render(&tree, transform, &mut pixmap.as_mut());
        into_rgba(pixmap)
    }
}

impl RenderStrategy for ResvgStrategy {
    fn name(&self) -> &str {
        "resvg"
    }

    fn try_render(&self, markup: &str, size: RasterSize) -> Result<RgbaImage> {
        self.rasterize(markup, size)
    }
}

/// resvg after textual repair of the markup (namespaces, stray `&`, scripts).
#[derive(Clone)]
pub struct SanitizedResvgStrategy {
    inner: ResvgStrategy,
}

impl SanitizedResvgStrategy {
    pub fn new(inner: ResvgStrategy) -> Self {
        Self { inner }
    }
}

impl RenderStrategy for SanitizedResvgStrategy {
    fn name(&self) -> &str {
        "resvg-sanitized"
    }

    fn try_render(&self, markup: &str, size: RasterSize) -> Result<RgbaImage> {
        self.inner.rasterize(&sanitize_markup(markup), size)
    }
}
