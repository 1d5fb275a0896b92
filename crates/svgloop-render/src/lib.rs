#![forbid(unsafe_code)]

//! Rasterization and scoring for svgloop.
//!
//! [`RenderChain`] implements the core `Renderer` seam as an ordered fallback of strategies
//! (resvg, resvg after sanitizing, a builtin interpreter). [`SimilarityScorer`] implements the
//! `Scorer` seam with SSIM and mean pixel similarity.

pub mod builtin;
pub mod chain;
pub mod raster;
pub mod sanitize;
pub mod scorer;
pub mod strategy;

pub use builtin::BuiltinStrategy;
pub use chain::{PROBE_MARKUP, RenderChain, RenderOptions};
pub use raster::{RasterError, parse_tiny_skia_color};
pub use sanitize::sanitize_markup;
pub use scorer::SimilarityScorer;
pub use strategy::{
    FontDatabase, RenderStrategy, ResvgStrategy, SanitizedResvgStrategy, system_font_database,
};
