#![forbid(unsafe_code)]

//! `svgloop` turns raster images into SVG by iterating with a vision-capable language model:
//! analyze, generate, render, compare, revise.
//!
//! # Features
//!
//! - `render` (default): rasterization and scoring (`svgloop::render`) and the [`Vectorizer`]
//!   convenience type
//! - `http` (default): hosted and local model providers over blocking HTTP

pub use svgloop_core::*;

#[cfg(feature = "render")]
pub mod render {
    pub use svgloop_render::*;
}

#[cfg(feature = "render")]
mod vectorizer;

#[cfg(feature = "render")]
pub use vectorizer::Vectorizer;
