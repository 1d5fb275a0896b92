use crate::builtin::BuiltinStrategy;
use crate::raster::parse_tiny_skia_color;
use crate::strategy::{
    FontDatabase, RenderStrategy, ResvgStrategy, SanitizedResvgStrategy, system_font_database,
};
use image::RgbaImage;
use std::sync::{Arc, OnceLock};
use svgloop_core::{RasterSize, RenderAttempt, RenderError, Renderer};

/// Known-good markup used to tell "this candidate is broken" from "nothing can render".
pub const PROBE_MARKUP: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 8 8"><rect width="8" height="8" fill="#808080"/></svg>"##;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Canvas color under transparent regions. Scoring assumes white.
    pub background: String,
    pub load_system_fonts: bool,
    pub font_family: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            background: "white".to_string(),
            load_system_fonts: true,
            font_family: "Arial".to_string(),
        }
    }
}

/// Ordered fallback of rendering strategies.
///
/// The first strategy that succeeds wins. When all of them fail, the chain renders
/// [`PROBE_MARKUP`] once to classify the failure: if the probe works, the candidate is at fault
/// ([`RenderError::Candidate`]); otherwise rendering is unavailable altogether
/// ([`RenderError::Unavailable`]).
pub struct RenderChain {
    strategies: Vec<Arc<dyn RenderStrategy>>,
    probe: OnceLock<bool>,
}

impl RenderChain {
    pub fn new(strategies: Vec<Arc<dyn RenderStrategy>>) -> Self {
        Self {
            strategies,
            probe: OnceLock::new(),
        }
    }

    /// resvg, then resvg again on sanitized markup, then the builtin interpreter.
    ///
    /// The second step is the same rasterizer fed repaired text; only the builtin interpreter is
    /// an independent renderer.
    pub fn standard(options: &RenderOptions) -> Self {
        let fontdb: FontDatabase = if options.load_system_fonts {
            system_font_database()
        } else {
            Arc::new(usvg::fontdb::Database::new())
        };
        let background = parse_tiny_skia_color(&options.background).unwrap_or_else(|| {
            tracing::warn!(
                background = %options.background,
                "unrecognized background color; using white"
            );
            tiny_skia::Color::WHITE
        });
        let resvg = ResvgStrategy::new(fontdb, background).with_font_family(&options.font_family);
        Self::new(vec![
            Arc::new(resvg.clone()),
            Arc::new(SanitizedResvgStrategy::new(resvg)),
            Arc::new(BuiltinStrategy::new(background)),
        ])
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn RenderStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Whether any strategy can render [`PROBE_MARKUP`]. Computed once per chain.
    pub fn is_available(&self) -> bool {
        *self.probe.get_or_init(|| {
            let size = RasterSize::new(8, 8);
            let ok = self
                .strategies
                .iter()
                .any(|s| s.try_render(PROBE_MARKUP, size).is_ok());
            if !ok {
                tracing::error!(
                    strategies = ?self.strategy_names(),
                    "no rendering strategy can rasterize the probe image"
                );
            }
            ok
        })
    }
}

impl Default for RenderChain {
    fn default() -> Self {
        Self::standard(&RenderOptions::default())
    }
}

impl Renderer for RenderChain {
    fn render(&self, markup: &str, size: RasterSize) -> Result<RgbaImage, RenderError> {
        let mut attempts = Vec::new();
        for strategy in &self.strategies {
            match strategy.try_render(markup, size) {
                Ok(img) if img.dimensions() == (size.width, size.height) => {
                    if !attempts.is_empty() {
                        tracing::debug!(
                            strategy = strategy.name(),
                            failed = attempts.len(),
                            "rendered with fallback strategy"
                        );
                    }
                    return Ok(img);
                }
                Ok(img) => attempts.push(RenderAttempt {
                    strategy: strategy.name().to_string(),
                    message: format!(
                        "produced {}x{} instead of {size}",
                        img.width(),
                        img.height()
                    ),
                }),
                Err(err) => {
                    tracing::debug!(strategy = strategy.name(), error = %err, "render attempt failed");
                    attempts.push(RenderAttempt {
                        strategy: strategy.name().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if self.strategies.is_empty() || !self.is_available() {
            Err(RenderError::Unavailable { attempts })
        } else {
            Err(RenderError::Candidate { attempts })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{RasterError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Broken;

    impl RenderStrategy for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn try_render(&self, _markup: &str, _size: RasterSize) -> Result<RgbaImage> {
            Err(RasterError::SvgParse("always".into()))
        }
    }

    /// Renders only markup containing "ok"; counts calls.
    #[derive(Default)]
    struct Picky {
        calls: AtomicUsize,
    }

    impl RenderStrategy for Picky {
        fn name(&self) -> &str {
            "picky"
        }

        fn try_render(&self, markup: &str, size: RasterSize) -> Result<RgbaImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if markup.contains("ok") || markup == PROBE_MARKUP {
                Ok(RgbaImage::new(size.width, size.height))
            } else {
                Err(RasterError::EmptyCanvas)
            }
        }
    }

    #[test]
    fn empty_chain_is_unavailable() {
        let err = RenderChain::new(Vec::new())
            .render(PROBE_MARKUP, RasterSize::new(2, 2))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.attempts().is_empty());
    }

    #[test]
    fn falls_through_to_later_strategies() {
        let chain = RenderChain::new(vec![Arc::new(Broken), Arc::new(Picky::default())]);
        let img = chain.render("<svg>ok</svg>", RasterSize::new(3, 2)).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
    }

    #[test]
    fn candidate_failure_is_distinguished_from_unavailability() {
        let picky = Arc::new(Picky::default());
        let chain = RenderChain::new(vec![Arc::new(Broken), picky.clone()]);
        let err = chain.render("<svg/>", RasterSize::new(2, 2)).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(err.attempts().len(), 2);
        assert_eq!(err.attempts()[0].strategy, "broken");

        // The probe runs once per chain.
        chain.render("<svg/>", RasterSize::new(2, 2)).unwrap_err();
        assert_eq!(picky.calls.load(Ordering::SeqCst), 3);

        let all_broken = RenderChain::new(vec![Arc::new(Broken)]);
        let err = all_broken.render("<svg/>", RasterSize::new(2, 2)).unwrap_err();
        assert!(err.is_fatal());
    }
}
