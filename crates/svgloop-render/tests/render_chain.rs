use image::{Rgba, RgbaImage};
use svgloop_core::{RasterSize, Renderer, Scorer};
use svgloop_render::{RenderChain, RenderOptions, SimilarityScorer};

fn chain() -> RenderChain {
    RenderChain::standard(&RenderOptions {
        load_system_fonts: false,
        ..RenderOptions::default()
    })
}

const SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><rect width="10" height="10" fill="#c81e1e"/></svg>"##;

#[test]
fn exact_rendition_scores_near_one() {
    let reference = RgbaImage::from_pixel(24, 16, Rgba([200, 30, 30, 255]));
    let rendered = chain().render(SQUARE, RasterSize::new(24, 16)).unwrap();
    assert_eq!(rendered.dimensions(), (24, 16));

    let result = SimilarityScorer::default().compare(&reference, &rendered);
    assert!(result.quality_score > 0.99, "{result:?}");
    assert!(result.difference_regions.is_empty());
}

#[test]
fn builtin_interpreter_covers_markup_usvg_refuses() {
    // A zero intrinsic size is an error for usvg; the interpreter falls back to the viewBox.
    let markup = r##"<svg xmlns="http://www.w3.org/2000/svg" width="0" height="0" viewBox="0 0 10 10"><rect width="10" height="10" fill="#000"/></svg>"##;
    let rendered = chain().render(markup, RasterSize::new(4, 4)).unwrap();
    assert_eq!(rendered.get_pixel(2, 2).0, [0, 0, 0, 255]);
}

#[test]
fn unparseable_markup_is_a_candidate_failure() {
    let err = chain()
        .render("<svg><rect></svg>", RasterSize::new(4, 4))
        .unwrap_err();
    assert!(!err.is_fatal());
    let strategies: Vec<&str> = err.attempts().iter().map(|a| a.strategy.as_str()).collect();
    assert_eq!(strategies, vec!["resvg", "resvg-sanitized", "builtin"]);
}

#[test]
fn blank_candidate_is_penalized() {
    let reference = RgbaImage::from_fn(32, 32, |x, y| {
        if (8..24).contains(&x) && (8..24).contains(&y) {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let blank = chain()
        .render(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 32 32"/>"#,
            RasterSize::new(32, 32),
        )
        .unwrap();
    let result = SimilarityScorer::default().compare(&reference, &blank);
    assert!(result.quality_score < 0.85);
    assert!(!result.difference_regions.is_empty());
}
