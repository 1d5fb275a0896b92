//! Perceptual comparison between the source raster and a rendered candidate.

use image::imageops::{self, FilterType};
use image::{RgbImage, RgbaImage};
use svgloop_core::{Area, ComparisonResult, DifferenceRegion, IssueKind, Scorer, Severity};

const LUMA: [f64; 3] = [0.2989, 0.5870, 0.1140];
const DATA_RANGE: f64 = 255.0;
const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// SSIM + mean pixel similarity, with per-zone difference analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityScorer {
    pub ssim_weight: f64,
    pub pixel_weight: f64,
    /// Side of the square SSIM window; shrunk for images smaller than it.
    pub window: u32,
    /// A pixel differs when any channel differs by more than this.
    pub channel_threshold: u8,
    /// Zones whose differing fraction is at or below this are not reported.
    pub zone_ratio: f64,
    /// Zones above this fraction are reported with high severity.
    pub high_severity_ratio: f64,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self {
            ssim_weight: 0.6,
            pixel_weight: 0.4,
            window: 7,
            channel_threshold: 30,
            zone_ratio: 0.01,
            high_severity_ratio: 0.1,
        }
    }
}

impl Scorer for SimilarityScorer {
    fn compare(&self, reference: &RgbaImage, candidate: &RgbaImage) -> ComparisonResult {
        let (reference, candidate) = comparable_pair(reference, candidate);

        let ssim = sanitize_unit(structural_similarity(
            &grayscale(&reference),
            &grayscale(&candidate),
            reference.width() as usize,
            reference.height() as usize,
            self.window as usize,
        ));
        let pixel = sanitize_unit(pixel_similarity(&reference, &candidate));
        let difference_regions = self.difference_regions(&reference, &candidate);
        let quality = sanitize_unit(self.ssim_weight * ssim + self.pixel_weight * pixel);

        tracing::trace!(ssim, pixel, quality, regions = difference_regions.len(), "compared");
        ComparisonResult {
            structural_similarity: ssim,
            pixel_similarity: pixel,
            quality_score: quality,
            difference_regions,
        }
    }
}

impl SimilarityScorer {
    fn difference_regions(&self, a: &RgbImage, b: &RgbImage) -> Vec<DifferenceRegion> {
        let (w, h) = a.dimensions();
        let threshold = self.channel_threshold;
        let mut regions = Vec::new();

        for area in Area::ALL {
            let (x0, y0, x1, y1) = zone_bounds(area, w, h);
            let pixels = u64::from(x1 - x0) * u64::from(y1 - y0);
            if pixels == 0 {
                continue;
            }
            let mut differing = 0u64;
            let mut abs_sum = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    let pa = a.get_pixel(x, y).0;
                    let pb = b.get_pixel(x, y).0;
                    let mut over = false;
                    for c in 0..3 {
                        let d = pa[c].abs_diff(pb[c]);
                        abs_sum += u64::from(d);
                        over |= d > threshold;
                    }
                    differing += u64::from(over);
                }
            }

            let ratio = differing as f64 / pixels as f64;
            if ratio <= self.zone_ratio {
                continue;
            }
            let mean_diff = abs_sum as f64 / (pixels * 3) as f64;
            regions.push(DifferenceRegion {
                area,
                issue: classify_issue(mean_diff),
                ratio,
                severity: if ratio > self.high_severity_ratio {
                    Severity::High
                } else {
                    Severity::Medium
                },
            });
        }
        regions
    }
}

fn classify_issue(mean_diff: f64) -> IssueKind {
    if mean_diff < 50.0 {
        IssueKind::ColorMismatch
    } else if mean_diff < 100.0 {
        IssueKind::ShapePrecision
    } else {
        IssueKind::MissingDetails
    }
}

/// Half-open pixel bounds `(x0, y0, x1, y1)` of a zone.
fn zone_bounds(area: Area, w: u32, h: u32) -> (u32, u32, u32, u32) {
    match area {
        Area::TopLeft => (0, 0, w / 2, h / 2),
        Area::TopRight => (w / 2, 0, w, h / 2),
        Area::BottomLeft => (0, h / 2, w / 2, h),
        Area::BottomRight => (w / 2, h / 2, w, h),
        Area::Center => (w / 4, h / 4, 3 * w / 4, 3 * h / 4),
    }
}

fn sanitize_unit(v: f64) -> f64 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}

/// Composites over white and brings both images to the smaller common size.
fn comparable_pair(a: &RgbaImage, b: &RgbaImage) -> (RgbImage, RgbImage) {
    let w = a.width().min(b.width()).max(1);
    let h = a.height().min(b.height()).max(1);
    let fit = |img: &RgbaImage| {
        let rgb = flatten_on_white(img);
        if rgb.dimensions() == (w, h) {
            rgb
        } else {
            imageops::resize(&rgb, w, h, FilterType::Lanczos3)
        }
    };
    (fit(a), fit(b))
}

fn flatten_on_white(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn grayscale(img: &RgbImage) -> Vec<f64> {
    img.pixels()
        .map(|p| {
            LUMA[0] * f64::from(p.0[0]) + LUMA[1] * f64::from(p.0[1]) + LUMA[2] * f64::from(p.0[2])
        })
        .collect()
}

/// `1 - mean(|a - b|) / 255` over every RGB channel.
pub fn pixel_similarity(a: &RgbImage, b: &RgbImage) -> f64 {
    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| u64::from(x.abs_diff(*y)))
        .sum();
    let n = a.as_raw().len().max(1) as f64;
    1.0 - total as f64 / n / DATA_RANGE
}

/// Summed-area table with a zero row and column in front.
struct Integral {
    stride: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn new(mut values: impl Iterator<Item = f64>, w: usize, h: usize) -> Self {
        let stride = w + 1;
        let mut sums = vec![0.0; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0.0;
            for x in 0..w {
                row += values.next().unwrap_or(0.0);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    fn window(&self, x: usize, y: usize, win: usize) -> f64 {
        let s = self.stride;
        self.sums[(y + win) * s + x + win] - self.sums[y * s + x + win]
            - self.sums[(y + win) * s + x]
            + self.sums[y * s + x]
    }
}

/// Mean SSIM over every valid position of a `win`x`win` uniform window.
///
/// Uses sample (N-1) covariance, K1 = 0.01, K2 = 0.03 and a data range of 255.
pub fn structural_similarity(a: &[f64], b: &[f64], w: usize, h: usize, win: usize) -> f64 {
    if w == 0 || h == 0 || a.len() != w * h || b.len() != w * h {
        return 0.0;
    }
    let win = win.min(w).min(h).max(1);
    let n = (win * win) as f64;
    let cov_norm = if win > 1 { n / (n - 1.0) } else { 1.0 };
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    let sa = Integral::new(a.iter().copied(), w, h);
    let sb = Integral::new(b.iter().copied(), w, h);
    let saa = Integral::new(a.iter().map(|v| v * v), w, h);
    let sbb = Integral::new(b.iter().map(|v| v * v), w, h);
    let sab = Integral::new(a.iter().zip(b).map(|(x, y)| x * y), w, h);

    let mut total = 0.0;
    let mut count = 0usize;
    for y in 0..=(h - win) {
        for x in 0..=(w - win) {
            let ux = sa.window(x, y, win) / n;
            let uy = sb.window(x, y, win) / n;
            let vx = cov_norm * (saa.window(x, y, win) / n - ux * ux);
            let vy = cov_norm * (sbb.window(x, y, win) / n - uy * uy);
            let vxy = cov_norm * (sab.window(x, y, win) / n - ux * uy);
            let num = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
            let den = (ux * ux + uy * uy + c1) * (vx + vy + c2);
            total += num / den;
            count += 1;
        }
    }
    total / count.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn split_image(w: u32, h: u32, left: [u8; 4], right: [u8; 4]) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, _| Rgba(if x < w / 2 { left } else { right }))
    }

    #[test]
    fn identical_images_score_one_without_regions() {
        let img = split_image(32, 24, [255, 0, 0, 255], [0, 0, 255, 255]);
        let result = SimilarityScorer::default().compare(&img, &img);
        assert!(result.quality_score > 0.99);
        assert!(result.structural_similarity > 0.99);
        assert_eq!(result.pixel_similarity, 1.0);
        assert!(result.difference_regions.is_empty());
    }

    #[test]
    fn differing_half_is_localized() {
        let reference = split_image(32, 32, [0, 0, 0, 255], [0, 0, 0, 255]);
        let candidate = split_image(32, 32, [0, 0, 0, 255], [255, 255, 255, 255]);
        let result = SimilarityScorer::default().compare(&reference, &candidate);

        assert!(result.quality_score < 0.7);
        assert!((result.pixel_similarity - 0.5).abs() < 1e-9);
        let areas: Vec<Area> = result.difference_regions.iter().map(|r| r.area).collect();
        assert_eq!(areas, vec![Area::TopRight, Area::BottomRight, Area::Center]);
        let top_right = &result.difference_regions[0];
        assert_eq!(top_right.issue, IssueKind::MissingDetails);
        assert_eq!(top_right.severity, Severity::High);
        assert_eq!(top_right.ratio, 1.0);
    }

    #[test]
    fn small_color_shift_is_a_color_mismatch() {
        let reference = RgbaImage::from_pixel(16, 16, Rgba([100, 100, 100, 255]));
        let candidate = RgbaImage::from_pixel(16, 16, Rgba([140, 100, 100, 255]));
        let result = SimilarityScorer::default().compare(&reference, &candidate);
        assert_eq!(result.difference_regions.len(), 5);
        assert!(
            result
                .difference_regions
                .iter()
                .all(|r| r.issue == IssueKind::ColorMismatch)
        );
    }

    #[test]
    fn transparency_is_composited_on_white() {
        let transparent = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        let white = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
        let result = SimilarityScorer::default().compare(&transparent, &white);
        assert_eq!(result.pixel_similarity, 1.0);
        assert!(result.difference_regions.is_empty());
    }

    #[test]
    fn mismatched_sizes_and_tiny_images_stay_in_range() {
        let big = RgbaImage::from_pixel(40, 20, Rgba([10, 200, 30, 255]));
        let small = RgbaImage::from_pixel(3, 2, Rgba([10, 200, 30, 255]));
        let result = SimilarityScorer::default().compare(&big, &small);
        assert!(result.quality_score > 0.99);

        let one = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let other = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255]));
        let result = SimilarityScorer::default().compare(&one, &other);
        assert!((0.0..=1.0).contains(&result.quality_score));
        assert!(result.quality_score < 0.1);
    }
}
