//! A small SVG interpreter drawing basic shapes with tiny-skia.
//!
//! It covers the subset language models usually emit (rect, circle, ellipse, line, polyline,
//! polygon, path, groups, transforms, solid paint) and approximates gradients with their first
//! stop color. Text, images and filters are skipped. It exists so that a candidate usvg refuses
//! still gets a score.

use crate::raster::{RasterError, Result, canvas, into_rgba};
use image::RgbaImage;
use roxmltree::Node;
use std::collections::HashMap;
use std::str::FromStr;
use svgloop_core::RasterSize;
use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::strategy::RenderStrategy;

const KAPPA: f32 = 0.552_284_8;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rgba8 {
    r: u8,
    g: u8,
    b: u8,
    a: f32,
}

impl Rgba8 {
    const BLACK: Rgba8 = Rgba8 {
        r: 0,
        g: 0,
        b: 0,
        a: 1.0,
    };
}

#[derive(Debug, Clone, Copy)]
struct Viewport {
    width: f32,
    height: f32,
}

/// Inherited presentation state.
#[derive(Debug, Clone, Copy)]
struct PaintState {
    fill: Option<Rgba8>,
    stroke: Option<Rgba8>,
    stroke_width: f32,
    fill_opacity: f32,
    stroke_opacity: f32,
    fill_rule: FillRule,
    transform: Transform,
}

impl PaintState {
    fn root(transform: Transform) -> Self {
        Self {
            fill: Some(Rgba8::BLACK),
            stroke: None,
            stroke_width: 1.0,
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
            fill_rule: FillRule::Winding,
            transform,
        }
    }
}

pub struct BuiltinStrategy {
    background: tiny_skia::Color,
}

impl BuiltinStrategy {
    pub fn new(background: tiny_skia::Color) -> Self {
        Self { background }
    }
}

impl RenderStrategy for BuiltinStrategy {
    fn name(&self) -> &str {
        "builtin"
    }

    fn try_render(&self, markup: &str, size: RasterSize) -> Result<RgbaImage> {
        let doc = roxmltree::Document::parse(markup)
            .map_err(|err| RasterError::SvgParse(err.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "svg" {
            return Err(RasterError::SvgParse(format!(
                "root element is <{}>",
                root.tag_name().name()
            )));
        }

        let (vx, vy, vw, vh) = root_view_box(root, size)?;
        let sx = size.width as f32 / vw;
        let sy = size.height as f32 / vh;
        let base = Transform::from_row(sx, 0.0, 0.0, sy, -vx * sx, -vy * sy);

        let mut painter = Painter {
            pixmap: canvas(size, self.background)?,
            gradients: gradient_colors(&doc),
            viewport: Viewport {
                width: vw,
                height: vh,
            },
        };
        let mut state = PaintState::root(base);
        painter.apply_presentation(root, &mut state, true);
        painter.draw_children(root, &state);
        into_rgba(painter.pixmap)
    }
}

fn root_view_box(root: Node<'_, '_>, size: RasterSize) -> Result<(f32, f32, f32, f32)> {
    if let Some(raw) = root.attribute("viewBox") {
        let vb = svgtypes::ViewBox::from_str(raw).map_err(|_| RasterError::InvalidAttribute {
            attribute: "viewBox".to_string(),
            value: raw.to_string(),
        })?;
        if vb.w <= 0.0 || vb.h <= 0.0 {
            return Err(RasterError::EmptyCanvas);
        }
        return Ok((vb.x as f32, vb.y as f32, vb.w as f32, vb.h as f32));
    }
    let w = root.attribute("width").and_then(absolute_length);
    let h = root.attribute("height").and_then(absolute_length);
    match (w, h) {
        (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Ok((0.0, 0.0, w, h)),
        (Some(w), Some(h)) if w <= 0.0 || h <= 0.0 => Err(RasterError::EmptyCanvas),
        _ => Ok((0.0, 0.0, size.width as f32, size.height as f32)),
    }
}

fn absolute_length(raw: &str) -> Option<f32> {
    let len = svgtypes::Length::from_str(raw).ok()?;
    match len.unit {
        svgtypes::LengthUnit::Percent => None,
        _ => Some(len.number as f32),
    }
}

/// First stop color of every gradient, by id.
fn gradient_colors(doc: &roxmltree::Document<'_>) -> HashMap<String, Rgba8> {
    let mut out = HashMap::new();
    for node in doc.descendants().filter(|n| {
        n.is_element() && matches!(n.tag_name().name(), "linearGradient" | "radialGradient")
    }) {
        let Some(id) = node.attribute("id") else {
            continue;
        };
        let stop = node
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "stop")
            .find_map(|stop| {
                let value = style_value(stop, "stop-color")
                    .or_else(|| stop.attribute("stop-color").map(str::to_string))?;
                let mut color = parse_color(&value)?;
                let opacity = style_value(stop, "stop-opacity")
                    .or_else(|| stop.attribute("stop-opacity").map(str::to_string))
                    .and_then(|v| parse_opacity(&v))
                    .unwrap_or(1.0);
                color.a *= opacity;
                Some(color)
            });
        if let Some(color) = stop {
            out.insert(id.to_string(), color);
        }
    }
    out
}

fn style_value(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute("style")?.split(';').find_map(|decl| {
        let (k, v) = decl.split_once(':')?;
        (k.trim() == name).then(|| v.trim().to_string())
    })
}

fn parse_color(value: &str) -> Option<Rgba8> {
    if value.trim().eq_ignore_ascii_case("currentColor") {
        return Some(Rgba8::BLACK);
    }
    let c = svgtypes::Color::from_str(value.trim()).ok()?;
    Some(Rgba8 {
        r: c.red,
        g: c.green,
        b: c.blue,
        a: c.alpha as f32 / 255.0,
    })
}

fn parse_opacity(value: &str) -> Option<f32> {
    let v = value.trim();
    let n = match v.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f32>().ok()? / 100.0,
        None => v.parse::<f32>().ok()?,
    };
    n.is_finite().then(|| n.clamp(0.0, 1.0))
}

struct Painter {
    pixmap: Pixmap,
    gradients: HashMap<String, Rgba8>,
    viewport: Viewport,
}

enum Axis {
    X,
    Y,
    Diagonal,
}

impl Painter {
    /// Resolves a paint server value; `None` means "do not paint".
    fn resolve_paint(&self, value: &str) -> Option<Option<Rgba8>> {
        let v = value.trim();
        if v == "none" || v == "transparent" {
            return Some(None);
        }
        if let Some(rest) = v.strip_prefix("url(") {
            let id = rest
                .split(')')
                .next()
                .unwrap_or_default()
                .trim()
                .trim_matches(|c| c == '\'' || c == '"')
                .trim_start_matches('#');
            // A reference to something unknown paints nothing, like a missing paint server.
            return Some(self.gradients.get(id).copied());
        }
        parse_color(v).map(Some)
    }

    fn presentation(node: Node<'_, '_>, name: &str) -> Option<String> {
        style_value(node, name).or_else(|| node.attribute(name).map(str::to_string))
    }

    fn apply_presentation(&self, node: Node<'_, '_>, state: &mut PaintState, is_root: bool) {
        if let Some(v) = Self::presentation(node, "fill") {
            if let Some(paint) = self.resolve_paint(&v) {
                state.fill = paint;
            }
        }
        if let Some(v) = Self::presentation(node, "stroke") {
            if let Some(paint) = self.resolve_paint(&v) {
                state.stroke = paint;
            }
        }
        if let Some(w) = Self::presentation(node, "stroke-width")
            .as_deref()
            .and_then(|v| self.length_value(v, Axis::Diagonal))
        {
            state.stroke_width = w.max(0.0);
        }
        if let Some(v) = Self::presentation(node, "fill-rule") {
            state.fill_rule = if v.trim() == "evenodd" {
                FillRule::EvenOdd
            } else {
                FillRule::Winding
            };
        }
        let opacity = Self::presentation(node, "opacity")
            .as_deref()
            .and_then(parse_opacity)
            .unwrap_or(1.0);
        let fill_opacity = Self::presentation(node, "fill-opacity")
            .as_deref()
            .and_then(parse_opacity)
            .unwrap_or(1.0);
        let stroke_opacity = Self::presentation(node, "stroke-opacity")
            .as_deref()
            .and_then(parse_opacity)
            .unwrap_or(1.0);
        // Group opacity is approximated by multiplying it into each descendant's paint.
        state.fill_opacity *= opacity * fill_opacity;
        state.stroke_opacity *= opacity * stroke_opacity;

        // The root's own transform attribute is not part of SVG 1.1; skip it there.
        if !is_root {
            if let Some(ts) = node
                .attribute("transform")
                .and_then(|raw| svgtypes::Transform::from_str(raw).ok())
            {
                state.transform = state.transform.pre_concat(Transform::from_row(
                    ts.a as f32,
                    ts.b as f32,
                    ts.c as f32,
                    ts.d as f32,
                    ts.e as f32,
                    ts.f as f32,
                ));
            }
        }
    }

    fn length_value(&self, raw: &str, axis: Axis) -> Option<f32> {
        let len = svgtypes::Length::from_str(raw.trim()).ok()?;
        let n = len.number as f32;
        if !n.is_finite() {
            return None;
        }
        Some(match len.unit {
            svgtypes::LengthUnit::Percent => {
                let reference = match axis {
                    Axis::X => self.viewport.width,
                    Axis::Y => self.viewport.height,
                    Axis::Diagonal => {
                        (self.viewport.width.powi(2) + self.viewport.height.powi(2)).sqrt()
                            / std::f32::consts::SQRT_2
                    }
                };
                n / 100.0 * reference
            }
            _ => n,
        })
    }

    fn length(&self, node: Node<'_, '_>, name: &str, axis: Axis) -> f32 {
        node.attribute(name)
            .and_then(|v| self.length_value(v, axis))
            .unwrap_or(0.0)
    }

    fn draw_children(&mut self, node: Node<'_, '_>, state: &PaintState) {
        for child in node.children().filter(Node::is_element) {
            self.draw_node(child, state);
        }
    }

    fn draw_node(&mut self, node: Node<'_, '_>, parent: &PaintState) {
        let name = node.tag_name().name();
        if matches!(
            name,
            "defs"
                | "title"
                | "desc"
                | "metadata"
                | "style"
                | "linearGradient"
                | "radialGradient"
                | "clipPath"
                | "mask"
                | "pattern"
                | "symbol"
                | "marker"
                | "filter"
                | "script"
        ) {
            return;
        }
        if node.attribute("display").is_some_and(|d| d.trim() == "none")
            || style_value(node, "display").is_some_and(|d| d == "none")
        {
            return;
        }

        let mut state = *parent;
        self.apply_presentation(node, &mut state, false);

        let path = match name {
            "g" | "svg" | "a" | "switch" => {
                self.draw_children(node, &state);
                return;
            }
            "rect" => self.rect_path(node),
            "circle" => {
                let r = self.length(node, "r", Axis::Diagonal);
                ellipse_path(
                    self.length(node, "cx", Axis::X),
                    self.length(node, "cy", Axis::Y),
                    r,
                    r,
                )
            }
            "ellipse" => ellipse_path(
                self.length(node, "cx", Axis::X),
                self.length(node, "cy", Axis::Y),
                self.length(node, "rx", Axis::X),
                self.length(node, "ry", Axis::Y),
            ),
            "line" => {
                let mut pb = PathBuilder::new();
                pb.move_to(
                    self.length(node, "x1", Axis::X),
                    self.length(node, "y1", Axis::Y),
                );
                pb.line_to(
                    self.length(node, "x2", Axis::X),
                    self.length(node, "y2", Axis::Y),
                );
                // A line has no interior.
                state.fill = None;
                pb.finish()
            }
            "polyline" => points_path(node.attribute("points").unwrap_or_default(), false),
            "polygon" => points_path(node.attribute("points").unwrap_or_default(), true),
            "path" => path_data(node.attribute("d").unwrap_or_default()),
            other => {
                tracing::debug!(element = other, "builtin renderer skipped element");
                return;
            }
        };

        if let Some(path) = path {
            self.paint(&path, &state);
        }
    }

    fn rect_path(&self, node: Node<'_, '_>) -> Option<Path> {
        let x = self.length(node, "x", Axis::X);
        let y = self.length(node, "y", Axis::Y);
        let w = self.length(node, "width", Axis::X);
        let h = self.length(node, "height", Axis::Y);
        if w <= 0.0 || h <= 0.0 {
            return None;
        }
        let rx = node.attribute("rx").and_then(|v| self.length_value(v, Axis::X));
        let ry = node.attribute("ry").and_then(|v| self.length_value(v, Axis::Y));
        let (rx, ry) = match (rx, ry) {
            (Some(rx), Some(ry)) => (rx, ry),
            (Some(r), None) | (None, Some(r)) => (r, r),
            (None, None) => (0.0, 0.0),
        };
        let rx = rx.clamp(0.0, w / 2.0);
        let ry = ry.clamp(0.0, h / 2.0);
        if rx == 0.0 || ry == 0.0 {
            return Rect::from_xywh(x, y, w, h).map(PathBuilder::from_rect);
        }

        let (kx, ky) = (rx * KAPPA, ry * KAPPA);
        let mut pb = PathBuilder::new();
        pb.move_to(x + rx, y);
        pb.line_to(x + w - rx, y);
        pb.cubic_to(x + w - rx + kx, y, x + w, y + ry - ky, x + w, y + ry);
        pb.line_to(x + w, y + h - ry);
        pb.cubic_to(x + w, y + h - ry + ky, x + w - rx + kx, y + h, x + w - rx, y + h);
        pb.line_to(x + rx, y + h);
        pb.cubic_to(x + rx - kx, y + h, x, y + h - ry + ky, x, y + h - ry);
        pb.line_to(x, y + ry);
        pb.cubic_to(x, y + ry - ky, x + rx - kx, y, x + rx, y);
        pb.close();
        pb.finish()
    }

    fn paint(&mut self, path: &Path, state: &PaintState) {
        if let Some(color) = state.fill {
            let paint = solid(color, state.fill_opacity);
            self.pixmap
                .fill_path(path, &paint, state.fill_rule, state.transform, None);
        }
        if let Some(color) = state.stroke {
            if state.stroke_width > 0.0 {
                let paint = solid(color, state.stroke_opacity);
                let stroke = Stroke {
                    width: state.stroke_width,
                    ..Stroke::default()
                };
                self.pixmap
                    .stroke_path(path, &paint, &stroke, state.transform, None);
            }
        }
    }
}

fn solid(color: Rgba8, opacity: f32) -> Paint<'static> {
    let alpha = (color.a * opacity).clamp(0.0, 1.0);
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, (alpha * 255.0).round() as u8);
    paint.anti_alias = true;
    paint
}

fn ellipse_path(cx: f32, cy: f32, rx: f32, ry: f32) -> Option<Path> {
    if rx <= 0.0 || ry <= 0.0 {
        return None;
    }
    PathBuilder::from_oval(Rect::from_xywh(cx - rx, cy - ry, rx * 2.0, ry * 2.0)?)
}

fn points_path(raw: &str, close: bool) -> Option<Path> {
    let mut pb = PathBuilder::new();
    let mut coords = svgtypes::NumberListParser::from(raw).filter_map(|n| n.ok());
    let mut first = true;
    while let (Some(x), Some(y)) = (coords.next(), coords.next()) {
        if first {
            pb.move_to(x as f32, y as f32);
            first = false;
        } else {
            pb.line_to(x as f32, y as f32);
        }
    }
    if close {
        pb.close();
    }
    pb.finish()
}

/// Builds path data up to the first malformed segment, as SVG error handling prescribes.
fn path_data(raw: &str) -> Option<Path> {
    use svgtypes::SimplePathSegment as Seg;

    let mut pb = PathBuilder::new();
    for segment in svgtypes::SimplifyingPathParser::from(raw) {
        let Ok(segment) = segment else {
            break;
        };
        match segment {
            Seg::MoveTo { x, y } => pb.move_to(x as f32, y as f32),
            Seg::LineTo { x, y } => pb.line_to(x as f32, y as f32),
            Seg::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => pb.cubic_to(
                x1 as f32, y1 as f32, x2 as f32, y2 as f32, x as f32, y as f32,
            ),
            Seg::Quadratic { x1, y1, x, y } => pb.quad_to(x1 as f32, y1 as f32, x as f32, y as f32),
            Seg::ClosePath => pb.close(),
        }
    }
    pb.finish()
}
