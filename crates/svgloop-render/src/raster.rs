use image::RgbaImage;
use svgloop_core::RasterSize;

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("failed to parse SVG: {0}")]
    SvgParse(String),
    #[error("SVG has no drawable size")]
    EmptyCanvas,
    #[error("failed to allocate {0} pixmap")]
    PixmapAlloc(RasterSize),
    #[error("invalid {attribute} value '{value}'")]
    InvalidAttribute { attribute: String, value: String },
}

pub type Result<T> = std::result::Result<T, RasterError>;

/// Opaque canvas of `size` filled with `background`.
pub(crate) fn canvas(size: RasterSize, background: tiny_skia::Color) -> Result<tiny_skia::Pixmap> {
    let mut pixmap =
        tiny_skia::Pixmap::new(size.width, size.height).ok_or(RasterError::PixmapAlloc(size))?;
    pixmap.fill(background);
    Ok(pixmap)
}

/// Converts a pixmap drawn over an opaque background.
///
/// tiny-skia stores premultiplied RGBA; with an opaque background every pixel has alpha 255, so
/// the bytes are already straight RGBA.
pub(crate) fn into_rgba(pixmap: tiny_skia::Pixmap) -> Result<RgbaImage> {
    let size = RasterSize::new(pixmap.width(), pixmap.height());
    RgbaImage::from_raw(size.width, size.height, pixmap.take()).ok_or(RasterError::PixmapAlloc(size))
}

/// Accepts `transparent`, `white`, `black` and `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`.
pub fn parse_tiny_skia_color(text: &str) -> Option<tiny_skia::Color> {
    let s = text.trim().to_ascii_lowercase();
    match s.as_str() {
        "transparent" => return Some(tiny_skia::Color::from_rgba8(0, 0, 0, 0)),
        "white" => return Some(tiny_skia::Color::from_rgba8(255, 255, 255, 255)),
        "black" => return Some(tiny_skia::Color::from_rgba8(0, 0, 0, 255)),
        _ => {}
    }

    let hex = s.strip_prefix('#')?;
    fn hex2(b: &[u8]) -> Option<u8> {
        let hi = (*b.first()? as char).to_digit(16)? as u8;
        let lo = (*b.get(1)? as char).to_digit(16)? as u8;
        Some((hi << 4) | lo)
    }
    fn hex1(c: u8) -> Option<u8> {
        let v = (c as char).to_digit(16)? as u8;
        Some((v << 4) | v)
    }

    let bytes = hex.as_bytes();
    match bytes.len() {
        3 => Some(tiny_skia::Color::from_rgba8(
            hex1(bytes[0])?,
            hex1(bytes[1])?,
            hex1(bytes[2])?,
            255,
        )),
        4 => Some(tiny_skia::Color::from_rgba8(
            hex1(bytes[0])?,
            hex1(bytes[1])?,
            hex1(bytes[2])?,
            hex1(bytes[3])?,
        )),
        6 => Some(tiny_skia::Color::from_rgba8(
            hex2(&bytes[0..2])?,
            hex2(&bytes[2..4])?,
            hex2(&bytes[4..6])?,
            255,
        )),
        8 => Some(tiny_skia::Color::from_rgba8(
            hex2(&bytes[0..2])?,
            hex2(&bytes[2..4])?,
            hex2(&bytes[4..6])?,
            hex2(&bytes[6..8])?,
        )),
        _ => None,
    }
}
