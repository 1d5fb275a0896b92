//! Input validation and loading of the source raster.
//!
//! Everything here runs before any backend call so that a bad path or an oversized file never
//! costs a paid request.

use crate::error::{Error, Result};
use crate::model::RasterSize;
use image::RgbaImage;
use std::path::{Path, PathBuf};

/// Largest accepted source file (10 MiB).
pub const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

/// Supported source formats, keyed by lower-case file extension.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

pub fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// A validated source raster: original bytes (sent to the vision backend) plus decoded pixels
/// (used by the scorer).
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub path: PathBuf,
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
    pub pixels: RgbaImage,
}

impl SourceImage {
    pub fn size(&self) -> RasterSize {
        RasterSize::new(self.pixels.width(), self.pixels.height())
    }

    /// Validates and decodes `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let media_type = validate_input_path(path)?;
        let bytes = std::fs::read(path)?;
        let pixels = image::load_from_memory(&bytes)
            .map_err(|err| Error::input(format!("cannot decode {}: {err}", path.display())))?
            .to_rgba8();
        Ok(Self {
            path: path.to_path_buf(),
            media_type,
            bytes,
            pixels,
        })
    }
}

/// Checks existence, file type, extension and size. Returns the media type on success.
pub fn validate_input_path(path: &Path) -> Result<&'static str> {
    let meta = std::fs::metadata(path)
        .map_err(|_| Error::input(format!("file not found: {}", path.display())))?;
    if !meta.is_file() {
        return Err(Error::input(format!("not a regular file: {}", path.display())));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let Some(media_type) = media_type_for_extension(ext) else {
        return Err(Error::input(format!(
            "unsupported format '.{ext}' (supported: {})",
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    };

    if meta.len() > MAX_INPUT_BYTES {
        return Err(Error::input(format!(
            "file too large: {:.1} MiB (max {} MiB)",
            meta.len() as f64 / 1024.0 / 1024.0,
            MAX_INPUT_BYTES / 1024 / 1024
        )));
    }
    Ok(media_type)
}

/// An existing destination must be a regular file; its parent directory is created on write.
pub fn validate_output_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::input("output path is empty"));
    }
    if path.exists() && !path.is_file() {
        return Err(Error::input(format!(
            "output path is not a file: {}",
            path.display()
        )));
    }
    Ok(())
}
