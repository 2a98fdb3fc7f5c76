//! Destructive crop of the rendered canvas.

use image::{imageops, RgbaImage};

use crate::edit::{CropAspect, CropRect};
use crate::error::{Result, SunprintError};

/// Smallest accepted crop, per side.
pub const MIN_CROP_PX: u32 = 10;

fn too_small(width: f64, height: f64) -> SunprintError {
    SunprintError::validation(format!(
        "crop selection {}x{} is smaller than {MIN_CROP_PX}x{MIN_CROP_PX} px",
        width.round(),
        height.round()
    ))
}

/// Final crop rectangle for `selection` on a canvas of size `canvas`.
///
/// A ratio aspect derives the height from the selection width. Extents
/// running past the canvas edge are trimmed; selections under
/// [`MIN_CROP_PX`] on either side are rejected, before and after trimming.
pub fn crop_bounds(
    selection: CropRect,
    aspect: CropAspect,
    canvas: (u32, u32),
) -> Result<CropRect> {
    let width = selection.width as f64;
    let height = match aspect.ratio() {
        Some(ratio) => width / ratio,
        None => selection.height as f64,
    };
    let min = MIN_CROP_PX as f64;
    if width < min || height < min {
        return Err(too_small(width, height));
    }
    if selection.x >= canvas.0 || selection.y >= canvas.1 {
        return Err(SunprintError::validation(format!(
            "crop origin ({}, {}) lies outside the {}x{} canvas",
            selection.x, selection.y, canvas.0, canvas.1
        )));
    }

    let trimmed_w = (width.round() as u32).min(canvas.0 - selection.x);
    let trimmed_h = (height.round() as u32).min(canvas.1 - selection.y);
    if trimmed_w < MIN_CROP_PX || trimmed_h < MIN_CROP_PX {
        return Err(too_small(trimmed_w as f64, trimmed_h as f64));
    }
    Ok(CropRect::new(selection.x, selection.y, trimmed_w, trimmed_h))
}

/// Copy the pixels inside `rect` out of `canvas`.
pub fn extract(canvas: &RgbaImage, rect: CropRect) -> RgbaImage {
    imageops::crop_imm(canvas, rect.x, rect.y, rect.width, rect.height).to_image()
}

/// Map `rect` from a canvas of size `from` onto one of size `to`.
pub fn scale_rect(rect: CropRect, from: (u32, u32), to: (u32, u32)) -> CropRect {
    let sx = to.0 as f64 / from.0.max(1) as f64;
    let sy = to.1 as f64 / from.1.max(1) as f64;
    let x = ((rect.x as f64 * sx).round() as u32).min(to.0.saturating_sub(1));
    let y = ((rect.y as f64 * sy).round() as u32).min(to.1.saturating_sub(1));
    let width = ((rect.width as f64 * sx).round() as u32).clamp(1, to.0 - x);
    let height = ((rect.height as f64 * sy).round() as u32).clamp(1, to.1 - y);
    CropRect::new(x, y, width, height)
}
