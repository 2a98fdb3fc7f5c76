//! The transform pipeline.
//!
//! `render` is a pure function of its inputs: geometry, then the color pass
//! (skipped when neutral), then the preview-only text overlay.

use image::RgbaImage;

use crate::edit::EditState;
use crate::raster::{color, geometry, text, FontBook};

pub fn render(source: &RgbaImage, edits: &EditState, fonts: &FontBook) -> RgbaImage {
    let mut canvas = geometry::orient(source, edits.rotation, edits.flip_h, edits.flip_v);
    color::apply(&mut canvas, edits);
    if let Some(overlay) = &edits.text_overlay {
        text::draw_overlay(&mut canvas, overlay, fonts);
    }
    canvas
}

/// Geometry and the text overlay, without the color pass.
///
/// Used when the result becomes a new source image: color edits stay live
/// and would otherwise be applied twice.
pub fn bake(source: &RgbaImage, edits: &EditState, fonts: &FontBook) -> RgbaImage {
    let mut canvas = geometry::orient(source, edits.rotation, edits.flip_h, edits.flip_v);
    if let Some(overlay) = &edits.text_overlay {
        text::draw_overlay(&mut canvas, overlay, fonts);
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::Rotation;
    use image::Rgba;

    fn gradient() -> RgbaImage {
        RgbaImage::from_fn(16, 9, |x, y| Rgba([(x * 15) as u8, (y * 25) as u8, 99, 255]))
    }

    #[test]
    fn test_render_is_deterministic() {
        let edits = EditState {
            rotation: Rotation::Deg270,
            flip_v: true,
            contrast: 35,
            saturation: 140,
            vignette_strength: 60,
            vignette_feather: 40,
            ..EditState::default()
        };
        let fonts = FontBook::new();
        assert_eq!(
            render(&gradient(), &edits, &fonts),
            render(&gradient(), &edits, &fonts)
        );
    }

    #[test]
    fn test_neutral_color_equals_geometry_only() {
        let edits = EditState {
            rotation: Rotation::Deg180,
            flip_h: true,
            ..EditState::default()
        };
        let expected = geometry::orient(&gradient(), Rotation::Deg180, true, false);
        assert_eq!(render(&gradient(), &edits, &FontBook::new()), expected);
    }

    #[test]
    fn test_bake_skips_color() {
        let edits = EditState {
            rotation: Rotation::Deg90,
            inverted: true,
            brightness: 40,
            ..EditState::default()
        };
        let expected = geometry::orient(&gradient(), Rotation::Deg90, false, false);
        assert_eq!(bake(&gradient(), &edits, &FontBook::new()), expected);
    }
}
