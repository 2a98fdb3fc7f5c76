//! Raster buffer and the pixel passes that render into it.
//!
//! [`RasterBuffer`] owns the decoded source image and the rendered canvas.
//! The canvas is always recomputed in full from the source and the current
//! [`EditState`](crate::edit::EditState); it is never patched in place.

pub mod color;
pub mod crop;
pub mod export;
pub mod geometry;
pub mod text;

use image::RgbaImage;

use crate::edit::EditState;
use crate::error::{Result, SunprintError};
use crate::pipeline;

pub use crop::MIN_CROP_PX;
pub use text::FontBook;

/// Source image plus the canvas derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    source: RgbaImage,
    canvas: RgbaImage,
}

impl RasterBuffer {
    pub fn new(source: RgbaImage) -> Self {
        let canvas = source.clone();
        Self { source, canvas }
    }

    /// Decode any supported image format into a new buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)?;
        if img.width() == 0 || img.height() == 0 {
            return Err(SunprintError::Decode("image has no pixels".into()));
        }
        Ok(Self::new(img.to_rgba8()))
    }

    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Rendered canvas size.
    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    /// Recompute the canvas from the source.
    pub fn render(&mut self, edits: &EditState, fonts: &FontBook) {
        self.canvas = pipeline::render(&self.source, edits, fonts);
    }

    /// Take ownership of a new source image. The canvas shows it unedited
    /// until the next [`render`](Self::render).
    pub fn replace_source(&mut self, source: RgbaImage) {
        self.canvas = source.clone();
        self.source = source;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::{Edit, Rotation};
    use image::Rgba;

    #[test]
    fn test_decode_png() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([9, 8, 7, 255]));
        let bytes = export::encode_png(&img).unwrap();
        let buffer = RasterBuffer::decode(&bytes).unwrap();
        assert_eq!(buffer.dimensions(), (3, 2));
        assert_eq!(buffer.source(), &img);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = RasterBuffer::decode(b"not an image").unwrap_err();
        assert!(matches!(err, SunprintError::Decode(_)));
    }

    #[test]
    fn test_render_leaves_source_alone() {
        let img = RgbaImage::from_pixel(4, 2, Rgba([50, 50, 50, 255]));
        let mut buffer = RasterBuffer::new(img.clone());
        let mut state = EditState::default();
        state.apply(Edit::Rotation(Rotation::Deg90), (4, 2)).unwrap();
        state.apply(Edit::Invert(true), (4, 2)).unwrap();
        buffer.render(&state, &FontBook::new());
        assert_eq!(buffer.dimensions(), (2, 4));
        assert_eq!(buffer.canvas().get_pixel(0, 0)[0], 205);
        assert_eq!(buffer.source(), &img);

        buffer.replace_source(RgbaImage::new(7, 5));
        assert_eq!(buffer.dimensions(), (7, 5));
    }
}
