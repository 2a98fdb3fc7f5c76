//! Text overlay rasterization with `ab_glyph`.
//!
//! Glyph coverage is accumulated into a [`Mask`] covering the text block. The
//! stroke is the band between the mask dilated and eroded by the stroke width,
//! composited before the fill.

use std::collections::HashMap;
use std::path::Path;

use ab_glyph::{point, Font, FontArc, ScaleFont};
use image::RgbaImage;
use tracing::{debug, warn};

use crate::edit::{Color, TextOverlay};
use crate::error::{Result, SunprintError};

/// Family name of the font compiled into the crate.
pub const BUNDLED_FAMILY: &str = "DejaVu Sans";

static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Fonts available to the overlay, keyed by lowercase family name.
///
/// The default book holds the bundled DejaVu Sans, which also serves as the
/// fallback for unknown families.
#[derive(Clone)]
pub struct FontBook {
    fonts: HashMap<String, FontArc>,
    default_family: Option<String>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut families: Vec<_> = self.fonts.keys().collect();
        families.sort();
        f.debug_struct("FontBook")
            .field("families", &families)
            .field("default_family", &self.default_family)
            .finish()
    }
}

impl Default for FontBook {
    fn default() -> Self {
        let mut book = Self::empty();
        match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => book.register(BUNDLED_FAMILY, font),
            Err(e) => warn!(error = %e, "Bundled font failed to parse"),
        }
        book
    }
}

impl FontBook {
    /// Book with the bundled font.
    pub fn new() -> Self {
        Self::default()
    }

    /// Book with no fonts at all.
    pub fn empty() -> Self {
        Self {
            fonts: HashMap::new(),
            default_family: None,
        }
    }

    fn register(&mut self, family: &str, font: FontArc) {
        let key = family.to_lowercase();
        if self.default_family.is_none() {
            self.default_family = Some(key.clone());
        }
        self.fonts.insert(key, font);
    }

    /// Register a font. The first registered family becomes the fallback.
    pub fn insert(&mut self, family: &str, data: Vec<u8>) -> Result<()> {
        let font = FontArc::try_from_vec(data)
            .map_err(|e| SunprintError::Font(format!("{family}: {e}")))?;
        self.register(family, font);
        Ok(())
    }

    /// Load a TTF/OTF file, registering it under its file stem.
    pub fn load_file(&mut self, path: &Path) -> Result<String> {
        let family = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SunprintError::Font(format!("bad font path {}", path.display())))?
            .to_string();
        let data = std::fs::read(path)
            .map_err(|e| SunprintError::Font(format!("{}: {e}", path.display())))?;
        self.insert(&family, data)?;
        debug!(family = %family, "Font loaded");
        Ok(family)
    }

    /// Exact family match, else the fallback font.
    pub fn resolve(&self, family: &str) -> Option<&FontArc> {
        self.fonts.get(&family.to_lowercase()).or_else(|| {
            self.default_family
                .as_ref()
                .and_then(|key| self.fonts.get(key))
        })
    }

    /// Like [`resolve`](Self::resolve), but an error when nothing matches.
    pub fn require(&self, family: &str) -> Result<&FontArc> {
        self.resolve(family)
            .ok_or_else(|| SunprintError::Font(format!("no font available for {family}")))
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

/// Coverage values over a rectangle of canvas space.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    x0: i32,
    y0: i32,
    width: usize,
    height: usize,
    coverage: Vec<f32>,
}

impl Mask {
    fn new(x0: i32, y0: i32, width: usize, height: usize) -> Self {
        Self {
            x0,
            y0,
            width,
            height,
            coverage: vec![0.0; width * height],
        }
    }

    fn get(&self, x: isize, y: isize) -> f32 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return 0.0;
        }
        self.coverage[y as usize * self.width + x as usize]
    }

    fn accumulate(&mut self, x: i32, y: i32, value: f32) {
        let (lx, ly) = (x - self.x0, y - self.y0);
        if lx < 0 || ly < 0 || lx as usize >= self.width || ly as usize >= self.height {
            return;
        }
        let cell = &mut self.coverage[ly as usize * self.width + lx as usize];
        *cell = (*cell + value).min(1.0);
    }

    /// Max (dilate) or min (erode) of coverage over a disc of `radius`.
    fn morph(&self, radius: f32, dilate: bool) -> Self {
        let reach = radius.ceil() as isize;
        let r2 = radius * radius;
        let mut out = Self::new(self.x0, self.y0, self.width, self.height);
        for y in 0..self.height as isize {
            for x in 0..self.width as isize {
                let mut acc: f32 = if dilate { 0.0 } else { 1.0 };
                for dy in -reach..=reach {
                    for dx in -reach..=reach {
                        if (dx * dx + dy * dy) as f32 > r2 {
                            continue;
                        }
                        let v = self.get(x + dx, y + dy);
                        acc = if dilate { acc.max(v) } else { acc.min(v) };
                    }
                }
                out.coverage[y as usize * self.width + x as usize] = acc;
            }
        }
        out
    }

    /// Band of width `radius` on both sides of the glyph edge.
    fn stroke_band(&self, radius: f32) -> Self {
        let outer = self.morph(radius, true);
        let inner = self.morph(radius, false);
        let mut band = outer;
        for (b, i) in band.coverage.iter_mut().zip(&inner.coverage) {
            *b *= 1.0 - i;
        }
        band
    }

    pub fn total(&self) -> f32 {
        self.coverage.iter().sum()
    }
}

/// Rasterize the overlay's glyphs, centered on `(overlay.x, overlay.y)`.
///
/// The mask is padded by `pad` pixels on every side.
pub fn glyph_mask(font: &FontArc, overlay: &TextOverlay, pad: u32) -> Option<Mask> {
    let scaled = font.as_scaled(overlay.font_size_px);

    let mut caret = 0.0f32;
    let mut prev = None;
    let mut glyphs = Vec::new();
    for ch in overlay.text.chars().filter(|c| !c.is_control()) {
        let id = font.glyph_id(ch);
        if let Some(prev) = prev {
            caret += scaled.kern(prev, id);
        }
        glyphs.push((id, caret));
        caret += scaled.h_advance(id);
        prev = Some(id);
    }

    let left = overlay.x - caret / 2.0;
    let baseline = overlay.y + (scaled.ascent() + scaled.descent()) / 2.0;
    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|(id, offset)| {
            font.outline_glyph(
                id.with_scale_and_position(overlay.font_size_px, point(left + offset, baseline)),
            )
        })
        .collect();

    let first = outlines.first()?.px_bounds();
    let (mut min_x, mut min_y, mut max_x, mut max_y) =
        (first.min.x, first.min.y, first.max.x, first.max.y);
    for outline in &outlines[1..] {
        let b = outline.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let pad = pad as i32;
    let x0 = min_x.floor() as i32 - pad;
    let y0 = min_y.floor() as i32 - pad;
    let width = (max_x.ceil() as i32 + pad - x0).max(1) as usize;
    let height = (max_y.ceil() as i32 + pad - y0).max(1) as usize;
    let mut mask = Mask::new(x0, y0, width, height);

    for outline in &outlines {
        let b = outline.px_bounds();
        let (gx, gy) = (b.min.x as i32, b.min.y as i32);
        outline.draw(|px, py, cov| mask.accumulate(gx + px as i32, gy + py as i32, cov));
    }
    Some(mask)
}

fn composite(canvas: &mut RgbaImage, mask: &Mask, color: Color) {
    let (cw, ch) = canvas.dimensions();
    let src = color.channels();
    for ly in 0..mask.height {
        for lx in 0..mask.width {
            let a = mask.coverage[ly * mask.width + lx];
            if a <= 0.0 {
                continue;
            }
            let x = mask.x0 + lx as i32;
            let y = mask.y0 + ly as i32;
            if x < 0 || y < 0 || x as u32 >= cw || y as u32 >= ch {
                continue;
            }
            let px = canvas.get_pixel_mut(x as u32, y as u32);
            for (c, s) in px.0.iter_mut().take(3).zip(src) {
                *c = (*c as f32 * (1.0 - a) + s * a).round().clamp(0.0, 255.0) as u8;
            }
            let dst_a = px[3] as f32 / 255.0;
            px[3] = ((a + dst_a * (1.0 - a)) * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Draw the overlay onto `canvas`: stroke first, then fill unless outlined.
pub fn draw_overlay(canvas: &mut RgbaImage, overlay: &TextOverlay, fonts: &FontBook) {
    if overlay.text.trim().is_empty() {
        return;
    }
    let Some(font) = fonts.resolve(&overlay.font_family) else {
        warn!(family = %overlay.font_family, "No font available, text overlay skipped");
        return;
    };

    let stroke = overlay.stroke_width_px.max(0.0);
    let Some(mask) = glyph_mask(font, overlay, stroke.ceil() as u32 + 1) else {
        return;
    };

    if stroke > 0.0 {
        composite(canvas, &mask.stroke_band(stroke), overlay.stroke_color);
    }
    if !overlay.outlined {
        composite(canvas, &mask, overlay.fill_color);
    }
}
