//! Edit state: every user-adjustable parameter of the raster pipeline.
//!
//! [`EditState`] is the single source of truth for rendering. It is mutated
//! only through [`EditState::apply`], which validates each [`Edit`] before
//! touching any field, so an invalid command leaves the state unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SunprintError};

/// Brightness and contrast slider range.
pub const ADJUST_RANGE: std::ops::RangeInclusive<i32> = -100..=100;

/// Saturation slider range (100 = unchanged).
pub const SATURATION_RANGE: std::ops::RangeInclusive<i32> = 0..=200;

/// Quarter-turn rotation applied before mirroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Next quarter turn clockwise.
    pub fn clockwise(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    /// True when the canvas width and height trade places.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

impl TryFrom<u16> for Rotation {
    type Error = SunprintError;

    fn try_from(degrees: u16) -> Result<Self> {
        match degrees {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            other => Err(SunprintError::validation(format!(
                "rotation must be 0, 90, 180 or 270 degrees, got {other}"
            ))),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// Opaque RGB color, written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn channels(self) -> [f32; 3] {
        [self.r as f32, self.g as f32, self.b as f32]
    }
}

impl FromStr for Color {
    type Err = SunprintError;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || SunprintError::validation(format!("invalid color '{s}', expected #rrggbb"));
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Color {
    type Error = SunprintError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// What pixels beyond the vignette radius fade towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "color")]
pub enum VignetteFade {
    #[default]
    Black,
    /// Alpha fades out; color channels are untouched.
    Transparent,
    White,
    Color(Color),
}

/// Aspect constraint for crop selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropAspect {
    Free,
    Ratio { width: u32, height: u32 },
}

impl Default for CropAspect {
    fn default() -> Self {
        Self::Ratio {
            width: 1,
            height: 1,
        }
    }
}

impl CropAspect {
    /// Width divided by height, or `None` when unconstrained.
    pub fn ratio(self) -> Option<f64> {
        match self {
            Self::Free => None,
            Self::Ratio { width, height } => Some(width as f64 / height as f64),
        }
    }
}

impl FromStr for CropAspect {
    type Err = SunprintError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("free") {
            return Ok(Self::Free);
        }
        let invalid = || SunprintError::validation(format!("invalid crop aspect '{s}'"));
        let (w, h) = s.split_once(':').ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self::Ratio { width, height })
    }
}

impl fmt::Display for CropAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Ratio { width, height } => write!(f, "{width}:{height}"),
        }
    }
}

/// Axis-aligned rectangle in rendered-canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn fits_within(&self, bounds: (u32, u32)) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= bounds.0)
            && self.y.checked_add(self.height).is_some_and(|b| b <= bounds.1)
    }
}

/// Live text layer drawn over the rendered canvas until burned in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,
    /// Center of the text block.
    pub x: f32,
    pub y: f32,
    pub font_size_px: f32,
    pub font_family: String,
    pub fill_color: Color,
    pub stroke_color: Color,
    pub stroke_width_px: f32,
    /// Draw only the stroke.
    #[serde(default)]
    pub outlined: bool,
}

impl TextOverlay {
    pub const DEFAULT_TEXT: &'static str = "Hello Sun";

    /// Default overlay centered on a canvas of the given size.
    pub fn centered(bounds: (u32, u32)) -> Self {
        Self {
            text: Self::DEFAULT_TEXT.to_string(),
            x: bounds.0 as f32 / 2.0,
            y: bounds.1 as f32 / 2.0,
            font_size_px: 64.0,
            font_family: "Outfit".to_string(),
            fill_color: Color::WHITE,
            stroke_color: Color::BLACK,
            stroke_width_px: 0.0,
            outlined: false,
        }
    }

    /// The same overlay on a canvas `factor` times larger.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            font_size_px: self.font_size_px * factor,
            stroke_width_px: self.stroke_width_px * factor,
            ..self.clone()
        }
    }
}

/// Text-tool commands. `Enter` starts text mode; the others need it active.
#[derive(Debug, Clone, PartialEq)]
pub enum TextEdit {
    Enter,
    Text(String),
    MoveTo { x: f32, y: f32 },
    FontSize(f32),
    FontFamily(String),
    Fill(Color),
    Stroke(Color),
    StrokeWidth(f32),
    Outlined(bool),
    Exit,
}

/// One user edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Rotation(Rotation),
    RotateClockwise,
    FlipHorizontal(bool),
    FlipVertical(bool),
    Brightness(i32),
    Contrast(i32),
    Saturation(i32),
    Invert(bool),
    VignetteStrength(u8),
    VignetteFeather(u8),
    VignetteFade(VignetteFade),
    CropAspect(CropAspect),
    CropRect(Option<CropRect>),
    Text(TextEdit),
    /// Restore every field to its default.
    Reset,
}

/// Serializable record of every adjustable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditState {
    pub rotation: Rotation,
    pub flip_h: bool,
    pub flip_v: bool,
    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
    pub inverted: bool,
    pub vignette_strength: u8,
    pub vignette_feather: u8,
    #[serde(default)]
    pub vignette_fade: VignetteFade,
    pub crop_rect: Option<CropRect>,
    pub crop_aspect: CropAspect,
    /// Present exactly while text mode is active.
    pub text_overlay: Option<TextOverlay>,
}

impl Default for EditState {
    fn default() -> Self {
        Self {
            rotation: Rotation::Deg0,
            flip_h: false,
            flip_v: false,
            brightness: 0,
            contrast: 0,
            saturation: 100,
            inverted: false,
            vignette_strength: 0,
            vignette_feather: 0,
            vignette_fade: VignetteFade::Black,
            crop_rect: None,
            crop_aspect: CropAspect::default(),
            text_overlay: None,
        }
    }
}

fn check_range<T: PartialOrd + fmt::Display>(
    name: &str,
    value: T,
    range: std::ops::RangeInclusive<T>,
) -> Result<T> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(SunprintError::validation(format!(
            "{name} must be within {}..={}, got {value}",
            range.start(),
            range.end()
        )))
    }
}

impl EditState {
    /// True when the per-pixel color pass would change nothing.
    pub fn is_color_neutral(&self) -> bool {
        self.brightness == 0
            && self.contrast == 0
            && self.saturation == 100
            && !self.inverted
            && self.vignette_strength == 0
    }

    pub fn text_mode(&self) -> bool {
        self.text_overlay.is_some()
    }

    /// Clear geometry, crop selection and overlay; color fields are kept.
    pub fn reset_geometry(&mut self) {
        self.rotation = Rotation::Deg0;
        self.flip_h = false;
        self.flip_v = false;
        self.crop_rect = None;
        self.text_overlay = None;
    }

    /// Apply one edit against a rendered canvas of size `bounds`.
    pub fn apply(&mut self, edit: Edit, bounds: (u32, u32)) -> Result<()> {
        match edit {
            // A crop selection is in canvas pixels, which reorientation moves.
            Edit::Rotation(r) => {
                self.rotation = r;
                self.crop_rect = None;
            }
            Edit::RotateClockwise => {
                self.rotation = self.rotation.clockwise();
                self.crop_rect = None;
            }
            Edit::FlipHorizontal(on) => {
                self.flip_h = on;
                self.crop_rect = None;
            }
            Edit::FlipVertical(on) => {
                self.flip_v = on;
                self.crop_rect = None;
            }
            Edit::Brightness(v) => self.brightness = check_range("brightness", v, ADJUST_RANGE)?,
            Edit::Contrast(v) => self.contrast = check_range("contrast", v, ADJUST_RANGE)?,
            Edit::Saturation(v) => {
                self.saturation = check_range("saturation", v, SATURATION_RANGE)?
            }
            Edit::Invert(on) => self.inverted = on,
            Edit::VignetteStrength(v) => {
                self.vignette_strength = check_range("vignette strength", v, 0..=100)?
            }
            Edit::VignetteFeather(v) => {
                self.vignette_feather = check_range("vignette feather", v, 0..=100)?
            }
            Edit::VignetteFade(fade) => self.vignette_fade = fade,
            Edit::CropAspect(aspect) => self.crop_aspect = aspect,
            Edit::CropRect(None) => self.crop_rect = None,
            Edit::CropRect(Some(rect)) => {
                if !rect.fits_within(bounds) {
                    return Err(SunprintError::validation(format!(
                        "crop rect {rect:?} lies outside the {}x{} canvas",
                        bounds.0, bounds.1
                    )));
                }
                self.crop_rect = Some(rect);
            }
            Edit::Text(text_edit) => self.apply_text(text_edit, bounds)?,
            Edit::Reset => *self = Self::default(),
        }
        Ok(())
    }

    fn overlay_mut(&mut self) -> Result<&mut TextOverlay> {
        self.text_overlay
            .as_mut()
            .ok_or_else(|| SunprintError::validation("text mode is not active"))
    }

    fn apply_text(&mut self, edit: TextEdit, bounds: (u32, u32)) -> Result<()> {
        match edit {
            TextEdit::Enter => {
                if self.text_overlay.is_none() {
                    self.text_overlay = Some(TextOverlay::centered(bounds));
                }
            }
            TextEdit::Exit => self.text_overlay = None,
            TextEdit::Text(text) => self.overlay_mut()?.text = text,
            TextEdit::MoveTo { x, y } => {
                let overlay = self.overlay_mut()?;
                overlay.x = x;
                overlay.y = y;
            }
            TextEdit::FontSize(px) => {
                let overlay = self.overlay_mut()?;
                if !(px.is_finite() && px > 0.0) {
                    return Err(SunprintError::validation(format!(
                        "font size must be positive, got {px}"
                    )));
                }
                overlay.font_size_px = px;
            }
            TextEdit::FontFamily(family) => self.overlay_mut()?.font_family = family,
            TextEdit::Fill(c) => self.overlay_mut()?.fill_color = c,
            TextEdit::Stroke(c) => self.overlay_mut()?.stroke_color = c,
            TextEdit::StrokeWidth(w) => {
                let overlay = self.overlay_mut()?;
                if !(w.is_finite() && w >= 0.0) {
                    return Err(SunprintError::validation(format!(
                        "stroke width must not be negative, got {w}"
                    )));
                }
                overlay.stroke_width_px = w;
            }
            TextEdit::Outlined(on) => self.overlay_mut()?.outlined = on,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: (u32, u32) = (400, 300);

    #[test]
    fn test_default_is_neutral() {
        let state = EditState::default();
        assert!(state.is_color_neutral());
        assert!(!state.text_mode());
    }

    #[test]
    fn test_rotate_clockwise_wraps() {
        let mut state = EditState::default();
        for expected in [90, 180, 270, 0] {
            state.apply(Edit::RotateClockwise, BOUNDS).unwrap();
            assert_eq!(state.rotation.degrees(), expected);
        }
    }

    #[test]
    fn test_rotation_rejects_odd_angles() {
        assert!(Rotation::try_from(45).is_err());
        assert_eq!(Rotation::try_from(270).unwrap(), Rotation::Deg270);
    }

    #[test]
    fn test_out_of_range_leaves_state_untouched() {
        let mut state = EditState::default();
        state.apply(Edit::Brightness(40), BOUNDS).unwrap();
        let err = state.apply(Edit::Brightness(101), BOUNDS).unwrap_err();
        assert!(matches!(err, SunprintError::ValidationFailed(_)));
        assert_eq!(state.brightness, 40);
        assert!(state.apply(Edit::Saturation(201), BOUNDS).is_err());
        assert!(state.apply(Edit::VignetteStrength(101), BOUNDS).is_err());
    }

    #[test]
    fn test_crop_rect_must_fit() {
        let mut state = EditState::default();
        let inside = CropRect::new(10, 10, 100, 100);
        let outside = CropRect::new(350, 10, 100, 100);
        state.apply(Edit::CropRect(Some(inside)), BOUNDS).unwrap();
        assert!(state.apply(Edit::CropRect(Some(outside)), BOUNDS).is_err());
        assert_eq!(state.crop_rect, Some(inside));
    }

    #[test]
    fn test_reorienting_drops_the_crop_selection() {
        let bounds = (100, 50);
        for turn in [
            Edit::Rotation(Rotation::Deg90),
            Edit::RotateClockwise,
            Edit::FlipHorizontal(true),
            Edit::FlipVertical(true),
        ] {
            let mut state = EditState::default();
            state
                .apply(Edit::CropRect(Some(CropRect::new(60, 0, 40, 50))), bounds)
                .unwrap();
            state.apply(turn, bounds).unwrap();
            assert_eq!(state.crop_rect, None);
        }

        // Color edits leave it alone.
        let mut state = EditState::default();
        let rect = CropRect::new(60, 0, 40, 50);
        state.apply(Edit::CropRect(Some(rect)), bounds).unwrap();
        state.apply(Edit::Contrast(20), bounds).unwrap();
        assert_eq!(state.crop_rect, Some(rect));
    }

    #[test]
    fn test_text_edits_require_text_mode() {
        let mut state = EditState::default();
        let err = state
            .apply(Edit::Text(TextEdit::Text("hi".into())), BOUNDS)
            .unwrap_err();
        assert!(err.to_string().contains("text mode"));

        state.apply(Edit::Text(TextEdit::Enter), BOUNDS).unwrap();
        let overlay = state.text_overlay.as_ref().unwrap();
        assert_eq!((overlay.x, overlay.y), (200.0, 150.0));

        state
            .apply(Edit::Text(TextEdit::Text("Solar max".into())), BOUNDS)
            .unwrap();
        assert_eq!(state.text_overlay.as_ref().unwrap().text, "Solar max");

        state.apply(Edit::Text(TextEdit::Exit), BOUNDS).unwrap();
        assert!(state.text_overlay.is_none());
    }

    #[test]
    fn test_reset_geometry_keeps_color() {
        let mut state = EditState::default();
        state.apply(Edit::Rotation(Rotation::Deg90), BOUNDS).unwrap();
        state.apply(Edit::FlipHorizontal(true), BOUNDS).unwrap();
        state.apply(Edit::Contrast(30), BOUNDS).unwrap();
        state.apply(Edit::Text(TextEdit::Enter), BOUNDS).unwrap();
        state.reset_geometry();
        assert_eq!(state.rotation, Rotation::Deg0);
        assert!(!state.flip_h);
        assert!(state.text_overlay.is_none());
        assert_eq!(state.contrast, 30);
    }

    #[test]
    fn test_color_parsing() {
        let c: Color = "#ff8000".parse().unwrap();
        assert_eq!(c, Color::rgb(255, 128, 0));
        assert_eq!(c.to_string(), "#ff8000");
        assert!("#ff80".parse::<Color>().is_err());
        assert!("zzzzzz".parse::<Color>().is_err());
    }

    #[test]
    fn test_crop_aspect_parsing() {
        assert_eq!("free".parse::<CropAspect>().unwrap(), CropAspect::Free);
        let ratio: CropAspect = "16:9".parse().unwrap();
        assert_eq!(ratio.to_string(), "16:9");
        assert!((ratio.ratio().unwrap() - 16.0 / 9.0).abs() < 1e-9);
        assert!("0:9".parse::<CropAspect>().is_err());
    }

    #[test]
    fn test_edit_state_serializes() {
        let mut state = EditState::default();
        state.apply(Edit::Rotation(Rotation::Deg270), BOUNDS).unwrap();
        state
            .apply(Edit::VignetteFade(VignetteFade::Color(Color::rgb(1, 2, 3))), BOUNDS)
            .unwrap();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"rotation\":270"));
        let back: EditState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
