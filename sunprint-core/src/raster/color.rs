//! Per-pixel color pass: invert, brightness, contrast, saturation, vignette.
//!
//! Operations run in that order on each pixel in `f32`, and channels are
//! rounded and clamped to `0..=255` once at the end.

use image::RgbaImage;

use crate::edit::{EditState, VignetteFade};

const LUMA: [f32; 3] = [0.2989, 0.587, 0.114];

/// Hard cutoff is used when the feather band is shorter than this.
const MIN_FEATHER_PX: f32 = 0.5;

/// Contrast scale factor around the 128 midpoint for `contrast` in -100..=100.
pub fn contrast_factor(contrast: i32) -> f32 {
    let c = contrast as f32 / 100.0 * 255.0;
    259.0 * (c + 255.0) / (255.0 * (259.0 - c))
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Radial falloff from the canvas center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vignette {
    cx: f32,
    cy: f32,
    radius: f32,
    feather: f32,
    fade: VignetteFade,
}

impl Vignette {
    /// `None` when strength is zero.
    pub fn new(width: u32, height: u32, state: &EditState) -> Option<Self> {
        if state.vignette_strength == 0 {
            return None;
        }
        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let max_radius = (cx * cx + cy * cy).sqrt();
        let radius = max_radius * (1.0 - 0.9 * state.vignette_strength as f32 / 100.0);
        let feather = (max_radius - radius) * state.vignette_feather as f32 / 100.0;
        Some(Self {
            cx,
            cy,
            radius,
            feather,
            fade: state.vignette_fade,
        })
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Fade amount in `0.0..=1.0` for the pixel at `(x, y)`.
    pub fn amount(&self, x: u32, y: u32) -> f32 {
        let dx = x as f32 - self.cx;
        let dy = y as f32 - self.cy;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist <= self.radius {
            return 0.0;
        }
        let t = if self.feather > MIN_FEATHER_PX {
            ((dist - self.radius) / self.feather).min(1.0)
        } else {
            1.0
        };
        smoothstep(t)
    }

    fn blend(&self, rgb: &mut [f32; 3], alpha: &mut f32, amount: f32) {
        match self.fade {
            VignetteFade::Black => rgb.iter_mut().for_each(|v| *v *= 1.0 - amount),
            VignetteFade::Transparent => *alpha *= 1.0 - amount,
            VignetteFade::White => rgb.iter_mut().for_each(|v| *v += (255.0 - *v) * amount),
            VignetteFade::Color(target) => {
                for (v, t) in rgb.iter_mut().zip(target.channels()) {
                    *v += (t - *v) * amount;
                }
            }
        }
    }
}

fn to_channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Apply the color pass in place. A neutral state leaves `img` untouched.
pub fn apply(img: &mut RgbaImage, state: &EditState) {
    if state.is_color_neutral() {
        return;
    }

    let (width, height) = img.dimensions();
    let brightness = state.brightness as f32;
    let factor = contrast_factor(state.contrast);
    let saturation = state.saturation as f32 / 100.0;
    let vignette = Vignette::new(width, height, state);

    for (x, y, px) in img.enumerate_pixels_mut() {
        let mut rgb = [px[0] as f32, px[1] as f32, px[2] as f32];
        let mut alpha = px[3] as f32;

        if state.inverted {
            rgb.iter_mut().for_each(|v| *v = 255.0 - *v);
        }
        for v in rgb.iter_mut() {
            *v += brightness;
            *v = factor * (*v - 128.0) + 128.0;
        }
        if state.saturation != 100 {
            let luma = rgb[0] * LUMA[0] + rgb[1] * LUMA[1] + rgb[2] * LUMA[2];
            rgb.iter_mut()
                .for_each(|v| *v = luma + saturation * (*v - luma));
        }
        if let Some(vignette) = &vignette {
            let amount = vignette.amount(x, y);
            if amount > 0.0 {
                vignette.blend(&mut rgb, &mut alpha, amount);
            }
        }

        px.0 = [
            to_channel(rgb[0]),
            to_channel(rgb[1]),
            to_channel(rgb[2]),
            to_channel(alpha),
        ];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::Color;
    use image::Rgba;

    fn gray(v: u8) -> RgbaImage {
        RgbaImage::from_pixel(8, 8, Rgba([v, v, v, 255]))
    }

    #[test]
    fn test_contrast_factor_neutral() {
        assert!((contrast_factor(0) - 1.0).abs() < 1e-6);
        assert_eq!(contrast_factor(-100), 0.0);
    }

    #[test]
    fn test_neutral_is_noop() {
        let mut img = RgbaImage::from_fn(5, 5, |x, y| Rgba([x as u8 * 40, y as u8 * 40, 7, 200]));
        let before = img.clone();
        apply(&mut img, &EditState::default());
        assert_eq!(img, before);
    }

    #[test]
    fn test_invert_then_brightness() {
        let mut img = gray(100);
        let state = EditState {
            inverted: true,
            brightness: 10,
            ..EditState::default()
        };
        apply(&mut img, &state);
        assert_eq!(img.get_pixel(0, 0)[0], 165);
        assert_eq!(img.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn test_channels_clamp() {
        let mut img = gray(250);
        let state = EditState {
            brightness: 100,
            ..EditState::default()
        };
        apply(&mut img, &state);
        assert_eq!(img.get_pixel(3, 3)[0], 255);
    }

    #[test]
    fn test_zero_saturation_is_grayscale() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([200, 50, 10, 255]));
        let state = EditState {
            saturation: 0,
            ..EditState::default()
        };
        apply(&mut img, &state);
        let px = img.get_pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn test_hard_vignette_cutoff() {
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([200, 200, 200, 255]));
        let state = EditState {
            vignette_strength: 100,
            vignette_feather: 0,
            ..EditState::default()
        };
        let vignette = Vignette::new(100, 100, &state).unwrap();
        apply(&mut img, &state);
        for (x, y, px) in img.enumerate_pixels() {
            let d = ((x as f32 - 50.0).powi(2) + (y as f32 - 50.0).powi(2)).sqrt();
            if d <= vignette.radius() {
                assert_eq!(px[0], 200, "inside radius at ({x},{y})");
            } else {
                assert_eq!(px[0], 0, "outside radius at ({x},{y})");
            }
        }
    }

    #[test]
    fn test_transparent_fade_keeps_color() {
        let mut img = RgbaImage::from_pixel(40, 40, Rgba([90, 90, 90, 255]));
        let state = EditState {
            vignette_strength: 100,
            vignette_fade: VignetteFade::Transparent,
            ..EditState::default()
        };
        apply(&mut img, &state);
        let corner = img.get_pixel(0, 0);
        assert_eq!(corner[0], 90);
        assert_eq!(corner[3], 0);
    }

    #[test]
    fn test_color_fade_reaches_target() {
        let mut img = gray(0);
        let state = EditState {
            vignette_strength: 100,
            vignette_fade: VignetteFade::Color(Color::rgb(10, 20, 30)),
            ..EditState::default()
        };
        apply(&mut img, &state);
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_feather_softens_edge() {
        let state = EditState {
            vignette_strength: 50,
            vignette_feather: 100,
            ..EditState::default()
        };
        let v = Vignette::new(200, 200, &state).unwrap();
        let mid = v.amount(100 + v.radius() as u32 + 10, 100);
        assert!(mid > 0.0 && mid < 1.0);
    }
}
