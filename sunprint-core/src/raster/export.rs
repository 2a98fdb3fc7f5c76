//! PNG export for uploads and checkout.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use image::{imageops, ImageFormat, RgbaImage};

use crate::error::Result;

/// Downscale so the longest side is at most `max_dim`. Smaller images are
/// returned as-is.
pub fn fit_within(img: &RgbaImage, max_dim: u32) -> Option<RgbaImage> {
    let (w, h) = img.dimensions();
    let longest = w.max(h);
    if longest <= max_dim || max_dim == 0 {
        return None;
    }
    let scale = max_dim as f64 / longest as f64;
    let nw = ((w as f64 * scale).round() as u32).max(1);
    let nh = ((h as f64 * scale).round() as u32).max(1);
    Some(imageops::resize(img, nw, nh, imageops::FilterType::Lanczos3))
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// PNG bytes, base64 (standard alphabet, no data-URL prefix).
pub fn png_base64(img: &RgbaImage, max_dim: u32) -> Result<String> {
    let bytes = match fit_within(img, max_dim) {
        Some(resized) => encode_png(&resized)?,
        None => encode_png(img)?,
    };
    Ok(STANDARD.encode(bytes))
}

/// `solar_<date>_<wavelength>_<suffix>.png`
pub fn file_name(date: NaiveDate, wavelength: u32, suffix: &str) -> String {
    format!("solar_{}_{wavelength}_{suffix}.png", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_fit_within_keeps_aspect() {
        let img = RgbaImage::from_pixel(200, 100, Rgba([1, 2, 3, 255]));
        let out = fit_within(&img, 50).unwrap();
        assert_eq!(out.dimensions(), (50, 25));
        assert!(fit_within(&img, 200).is_none());
    }

    #[test]
    fn test_png_base64_decodes() {
        let img = RgbaImage::from_pixel(30, 10, Rgba([200, 100, 50, 255]));
        let encoded = png_base64(&img, 15).unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (15, 5));
    }

    #[test]
    fn test_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(file_name(date, 171, "hq"), "solar_2024-05-10_171_hq.png");
    }
}
