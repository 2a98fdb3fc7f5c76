//! Common utility functions shared across CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sunprint_core::{Color, CropRect, VignetteFade};
use tracing::debug;

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{s}' ({e}), expected YYYY-MM-DD"))
}

fn numbers<T: std::str::FromStr>(
    s: &str,
    count: usize,
    what: &str,
) -> std::result::Result<Vec<T>, String> {
    let parts: Vec<T> = s
        .split(',')
        .map(|p| p.trim().parse::<T>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| format!("invalid {what} '{s}'"))?;
    if parts.len() != count {
        return Err(format!(
            "invalid {what} '{s}', expected {count} comma-separated numbers"
        ));
    }
    Ok(parts)
}

/// Parse `x,y,width,height`.
pub fn parse_rect(s: &str) -> std::result::Result<CropRect, String> {
    let n = numbers::<u32>(s, 4, "crop rectangle")?;
    Ok(CropRect::new(n[0], n[1], n[2], n[3]))
}

/// Parse `x,y`.
pub fn parse_point(s: &str) -> std::result::Result<(f32, f32), String> {
    let n = numbers::<f32>(s, 2, "point")?;
    Ok((n[0], n[1]))
}

/// Parse a vignette fade mode.
pub fn parse_fade(s: &str) -> std::result::Result<VignetteFade, String> {
    match s.trim().to_lowercase().as_str() {
        "black" => Ok(VignetteFade::Black),
        "white" => Ok(VignetteFade::White),
        "transparent" => Ok(VignetteFade::Transparent),
        other => other
            .parse::<Color>()
            .map(VignetteFade::Color)
            .map_err(|e| e.user_message()),
    }
}

/// Format cents as dollars.
pub fn format_price(cents: u32) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

/// Read an input file, with the error wording the exit codes look for.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    debug!(path = %path.display(), bytes = bytes.len(), "Read input");
    Ok(bytes)
}

/// Save an image as PNG.
pub fn write_png(image: &image::RgbaImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write output: {}", path.display()))?;
    debug!(path = %path.display(), "Wrote PNG");
    Ok(())
}
