//! CLI integration tests for sunprint-cli.
//!
//! These tests run the actual binary and check outputs, exit codes and the
//! images it writes. Anything that needs a backend uses `--mock`.

use assert_cmd::Command;
use image::{Rgba, RgbaImage};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a Command for the sunprint binary.
fn sunprint() -> Command {
    let mut cmd = Command::cargo_bin("sunprint").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Write a `width`x`height` gradient PNG and return its path.
fn write_test_png(dir: &Path, width: u32, height: u32) -> std::path::PathBuf {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width) as u8, (y * 255 / height) as u8, 128, 255])
    });
    let path = dir.join("input.png");
    image.save(&path).unwrap();
    path
}

fn dimensions(path: &Path) -> (u32, u32) {
    image::open(path).unwrap().to_rgba8().dimensions()
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    sunprint()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Solar image editing and print-on-demand checkout",
        ))
        .stdout(predicate::str::contains("edit"))
        .stdout(predicate::str::contains("mockups"))
        .stdout(predicate::str::contains("checkout"));
}

#[test]
fn test_version_displays_version() {
    sunprint()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sunprint"));
}

#[test]
fn test_help_shows_exit_codes() {
    sunprint()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("65"))
        .stdout(predicate::str::contains("69"));
}

#[test]
fn test_edit_help_shows_options() {
    sunprint()
        .args(["edit", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--rotate"))
        .stdout(predicate::str::contains("--crop"))
        .stdout(predicate::str::contains("--burn-in"))
        .stdout(predicate::str::contains("--print-state"));
}

// ============================================================================
// Edit Tests (no network)
// ============================================================================

#[test]
fn test_edit_rotate_swaps_dimensions() {
    let temp = TempDir::new().unwrap();
    let input = write_test_png(temp.path(), 40, 20);
    let output = temp.path().join("out.png");

    sunprint()
        .args(["edit", "--rotate", "90"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("20x40"));

    assert_eq!(dimensions(&output), (20, 40));
}

#[test]
fn test_edit_crop_is_applied() {
    let temp = TempDir::new().unwrap();
    let input = write_test_png(temp.path(), 64, 48);
    let output = temp.path().join("cropped.png");

    sunprint()
        .args(["edit", "--crop", "4,4,32,20"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    assert_eq!(dimensions(&output), (32, 20));
}

#[test]
fn test_edit_negative_brightness_is_accepted() {
    let temp = TempDir::new().unwrap();
    let input = write_test_png(temp.path(), 16, 16);
    let output = temp.path().join("dark.png");

    sunprint()
        .args(["edit", "--brightness", "-40", "--print-state"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"brightness\": -40"));

    let original = image::open(&input).unwrap().to_rgba8();
    let edited = image::open(&output).unwrap().to_rgba8();
    assert!(edited.get_pixel(15, 15)[0] < original.get_pixel(15, 15)[0]);
}

#[test]
fn test_edit_print_state_is_json() {
    let temp = TempDir::new().unwrap();
    let input = write_test_png(temp.path(), 16, 16);
    let output = temp.path().join("out.png");

    let assert = sunprint()
        .args(["edit", "--flip-h", "--saturation", "150", "--print-state"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let state: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(state["flip_h"], true);
    assert_eq!(state["saturation"], 150);
}

#[test]
fn test_edit_burns_in_text() {
    let temp = TempDir::new().unwrap();
    let input = write_test_png(temp.path(), 64, 64);
    let output = temp.path().join("text.png");

    sunprint()
        .args(["edit", "--text", "SUN", "--font-size", "24", "--burn-in"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    let original = image::open(&input).unwrap().to_rgba8();
    let edited = image::open(&output).unwrap().to_rgba8();
    assert_eq!(edited.dimensions(), (64, 64));
    let changed = original
        .pixels()
        .zip(edited.pixels())
        .filter(|(a, b)| a != b)
        .count();
    assert!(changed > 20, "only {changed} pixels changed");
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn test_missing_input_returns_input_error() {
    let temp = TempDir::new().unwrap();
    // Exit code 66 = EX_NOINPUT
    sunprint()
        .args(["edit", "nonexistent_file.png"])
        .arg(temp.path().join("out.png"))
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_undecodable_input_returns_input_error() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("notes.png");
    fs::write(&input, b"definitely not a png").unwrap();

    sunprint()
        .arg("edit")
        .arg(&input)
        .arg(temp.path().join("out.png"))
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to decode image"));
}

#[test]
fn test_small_crop_returns_validation_error() {
    let temp = TempDir::new().unwrap();
    let input = write_test_png(temp.path(), 64, 64);
    let output = temp.path().join("out.png");

    // Exit code 65 = EX_DATAERR
    sunprint()
        .args(["edit", "--crop", "0,0,5,5"])
        .arg(&input)
        .arg(&output)
        .assert()
        .code(65)
        .stderr(predicate::str::contains("smaller than"));

    assert!(!output.exists());
}

#[test]
fn test_bad_rotation_returns_validation_error() {
    let temp = TempDir::new().unwrap();
    let input = write_test_png(temp.path(), 16, 16);

    sunprint()
        .args(["edit", "--rotate", "45"])
        .arg(&input)
        .arg(temp.path().join("out.png"))
        .assert()
        .code(65)
        .stderr(predicate::str::contains("rotation"));
}

#[test]
fn test_unwritable_output_returns_io_error() {
    let temp = TempDir::new().unwrap();
    let input = write_test_png(temp.path(), 16, 16);

    // Exit code 74 = EX_IOERR
    sunprint()
        .arg("edit")
        .arg(&input)
        .arg(temp.path().join("missing_dir").join("out.png"))
        .assert()
        .code(74)
        .stderr(predicate::str::contains("Failed to write output"));
}

#[test]
fn test_burn_in_requires_text() {
    let temp = TempDir::new().unwrap();
    let input = write_test_png(temp.path(), 16, 16);

    // Exit code 2 = clap usage error
    sunprint()
        .args(["edit", "--burn-in"])
        .arg(&input)
        .arg(temp.path().join("out.png"))
        .assert()
        .code(2);
}

#[test]
fn test_invalid_api_base_returns_usage_error() {
    sunprint()
        .arg("health")
        .env("SUNPRINT_API_BASE", "not a url")
        .assert()
        .code(64)
        .stderr(predicate::str::contains("SUNPRINT_API_BASE"));
}

// ============================================================================
// Mock Backend Tests
// ============================================================================

#[test]
fn test_mock_health_is_online() {
    sunprint()
        .args(["--mock", "health"])
        .assert()
        .success()
        .stdout(predicate::str::contains("online"))
        .stdout(predicate::str::contains("Storefront:"));
}

#[test]
fn test_mock_catalog_lists_templates() {
    sunprint()
        .args(["--mock", "--quiet", "catalog"])
        .assert()
        .success()
        .stdout(predicate::str::contains("poster_matte"))
        .stdout(predicate::str::contains("$14.99"))
        .stdout(predicate::str::contains("425/29/42501"))
        .stdout(predicate::str::contains("not ready"));
}

#[test]
fn test_mock_catalog_query() {
    sunprint()
        .args(["--mock", "catalog", "--query", "mug"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ceramic Mug 11oz"))
        .stdout(predicate::str::contains("Ceramic Mug 15oz"))
        .stdout(predicate::str::contains("Tote Bag").not());
}

#[test]
fn test_mock_catalog_add() {
    sunprint()
        .args(["--mock", "catalog", "--add", "68"])
        .assert()
        .success()
        .stdout(predicate::str::contains("catalog_68_29"));
}

#[test]
fn test_mock_catalog_add_unknown_blueprint() {
    sunprint()
        .args(["--mock", "catalog", "--add", "9999"])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("9999"));
}

#[test]
fn test_mock_preview_writes_png() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("preview.png");

    sunprint()
        .args(["--mock", "preview", "--date", "2024-05-10", "-o"])
        .arg(&output)
        .assert()
        .success();

    assert_eq!(dimensions(&output), (96, 96));
}

#[test]
fn test_preview_rejects_bad_date() {
    sunprint()
        .args(["--mock", "preview", "--date", "10/05/2024", "-o", "x.png"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("YYYY-MM-DD"));
}
