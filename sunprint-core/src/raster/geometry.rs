//! Geometric pass: quarter-turn rotation followed by mirroring.

use image::{imageops, RgbaImage};

use crate::edit::Rotation;

/// Rotate `source` clockwise by `rotation`, then mirror in output space.
///
/// Flip axes are the axes of the canvas the user sees: `flip_h` always
/// swaps the displayed left and right edges, whatever the rotation. At 90
/// and 270 degrees that is the source's vertical axis. The result is sized
/// to the post-rotation bounding box.
pub fn orient(source: &RgbaImage, rotation: Rotation, flip_h: bool, flip_v: bool) -> RgbaImage {
    let mut out = match rotation {
        Rotation::Deg0 => source.clone(),
        Rotation::Deg90 => imageops::rotate90(source),
        Rotation::Deg180 => imageops::rotate180(source),
        Rotation::Deg270 => imageops::rotate270(source),
    };
    if flip_h {
        imageops::flip_horizontal_in_place(&mut out);
    }
    if flip_v {
        imageops::flip_vertical_in_place(&mut out);
    }
    out
}

/// Canvas size after rotating a `width` x `height` source.
pub fn oriented_dimensions(width: u32, height: u32, rotation: Rotation) -> (u32, u32) {
    if rotation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn marked(width: u32, height: u32) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let img = marked(6, 4);
        for (rotation, dims) in [
            (Rotation::Deg0, (6, 4)),
            (Rotation::Deg90, (4, 6)),
            (Rotation::Deg180, (6, 4)),
            (Rotation::Deg270, (4, 6)),
        ] {
            assert_eq!(orient(&img, rotation, false, false).dimensions(), dims);
            assert_eq!(oriented_dimensions(6, 4, rotation), dims);
        }
    }

    #[test]
    fn test_rotate90_is_clockwise() {
        let out = orient(&marked(6, 4), Rotation::Deg90, false, false);
        // Top-left corner moves to top-right.
        assert_eq!(out.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn test_flips_apply_after_rotation() {
        let out = orient(&marked(6, 4), Rotation::Deg90, true, false);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
        let out = orient(&marked(6, 4), Rotation::Deg0, true, true);
        assert_eq!(out.get_pixel(5, 3)[0], 255);
    }
}
