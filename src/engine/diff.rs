// src/engine/diff.rs
//
// Visual difference image for failure reports.
// Canvas is the larger of the two inputs; `new` is drawn first and `old` is
// composited on top with a difference blend. The result is fully opaque.

use crate::engine::canonical::CanonicalImage;

const MISSING: [u8; 4] = [0, 0, 0, 0];

fn pixel_or_missing(image: &CanonicalImage, x: u32, y: u32) -> [u8; 4] {
    if x < image.width() && y < image.height() {
        image.pixel(x, y)
    } else {
        MISSING
    }
}

/// Per-channel `|new - old|` with opaque alpha.
///
/// Where only one image covers a pixel, that image shows through unchanged.
/// Identical inputs yield an all-black image.
pub fn render(old: &CanonicalImage, new: &CanonicalImage) -> CanonicalImage {
    let width = old.width().max(new.width());
    let height = old.height().max(new.height());

    tracing::trace!(width, height, "diff: rendering");
    CanonicalImage::from_fn(width, height, |x, y| {
        let n = pixel_or_missing(new, x, y);
        let o = pixel_or_missing(old, x, y);
        [n[0].abs_diff(o[0]), n[1].abs_diff(o[1]), n[2].abs_diff(o[2]), 255]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_inputs_are_black() {
        let img = CanonicalImage::from_fn(5, 4, |x, y| [x as u8 * 20, y as u8 * 30, 90, 255]);
        let diff = render(&img, &img);
        assert_eq!(diff.dimensions(), (5, 4));
        assert!(diff
            .raw_bytes()
            .chunks_exact(4)
            .all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn test_absolute_difference() {
        let old = CanonicalImage::from_fn(2, 1, |_, _| [200, 10, 50, 255]);
        let new = CanonicalImage::from_fn(2, 1, |_, _| [100, 60, 50, 128]);
        let diff = render(&old, &new);
        assert_eq!(diff.pixel(0, 0), [100, 50, 0, 255]);
        assert_eq!(render(&new, &old).pixel(1, 0), [100, 50, 0, 255]);
    }

    #[test]
    fn test_canvas_is_larger_of_inputs() {
        let old = CanonicalImage::from_fn(2, 3, |_, _| [10, 20, 30, 255]);
        let new = CanonicalImage::from_fn(4, 1, |_, _| [40, 40, 40, 255]);
        let diff = render(&old, &new);
        assert_eq!(diff.dimensions(), (4, 3));
        // overlap
        assert_eq!(diff.pixel(0, 0), [30, 20, 10, 255]);
        // only new
        assert_eq!(diff.pixel(3, 0), [40, 40, 40, 255]);
        // only old
        assert_eq!(diff.pixel(1, 2), [10, 20, 30, 255]);
        // neither
        assert_eq!(diff.pixel(3, 2), [0, 0, 0, 255]);
    }

    #[test]
    fn test_empty_input() {
        let new = CanonicalImage::from_fn(3, 2, |_, _| [1, 2, 3, 255]);
        let diff = render(&CanonicalImage::empty(), &new);
        assert!(diff.pixels_eq(&new));
    }
}
