// src/engine/perceptual.rs
//
// Perceptual color difference (CIE94, graphic-arts weights) between two
// canonical images of equal size. CPU only; rows are measured in parallel.
//
// Pixels are composited over opaque white before conversion so that alpha
// differences show up as color differences.

use crate::engine::canonical::{CanonicalImage, BYTES_PER_PIXEL};
use crate::engine::common::EngineResult;
use crate::error::SnapshotError;
use rayon::prelude::*;
use std::sync::OnceLock;

/// CIE L*a*b* color (D65 white point).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Lab {
    /// Lightness (0-100)
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

static SRGB_TO_LINEAR: OnceLock<[f32; 256]> = OnceLock::new();

fn srgb_to_linear(c: u8) -> f32 {
    let table = SRGB_TO_LINEAR.get_or_init(|| {
        let mut table = [0.0f32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let c = i as f32 / 255.0;
            *slot = if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            };
        }
        table
    });
    table[c as usize]
}

fn f_xyz(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

impl Lab {
    /// Convert an 8-bit sRGB color.
    #[allow(clippy::excessive_precision)]
    pub fn from_srgb8(rgb: [u8; 3]) -> Self {
        let r = srgb_to_linear(rgb[0]);
        let g = srgb_to_linear(rgb[1]);
        let b = srgb_to_linear(rgb[2]);

        let x = r * 0.4124564 + g * 0.3575761 + b * 0.1804375;
        let y = r * 0.2126729 + g * 0.7151522 + b * 0.0721750;
        let z = r * 0.0193339 + g * 0.1191920 + b * 0.9503041;

        let fx = f_xyz(x / 0.95047);
        let fy = f_xyz(y);
        let fz = f_xyz(z / 1.08883);

        Self {
            l: 116.0 * fy - 16.0,
            a: 500.0 * (fx - fy),
            b: 200.0 * (fy - fz),
        }
    }

    /// Premultiplied RGBA composited over opaque white.
    pub fn from_premultiplied(px: &[u8]) -> Self {
        let backdrop = 255 - px[3];
        Self::from_srgb8([
            px[0].saturating_add(backdrop),
            px[1].saturating_add(backdrop),
            px[2].saturating_add(backdrop),
        ])
    }
}

/// CIE94 color difference with graphic-arts weights (kL = 1, K1 = 0.045, K2 = 0.015).
///
/// Not symmetric: chroma weighting uses `reference`.
pub fn delta_e94(reference: Lab, sample: Lab) -> f32 {
    const K1: f32 = 0.045;
    const K2: f32 = 0.015;

    let delta_l = reference.l - sample.l;
    let c1 = (reference.a * reference.a + reference.b * reference.b).sqrt();
    let c2 = (sample.a * sample.a + sample.b * sample.b).sqrt();
    let delta_c = c1 - c2;
    let delta_a = reference.a - sample.a;
    let delta_b = reference.b - sample.b;
    let delta_h_sq = (delta_a * delta_a + delta_b * delta_b - delta_c * delta_c).max(0.0);

    let s_c = 1.0 + K1 * c1;
    let s_h = 1.0 + K2 * c1;

    (delta_l * delta_l + (delta_c / s_c).powi(2) + delta_h_sq / (s_h * s_h)).sqrt()
}

/// Aggregate color difference between two images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerceptualStats {
    /// Mean Delta E over all pixels.
    pub average: f64,
    /// Largest single-pixel Delta E.
    pub maximum: f64,
    /// Pixels whose Delta E exceeded the threshold.
    pub pixels_above: usize,
    pub pixel_count: usize,
}

impl PerceptualStats {
    /// Fraction of pixels above the threshold, 0 for empty images.
    pub fn fraction_above(&self) -> f64 {
        if self.pixel_count == 0 {
            return 0.0;
        }
        self.pixels_above as f64 / self.pixel_count as f64
    }

    /// Fraction of pixels within the threshold.
    pub fn pixel_precision(&self) -> f64 {
        1.0 - self.fraction_above()
    }
}

#[derive(Default)]
struct RowAccumulator {
    sum: f64,
    max: f32,
    above: usize,
}

impl RowAccumulator {
    fn merge(self, other: RowAccumulator) -> RowAccumulator {
        RowAccumulator {
            sum: self.sum + other.sum,
            max: self.max.max(other.max),
            above: self.above + other.above,
        }
    }
}

/// Measure Delta E between `reference` and `candidate`.
///
/// `threshold` is the per-pixel Delta E above which a pixel counts as
/// different.
pub fn measure(
    reference: &CanonicalImage,
    candidate: &CanonicalImage,
    threshold: f64,
) -> EngineResult<PerceptualStats> {
    if reference.dimensions() != candidate.dimensions() {
        let (rw, rh) = reference.dimensions();
        let (cw, ch) = candidate.dimensions();
        return Err(SnapshotError::invalid_argument(
            "candidate",
            format!("{cw}x{ch}"),
            format!("perceptual comparison needs equal sizes, reference is {rw}x{rh}"),
        ));
    }
    let pixel_count = reference.width() as usize * reference.height() as usize;
    if pixel_count == 0 {
        return Ok(PerceptualStats {
            average: 0.0,
            maximum: 0.0,
            pixels_above: 0,
            pixel_count: 0,
        });
    }

    let totals = (0..reference.height())
        .into_par_iter()
        .map(|y| {
            let mut acc = RowAccumulator::default();
            let pairs = reference
                .row(y)
                .chunks_exact(BYTES_PER_PIXEL)
                .zip(candidate.row(y).chunks_exact(BYTES_PER_PIXEL));
            for (r, c) in pairs {
                if r == c {
                    continue;
                }
                let de = delta_e94(Lab::from_premultiplied(r), Lab::from_premultiplied(c));
                acc.sum += de as f64;
                acc.max = acc.max.max(de);
                if de as f64 > threshold {
                    acc.above += 1;
                }
            }
            acc
        })
        .reduce(RowAccumulator::default, RowAccumulator::merge);

    let stats = PerceptualStats {
        average: totals.sum / pixel_count as f64,
        maximum: totals.max as f64,
        pixels_above: totals.above,
        pixel_count,
    };
    tracing::trace!(
        average = stats.average,
        maximum = stats.maximum,
        above = stats.pixels_above,
        "perceptual: measured"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, px: [u8; 4]) -> CanonicalImage {
        CanonicalImage::from_fn(width, height, |_, _| px)
    }

    #[test]
    fn test_lab_reference_points() {
        let white = Lab::from_srgb8([255, 255, 255]);
        assert!((white.l - 100.0).abs() < 0.01);
        assert!(white.a.abs() < 0.01 && white.b.abs() < 0.01);

        let black = Lab::from_srgb8([0, 0, 0]);
        assert!(black.l.abs() < 0.01);

        let red = Lab::from_srgb8([255, 0, 0]);
        assert!((red.l - 53.24).abs() < 0.1, "{red:?}");
        assert!((red.a - 80.09).abs() < 0.2, "{red:?}");
    }

    #[test]
    fn test_delta_e_basics() {
        let white = Lab::from_srgb8([255, 255, 255]);
        let black = Lab::from_srgb8([0, 0, 0]);
        assert_eq!(delta_e94(white, white), 0.0);
        assert!((delta_e94(white, black) - 100.0).abs() < 0.01);

        let grey = Lab::from_srgb8([128, 128, 128]);
        let near = Lab::from_srgb8([129, 128, 128]);
        let de = delta_e94(grey, near);
        assert!(de > 0.0 && de < 1.0, "{de}");
    }

    #[test]
    fn test_transparent_reads_as_white() {
        let clear = Lab::from_premultiplied(&[0, 0, 0, 0]);
        let white = Lab::from_srgb8([255, 255, 255]);
        assert_eq!(delta_e94(white, clear), 0.0);
    }

    #[test]
    fn test_measure_identical_and_distinct() {
        let a = solid(16, 9, [10, 200, 30, 255]);
        let stats = measure(&a, &a, 2.3).unwrap();
        assert_eq!(stats.average, 0.0);
        assert_eq!(stats.pixels_above, 0);
        assert_eq!(stats.pixel_count, 144);

        let b = solid(16, 9, [0, 0, 0, 255]);
        let w = solid(16, 9, [255, 255, 255, 255]);
        let stats = measure(&w, &b, 2.3).unwrap();
        assert!((stats.average - 100.0).abs() < 0.01);
        assert!((stats.maximum - 100.0).abs() < 0.01);
        assert_eq!(stats.fraction_above(), 1.0);
        assert_eq!(stats.pixel_precision(), 0.0);
    }

    #[test]
    fn test_measure_partial_difference() {
        let reference = solid(10, 10, [255, 255, 255, 255]);
        let candidate = CanonicalImage::from_fn(10, 10, |x, y| {
            if x == 0 && y < 5 {
                [0, 0, 0, 255]
            } else {
                [255, 255, 255, 255]
            }
        });
        let stats = measure(&reference, &candidate, 2.3).unwrap();
        assert_eq!(stats.pixels_above, 5);
        assert!((stats.average - 5.0).abs() < 0.01);
        assert!((stats.fraction_above() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_measure_rejects_size_mismatch() {
        let a = solid(2, 2, [0, 0, 0, 255]);
        let b = solid(3, 2, [0, 0, 0, 255]);
        assert!(measure(&a, &b, 1.0).is_err());
        let empty = CanonicalImage::empty();
        assert_eq!(measure(&empty, &empty, 1.0).unwrap().pixel_count, 0);
    }
}
