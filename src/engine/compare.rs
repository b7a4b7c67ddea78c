// src/engine/compare.rs
//
// Snapshot comparison. Escalates through progressively looser checks and
// stops at the first one that matches:
//
//   1. empty / size guard
//   2. exact pixel match
//   3. re-encode the candidate at the configured quality, exact match against that
//   4. no tolerance requested -> mismatch
//   5. perceptual Delta E (when perceptual_precision < 1)
//   6. byte tolerance with early exit
//
// Every mismatch carries a diff image.

use crate::engine::canonical::CanonicalImage;
use crate::engine::common::EngineResult;
use crate::engine::diff;
use crate::engine::encoder::{decode_webp, WebPEncoder};
use crate::engine::extract::{extract, PixelSource};
use crate::engine::perceptual;
use crate::engine::quality::{resolve_with_effort, EncoderEffort, QualityLevel};
use std::fmt;

/// Absorbs float error in `(1 - precision) * total` so that a precision of
/// exactly `1 - k/N` tolerates exactly `k` differing bytes.
const THRESHOLD_EPSILON: f64 = 1e-6;

/// How closely a candidate must match its reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceConfig {
    precision: f64,
    perceptual_precision: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self::exact()
    }
}

fn clamp_precision(value: f64) -> f64 {
    // NaN falls back to the strictest setting.
    if value.is_nan() {
        return 1.0;
    }
    value.clamp(0.0, 1.0)
}

impl ToleranceConfig {
    /// Both values are clamped to 0.0..=1.0.
    pub fn new(precision: f64, perceptual_precision: f64) -> Self {
        Self {
            precision: clamp_precision(precision),
            perceptual_precision: clamp_precision(perceptual_precision),
        }
    }

    /// Byte-exact match required.
    pub fn exact() -> Self {
        Self {
            precision: 1.0,
            perceptual_precision: 1.0,
        }
    }

    /// Tolerances tuned to the artifacts a quality level produces.
    pub fn recommended(quality: QualityLevel) -> Self {
        let (precision, perceptual) = quality.recommended_tolerance();
        Self::new(precision, perceptual)
    }

    pub fn with_precision(self, precision: f64) -> Self {
        Self {
            precision: clamp_precision(precision),
            ..self
        }
    }

    pub fn with_perceptual_precision(self, perceptual_precision: f64) -> Self {
        Self {
            perceptual_precision: clamp_precision(perceptual_precision),
            ..self
        }
    }

    /// Fraction of bytes that must match exactly.
    pub fn precision(&self) -> f64 {
        self.precision
    }

    /// Perceptual similarity floor; `(1 - p) * 100` is the allowed average Delta E.
    pub fn perceptual_precision(&self) -> f64 {
        self.perceptual_precision
    }

    pub fn is_exact(&self) -> bool {
        self.precision >= 1.0 && self.perceptual_precision >= 1.0
    }

    /// Largest average Delta E still accepted.
    pub fn max_delta_e(&self) -> f64 {
        (1.0 - self.perceptual_precision) * 100.0
    }
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum MismatchReason {
    EmptyCandidate,
    SizeMismatch {
        reference: (u32, u32),
        candidate: (u32, u32),
    },
    /// Differs from the reference with no tolerance configured.
    NotIdentical,
    PixelPrecision {
        actual: f64,
        required: f64,
    },
    PerceptualPrecision {
        /// `1 - max Delta E / 100`; the verdict itself uses the average.
        actual: f64,
        required: f64,
        /// Reported alongside when a byte precision below 1 was also requested:
        /// `(actual, required)` fraction of pixels within the Delta E threshold.
        pixel_precision: Option<(f64, f64)>,
    },
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchReason::EmptyCandidate => write!(f, "Newly-taken snapshot is empty."),
            MismatchReason::SizeMismatch {
                reference: (rw, rh),
                candidate: (cw, ch),
            } => write!(
                f,
                "Newly-taken snapshot@{cw}x{ch} does not match reference@{rw}x{rh}."
            ),
            MismatchReason::NotIdentical => {
                write!(f, "Newly-taken snapshot does not match reference.")
            }
            MismatchReason::PixelPrecision { actual, required } => write!(
                f,
                "Actual image precision {actual} is less than required {required}"
            ),
            MismatchReason::PerceptualPrecision {
                actual,
                required,
                pixel_precision,
            } => {
                if let Some((pixel_actual, pixel_required)) = pixel_precision {
                    writeln!(
                        f,
                        "Actual image precision {pixel_actual} is less than required {pixel_required}"
                    )?;
                }
                write!(
                    f,
                    "Actual perceptual precision {actual} is less than required {required}"
                )
            }
        }
    }
}

/// Outcome of a comparison. A mismatch is a normal result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonVerdict {
    Match,
    Mismatch {
        reason: MismatchReason,
        diff_image: CanonicalImage,
    },
}

impl ComparisonVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, ComparisonVerdict::Match)
    }

    /// Human-readable failure text, `None` on a match.
    pub fn message(&self) -> Option<String> {
        match self {
            ComparisonVerdict::Match => None,
            ComparisonVerdict::Mismatch { reason, .. } => Some(reason.to_string()),
        }
    }

    pub fn diff_image(&self) -> Option<&CanonicalImage> {
        match self {
            ComparisonVerdict::Match => None,
            ComparisonVerdict::Mismatch { diff_image, .. } => Some(diff_image),
        }
    }
}

/// Compares candidates against references, re-encoding with its own encoder.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    encoder: WebPEncoder,
    effort: EncoderEffort,
}

impl Comparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoder(mut self, encoder: WebPEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_effort(mut self, effort: EncoderEffort) -> Self {
        self.effort = effort;
        self
    }

    pub fn encoder(&self) -> &WebPEncoder {
        &self.encoder
    }

    pub fn effort(&self) -> EncoderEffort {
        self.effort
    }

    /// Extract both sources, then `compare`.
    pub fn compare_sources(
        &self,
        reference: &dyn PixelSource,
        candidate: &dyn PixelSource,
        tolerance: &ToleranceConfig,
        quality: QualityLevel,
    ) -> EngineResult<ComparisonVerdict> {
        let reference = extract(reference)?;
        let candidate = extract(candidate)?;
        self.compare(&reference, &candidate, tolerance, quality)
    }

    /// Decide whether `candidate` matches `reference`.
    ///
    /// Errors only when the candidate cannot be re-encoded or decoded.
    pub fn compare(
        &self,
        reference: &CanonicalImage,
        candidate: &CanonicalImage,
        tolerance: &ToleranceConfig,
        quality: QualityLevel,
    ) -> EngineResult<ComparisonVerdict> {
        if candidate.is_empty() {
            tracing::debug!("compare: empty candidate");
            return Ok(mismatch(MismatchReason::EmptyCandidate, reference, candidate));
        }
        if reference.dimensions() != candidate.dimensions() {
            tracing::debug!(
                reference = ?reference.dimensions(),
                candidate = ?candidate.dimensions(),
                "compare: size mismatch"
            );
            return Ok(mismatch(
                MismatchReason::SizeMismatch {
                    reference: reference.dimensions(),
                    candidate: candidate.dimensions(),
                },
                reference,
                candidate,
            ));
        }

        if reference.pixels_eq(candidate) {
            tracing::debug!("compare: exact match");
            return Ok(ComparisonVerdict::Match);
        }

        // Lossless can still re-quantize, so the round trip always runs.
        let params = resolve_with_effort(quality, self.effort);
        let artifact = self.encoder.encode(candidate, &params)?;
        let reencoded = decode_webp(artifact.as_bytes())?;
        drop(artifact);
        if reference.pixels_eq(&reencoded) {
            tracing::debug!(quality = quality.raw_value(), "compare: match after re-encode");
            return Ok(ComparisonVerdict::Match);
        }

        if tolerance.is_exact() {
            tracing::debug!("compare: differs at full precision");
            return Ok(mismatch(MismatchReason::NotIdentical, reference, candidate));
        }

        if tolerance.perceptual_precision() < 1.0 {
            return self.compare_perceptual(reference, candidate, &reencoded, tolerance);
        }

        Ok(compare_bytes(reference, candidate, &reencoded, tolerance.precision()))
    }

    fn compare_perceptual(
        &self,
        reference: &CanonicalImage,
        candidate: &CanonicalImage,
        reencoded: &CanonicalImage,
        tolerance: &ToleranceConfig,
    ) -> EngineResult<ComparisonVerdict> {
        let threshold = tolerance.max_delta_e();
        let stats = perceptual::measure(reference, reencoded, threshold)?;
        tracing::debug!(
            average = stats.average,
            maximum = stats.maximum,
            threshold,
            "compare: perceptual"
        );
        if stats.average <= threshold {
            return Ok(ComparisonVerdict::Match);
        }

        let pixel_precision = (tolerance.precision() < 1.0)
            .then(|| (stats.pixel_precision(), tolerance.precision()));
        Ok(mismatch(
            MismatchReason::PerceptualPrecision {
                actual: 1.0 - stats.maximum / 100.0,
                required: tolerance.perceptual_precision(),
                pixel_precision,
            },
            reference,
            candidate,
        ))
    }
}

/// Byte-tolerance check with early exit once the allowance is exceeded.
fn compare_bytes(
    reference: &CanonicalImage,
    candidate: &CanonicalImage,
    reencoded: &CanonicalImage,
    precision: f64,
) -> ComparisonVerdict {
    let total = reference.pixel_byte_count();
    let allowed = allowed_differences(total, precision);

    let mut differing = 0usize;
    'rows: for (old_row, new_row) in reference.rows().zip(reencoded.rows()) {
        for (o, n) in old_row.iter().zip(new_row) {
            if o != n {
                differing += 1;
                if differing > allowed {
                    break 'rows;
                }
            }
        }
    }
    tracing::debug!(differing, allowed, total, "compare: byte tolerance");

    if differing > allowed {
        let actual = 1.0 - differing as f64 / total as f64;
        return mismatch(
            MismatchReason::PixelPrecision {
                actual,
                required: precision,
            },
            reference,
            candidate,
        );
    }
    ComparisonVerdict::Match
}

/// Number of differing bytes a precision tolerates out of `total`.
pub fn allowed_differences(total: usize, precision: f64) -> usize {
    ((1.0 - precision) * total as f64 + THRESHOLD_EPSILON).floor() as usize
}

fn mismatch(
    reason: MismatchReason,
    reference: &CanonicalImage,
    candidate: &CanonicalImage,
) -> ComparisonVerdict {
    ComparisonVerdict::Mismatch {
        reason,
        diff_image: diff::render(reference, candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stats::StatisticsSink;

    fn comparator() -> Comparator {
        Comparator::new().with_encoder(WebPEncoder::with_sink(StatisticsSink::new()))
    }

    fn create_test_image(width: u32, height: u32) -> CanonicalImage {
        CanonicalImage::from_fn(width, height, |x, y| {
            [(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128, 255]
        })
    }

    /// Flip the low bit of the red channel in the first `k` pixels.
    fn perturb(image: &CanonicalImage, k: usize) -> CanonicalImage {
        let width = image.width();
        CanonicalImage::from_fn(image.width(), image.height(), |x, y| {
            let mut px = image.pixel(x, y);
            if ((y * width + x) as usize) < k {
                px[0] ^= 1;
            }
            px
        })
    }

    #[test]
    fn test_tolerance_clamps() {
        let t = ToleranceConfig::new(1.5, -0.5);
        assert_eq!(t.precision(), 1.0);
        assert_eq!(t.perceptual_precision(), 0.0);
        assert_eq!(ToleranceConfig::new(f64::NAN, 0.5).precision(), 1.0);
        assert!(ToleranceConfig::default().is_exact());
        let loose = ToleranceConfig::exact().with_perceptual_precision(0.98);
        assert!((loose.max_delta_e() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_recommended_tolerance() {
        assert_eq!(
            ToleranceConfig::recommended(QualityLevel::Medium),
            ToleranceConfig::new(0.90, 0.95)
        );
        assert!(ToleranceConfig::recommended(QualityLevel::Lossless).is_exact());
    }

    #[test]
    fn test_allowed_differences_boundary() {
        let total = 400;
        for k in 0..=total {
            let precision = 1.0 - k as f64 / total as f64;
            assert_eq!(allowed_differences(total, precision), k, "k={k}");
        }
    }

    #[test]
    fn test_identical_images_match() {
        let img = create_test_image(20, 10);
        let verdict = comparator()
            .compare(&img, &img.clone(), &ToleranceConfig::exact(), QualityLevel::Medium)
            .unwrap();
        assert!(verdict.is_match());
        assert!(verdict.message().is_none());
    }

    #[test]
    fn test_empty_candidate() {
        let reference = create_test_image(4, 4);
        let verdict = comparator()
            .compare(
                &reference,
                &CanonicalImage::transparent(0, 4),
                &ToleranceConfig::new(0.0, 0.0),
                QualityLevel::Lossless,
            )
            .unwrap();
        match verdict {
            ComparisonVerdict::Mismatch { reason, diff_image } => {
                assert_eq!(reason, MismatchReason::EmptyCandidate);
                assert_eq!(diff_image.dimensions(), (4, 4));
            }
            ComparisonVerdict::Match => panic!("empty candidate matched"),
        }
    }

    #[test]
    fn test_size_mismatch_reports_both_sizes() {
        let verdict = comparator()
            .compare(
                &create_test_image(10, 10),
                &create_test_image(20, 20),
                &ToleranceConfig::new(0.0, 0.0),
                QualityLevel::Lossless,
            )
            .unwrap();
        let message = verdict.message().unwrap();
        assert!(message.contains("10x10"), "{message}");
        assert!(message.contains("20x20"), "{message}");
        assert_eq!(verdict.diff_image().unwrap().dimensions(), (20, 20));
    }

    #[test]
    fn test_full_precision_mismatch() {
        let reference = create_test_image(8, 8);
        let candidate = perturb(&reference, 1);
        let verdict = comparator()
            .compare(&reference, &candidate, &ToleranceConfig::exact(), QualityLevel::Lossless)
            .unwrap();
        assert!(matches!(
            verdict,
            ComparisonVerdict::Mismatch {
                reason: MismatchReason::NotIdentical,
                ..
            }
        ));
    }

    #[test]
    fn test_byte_tolerance_boundary() {
        let reference = create_test_image(10, 10);
        let total = reference.pixel_byte_count();
        let k = 7;
        let candidate = perturb(&reference, k);
        let c = comparator();

        let at = ToleranceConfig::exact().with_precision(1.0 - k as f64 / total as f64);
        assert!(c
            .compare(&reference, &candidate, &at, QualityLevel::Lossless)
            .unwrap()
            .is_match());

        let below = ToleranceConfig::exact().with_precision(1.0 - (k - 1) as f64 / total as f64);
        let verdict = c
            .compare(&reference, &candidate, &below, QualityLevel::Lossless)
            .unwrap();
        assert!(matches!(
            verdict,
            ComparisonVerdict::Mismatch {
                reason: MismatchReason::PixelPrecision { .. },
                ..
            }
        ));
        assert!(verdict.message().unwrap().starts_with("Actual image precision"));
    }

    #[test]
    fn test_perceptual_tolerance() {
        let reference = create_test_image(16, 16);
        let candidate = perturb(&reference, 16 * 16);
        let c = comparator();

        let loose = ToleranceConfig::new(1.0, 0.98);
        assert!(c
            .compare(&reference, &candidate, &loose, QualityLevel::Lossless)
            .unwrap()
            .is_match());

        let white = CanonicalImage::from_fn(16, 16, |_, _| [255, 255, 255, 255]);
        let black = CanonicalImage::from_fn(16, 16, |_, _| [0, 0, 0, 255]);
        let verdict = c
            .compare(&white, &black, &ToleranceConfig::new(0.9, 0.98), QualityLevel::Lossless)
            .unwrap();
        let message = verdict.message().unwrap();
        assert!(message.contains("Actual perceptual precision"), "{message}");
        assert!(message.contains("Actual image precision"), "{message}");
    }

    #[test]
    fn test_perceptual_mismatch_reports_worst_pixel() {
        let white = CanonicalImage::from_fn(8, 8, |_, _| [255, 255, 255, 255]);
        let half_black = CanonicalImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                [0, 0, 0, 255]
            } else {
                [255, 255, 255, 255]
            }
        });
        let verdict = comparator()
            .compare(
                &white,
                &half_black,
                &ToleranceConfig::new(1.0, 0.98),
                QualityLevel::Lossless,
            )
            .unwrap();
        match verdict {
            ComparisonVerdict::Mismatch {
                reason: MismatchReason::PerceptualPrecision { actual, required, .. },
                ..
            } => {
                // Average Delta E is ~50, the worst pixel ~100.
                assert!(actual.abs() < 0.01, "actual={actual}");
                assert_eq!(required, 0.98);
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn test_compare_sources_extracts() {
        let img = create_test_image(6, 3);
        let verdict = comparator()
            .compare_sources(&img, &img, &ToleranceConfig::exact(), QualityLevel::High)
            .unwrap();
        assert!(verdict.is_match());
    }
}
