// src/snapshot.rs
//
// WebP snapshot strategy: how a snapshot harness records, loads and diffs
// images. File naming, attachment plumbing and test-runner integration live in
// the harness; this type only turns pixels into bytes and verdicts.

use crate::engine::{
    decode_webp, extract, extract_resized, resolve_with_effort, CanonicalImage,
    ComparisonVerdict, Comparator, EncoderEffort, PixelSource, QualityLevel, ToleranceConfig,
    WebPEncoder,
};
use crate::error::{Result, SnapshotError};

/// Size of the image written in place of an empty render.
pub const PLACEHOLDER_SIZE: (u32, u32) = (400, 80);

/// Everything a snapshot strategy needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SnapshotConfig {
    pub quality: QualityLevel,
    pub tolerance: ToleranceConfig,
    pub effort: EncoderEffort,
    /// Resample extracted sources to this size.
    pub output_size: Option<(u32, u32)>,
    /// Multiplies source dimensions when `output_size` is unset. `None` or 0 means 1.0.
    pub scale: Option<f32>,
}

impl SnapshotConfig {
    /// Quality plus its recommended tolerance.
    pub fn for_quality(quality: QualityLevel) -> Self {
        Self {
            quality,
            tolerance: ToleranceConfig::recommended(quality),
            ..Self::default()
        }
    }

    pub fn with_tolerance(mut self, tolerance: ToleranceConfig) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_effort(mut self, effort: EncoderEffort) -> Self {
        self.effort = effort;
        self
    }

    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.output_size = Some((width, height));
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some(scale) = self.scale {
            if !scale.is_finite() || scale < 0.0 {
                return Err(SnapshotError::invalid_argument(
                    "scale",
                    scale.to_string(),
                    "scale must be a finite, non-negative number",
                ));
            }
        }
        Ok(())
    }

    /// Output size for a source of the given size, if it must be resampled.
    fn target_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if let Some(size) = self.output_size {
            return Some(size);
        }
        let scale = self.scale.filter(|s| *s > 0.0)?;
        if scale == 1.0 {
            return None;
        }
        let scaled = |v: u32| ((v as f64 * scale as f64).round() as u32).max(1);
        Some((scaled(width), scaled(height)))
    }
}

/// The three images a harness attaches to a failed snapshot, plus the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotFailure {
    pub message: String,
    pub reference: CanonicalImage,
    pub failure: CanonicalImage,
    pub difference: CanonicalImage,
}

/// Records snapshots as `.webp` files and compares them with tolerance.
#[derive(Debug, Clone, Default)]
pub struct WebPSnapshot {
    config: SnapshotConfig,
    comparator: Comparator,
}

impl WebPSnapshot {
    /// File extension of recorded snapshots.
    pub const PATH_EXTENSION: &'static str = "webp";

    pub fn new(config: SnapshotConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            comparator: Comparator::new().with_effort(config.effort),
            config,
        })
    }

    /// Use a specific encoder (for example one with an isolated statistics sink).
    pub fn with_encoder(mut self, encoder: WebPEncoder) -> Self {
        self.comparator = self.comparator.with_encoder(encoder);
        self
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn path_extension(&self) -> &'static str {
        Self::PATH_EXTENSION
    }

    /// Encode an image for storage. Empty images store a red placeholder.
    pub fn to_data(&self, image: &CanonicalImage) -> Result<Vec<u8>> {
        let params = resolve_with_effort(self.config.quality, self.config.effort);
        let encoder = self.comparator.encoder();
        if image.is_empty() {
            tracing::warn!(
                width = image.width(),
                height = image.height(),
                "snapshot: empty image, storing placeholder"
            );
            return Ok(encoder.encode(&placeholder(), &params)?.into_bytes());
        }
        Ok(encoder.encode(image, &params)?.into_bytes())
    }

    /// Load a stored snapshot.
    pub fn from_data(&self, data: &[u8]) -> Result<CanonicalImage> {
        decode_webp(data)
    }

    /// Extract a source (resampling if configured) and encode it.
    pub fn record(&self, source: &dyn PixelSource) -> Result<Vec<u8>> {
        let image = self.snapshot(source)?;
        self.to_data(&image)
    }

    /// Extract a source, resampling to the configured size.
    pub fn snapshot(&self, source: &dyn PixelSource) -> Result<CanonicalImage> {
        let (width, height) = source.dimensions();
        match self.config.target_size(width, height) {
            Some((w, h)) if width != 0 && height != 0 => extract_resized(source, w, h),
            _ => extract(source),
        }
    }

    /// Compare a fresh image with the stored reference.
    ///
    /// `Ok(None)` on a match.
    pub fn diff(
        &self,
        reference: &CanonicalImage,
        candidate: &CanonicalImage,
    ) -> Result<Option<SnapshotFailure>> {
        let verdict = self.comparator.compare(
            reference,
            candidate,
            &self.config.tolerance,
            self.config.quality,
        )?;
        Ok(match verdict {
            ComparisonVerdict::Match => None,
            ComparisonVerdict::Mismatch { reason, diff_image } => Some(SnapshotFailure {
                message: reason.to_string(),
                reference: reference.clone(),
                failure: candidate.clone(),
                difference: diff_image,
            }),
        })
    }
}

/// Opaque red image stored in place of an empty render.
pub fn placeholder() -> CanonicalImage {
    let (width, height) = PLACEHOLDER_SIZE;
    CanonicalImage::from_fn(width, height, |_, _| [255, 0, 0, 255])
}
