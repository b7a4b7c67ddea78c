// src/engine/quality.rs
//
// Quality policy: QualityLevel selector -> libwebp encoder parameters, plus
// the recommended comparison tolerances per level.
//
// Numeric scale: 1.0 = lossless, 0.0 = maximum lossy compression.
// | Level    | raw | precision | perceptual |
// |----------|-----|-----------|------------|
// | Lossless | 1.0 | 1.00      | 1.00       |
// | Low      | 0.8 | 0.95      | 0.98       |
// | Medium   | 0.5 | 0.90      | 0.95       |
// | High     | 0.2 | 0.85      | 0.90       |
// | Maximum  | 0.0 | 0.80      | 0.85       |

use std::hash::{Hash, Hasher};

/// WebP compression quality selector.
#[derive(Debug, Clone, Copy, Default)]
pub enum QualityLevel {
    /// 1.0, pixel-perfect
    #[default]
    Lossless,
    /// 0.8, minimal quality loss
    Low,
    /// 0.5, balanced
    Medium,
    /// 0.2, heavy compression
    High,
    /// 0.0, smallest output
    Maximum,
    /// Arbitrary fraction, clamped to 0.0..=1.0 on resolution
    Custom(f64),
}

impl QualityLevel {
    pub const NAMED: [QualityLevel; 5] = [
        QualityLevel::Lossless,
        QualityLevel::Low,
        QualityLevel::Medium,
        QualityLevel::High,
        QualityLevel::Maximum,
    ];

    /// Snap to a named level on exact match, otherwise `Custom(clamped)`.
    pub fn from_raw(value: f64) -> Self {
        let clamped = clamp_unit(value);
        Self::NAMED
            .into_iter()
            .find(|level| level.raw_value() == clamped)
            .unwrap_or(QualityLevel::Custom(clamped))
    }

    /// Resolved numeric value, always within 0.0..=1.0.
    pub fn raw_value(&self) -> f64 {
        match self {
            QualityLevel::Lossless => 1.0,
            QualityLevel::Low => 0.8,
            QualityLevel::Medium => 0.5,
            QualityLevel::High => 0.2,
            QualityLevel::Maximum => 0.0,
            QualityLevel::Custom(v) => clamp_unit(*v),
        }
    }

    pub fn is_lossless(&self) -> bool {
        self.raw_value() >= 1.0
    }

    /// Recommended `(precision, perceptual_precision)` for this level.
    ///
    /// Custom values use the row of the highest named level not above them.
    pub fn recommended_tolerance(&self) -> (f64, f64) {
        let raw = self.raw_value();
        if raw >= 1.0 {
            (1.0, 1.0)
        } else if raw >= 0.8 {
            (0.95, 0.98)
        } else if raw >= 0.5 {
            (0.90, 0.95)
        } else if raw >= 0.2 {
            (0.85, 0.90)
        } else {
            (0.80, 0.85)
        }
    }
}

impl From<f64> for QualityLevel {
    fn from(value: f64) -> Self {
        QualityLevel::from_raw(value)
    }
}

impl PartialEq for QualityLevel {
    fn eq(&self, other: &Self) -> bool {
        self.raw_value() == other.raw_value()
    }
}

impl Eq for QualityLevel {}

impl Hash for QualityLevel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // raw_value() never yields NaN or -0.0, so bit patterns agree with ==.
        self.raw_value().to_bits().hash(state);
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    // `+ 0.0` folds -0.0 into 0.0 so hashing stays consistent with equality.
    value.clamp(0.0, 1.0) + 0.0
}

/// Encoder effort. The two presets seen in practice are exposed as a knob
/// rather than hard-coding one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EncoderEffort {
    /// method 0, single pass, no preprocessing
    #[default]
    Fast,
    /// method 6, multi-pass, sharp YUV, auto filter
    Thorough,
}

/// libwebp content preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebPPreset {
    Default,
    Picture,
    Photo,
    Drawing,
    Icon,
    Text,
}

/// Fully resolved libwebp parameters. Pure data; `resolve` is deterministic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderParams {
    pub preset: WebPPreset,
    pub lossless: bool,
    /// 0-100
    pub quality: f32,
    /// 0 (fast) - 6 (slow)
    pub method: i32,
    /// Preserve RGB under fully transparent pixels
    pub exact: bool,
    pub thread_level: i32,
    pub alpha_compression: i32,
    pub alpha_filtering: i32,
    /// 0-100
    pub alpha_quality: i32,
    pub pass: i32,
    pub preprocessing: i32,
    pub use_sharp_yuv: bool,
    pub autofilter: bool,
}

/// Map a quality level to encoder parameters at the default effort.
pub fn resolve(level: QualityLevel) -> EncoderParams {
    resolve_with_effort(level, EncoderEffort::default())
}

/// Map a quality level to encoder parameters.
pub fn resolve_with_effort(level: QualityLevel, effort: EncoderEffort) -> EncoderParams {
    let raw = level.raw_value();
    let thorough = effort == EncoderEffort::Thorough;

    if raw >= 1.0 {
        return EncoderParams {
            preset: WebPPreset::Default,
            lossless: true,
            quality: 100.0,
            method: if thorough { 6 } else { 0 },
            exact: true,
            thread_level: 1,
            alpha_compression: 1,
            alpha_filtering: 1,
            alpha_quality: 100,
            pass: 1,
            preprocessing: 0,
            use_sharp_yuv: false,
            autofilter: false,
        };
    }

    let quality = (raw * 100.0) as f32;
    EncoderParams {
        preset: WebPPreset::Picture,
        lossless: false,
        quality,
        method: if thorough { 6 } else { 0 },
        // Alpha must never degrade, even when RGB is lossy. `exact` keeps RGB
        // under transparent pixels; alpha_quality 100 keeps the alpha plane lossless.
        exact: true,
        thread_level: 1,
        alpha_compression: 1,
        alpha_filtering: if thorough { 2 } else { 1 },
        alpha_quality: 100,
        pass: if thorough { 10 } else { 1 },
        preprocessing: 0,
        use_sharp_yuv: thorough,
        autofilter: thorough,
    }
}
