// src/engine.rs
//
// The core of snapshot-webp:
// 1. Normalizes any pixel source into a canonical premultiplied RGBA buffer
// 2. Encodes it to WebP under a quality policy
// 3. Compares candidates against references with exact, byte and perceptual tolerance
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Same limit as libvips. libwebp itself caps each side at 16383 and reports
/// larger pictures as a bad dimension.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod canonical;
mod common;
mod compare;
mod diff;
mod encoder;
mod extract;
mod perceptual;
mod quality;
mod stats;

pub use canonical::{premultiply_in_place, unpremultiply_in_place, CanonicalImage, BYTES_PER_PIXEL};
pub use common::{check_dimensions, EngineResult};
pub use compare::{
    allowed_differences, ComparisonVerdict, Comparator, MismatchReason, ToleranceConfig,
};
pub use diff::render as render_diff;
pub use encoder::{build_config, decode_webp, EncodedArtifact, WebPEncoder};
pub use extract::{extract, extract_resized, BitmapInfo, ColorModel, PixelSource, RawBitmap};
pub use perceptual::{delta_e94, measure as measure_perceptual, Lab, PerceptualStats};
pub use quality::{
    resolve, resolve_with_effort, EncoderEffort, EncoderParams, QualityLevel, WebPPreset,
};
pub use stats::{EncodingStatistics, StatisticsSink};
