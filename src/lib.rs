// lib.rs
//
// snapshot-webp: WebP snapshot storage and tolerant image comparison for
// snapshot tests.
//
// Design goals:
// - One canonical pixel format (RGBA8, premultiplied, explicit stride)
// - Stored snapshots are standard WebP files
// - Comparisons judge what the codec actually produces, not the raw render
// - Every failure is an explicit value; nothing is retried or swallowed

pub mod codecs;
pub mod engine;
pub mod error;
pub mod snapshot;

pub use engine::{
    decode_webp, extract, CanonicalImage, ComparisonVerdict, Comparator, EncodedArtifact,
    EncoderEffort, EncodingStatistics, PixelSource, QualityLevel, StatisticsSink,
    ToleranceConfig, WebPEncoder,
};
pub use error::{ErrorCategory, Result, SnapshotError};
pub use snapshot::{SnapshotConfig, SnapshotFailure, WebPSnapshot};

/// Statistics of the most recent encode through any default-constructed encoder.
pub fn last_encoding_statistics() -> Option<EncodingStatistics> {
    StatisticsSink::global().last()
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
