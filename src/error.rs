// src/error.rs
//
// Unified error handling for snapshot-webp
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input or configuration, caller bug
// - CodecError: Extraction/encoding/decoding issues
// - ResourceLimit: Dimension limits
// - InternalBug: Library bugs (should not happen)
//
// A comparison mismatch is NOT an error. It is a normal verdict
// (see engine::ComparisonVerdict).

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used to decide how a snapshot harness reports a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input or configuration, fixable by the caller
    UserError,
    /// Extraction/encode/decode issues
    CodecError,
    /// Dimension limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    /// Get string representation of error category
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// snapshot-webp error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    // Extraction Errors
    #[error("Failed to extract pixel data: {message}")]
    Extraction { message: Cow<'static, str> },

    // Geometry Errors
    #[error(
        "Invalid image geometry: {width}x{height} with stride {stride} needs {expected} bytes, got {len}"
    )]
    InvalidGeometry {
        width: u32,
        height: u32,
        stride: usize,
        expected: usize,
        len: usize,
    },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Codec Errors
    #[error("Invalid WebP encoder configuration: {message}")]
    InvalidConfig { message: Cow<'static, str> },

    #[error("Failed to encode as webp: {message}")]
    EncodeFailed { message: Cow<'static, str> },

    #[error("Failed to decode webp: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    // Configuration Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

// Constructor Helpers
impl SnapshotError {
    pub fn extraction(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    pub fn invalid_geometry(
        width: u32,
        height: u32,
        stride: usize,
        expected: usize,
        len: usize,
    ) -> Self {
        Self::InvalidGeometry {
            width,
            height,
            stride,
            expected,
            len,
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn invalid_config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn encode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::EncodeFailed {
            message: message.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (caller can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are recoverable,
    /// CodecError and InternalBug are not. Nothing in this crate retries.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidGeometry { .. }
            | Self::InvalidConfig { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::UserError,

            Self::Extraction { .. } | Self::EncodeFailed { .. } | Self::DecodeFailed { .. } => {
                ErrorCategory::CodecError
            }

            Self::DimensionExceedsLimit { .. } | Self::PixelCountExceedsLimit { .. } => {
                ErrorCategory::ResourceLimit
            }

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, SnapshotError>;
