// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the panic policy and dimension checks used at every codec boundary.

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::SnapshotError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, SnapshotError>;

/// Run a codec-facing closure, converting a panic into `InternalPanic`.
///
/// Snapshot suites run thousands of comparisons in one process, so a codec
/// panic must fail the single snapshot rather than abort the test binary.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::error!(stage, %detail, "panic caught at codec boundary");
            Err(SnapshotError::internal_panic(format!(
                "{stage}: panic: {detail}"
            )))
        }
    }
}

/// Reject images whose dimensions exceed the global limits.
pub fn check_dimensions(width: u32, height: u32) -> EngineResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(SnapshotError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(SnapshotError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_is_converted() {
        let result: EngineResult<()> = run_with_panic_policy("test:panic", || panic!("kaboom"));
        let err = result.unwrap_err();
        assert!(matches!(err, SnapshotError::InternalPanic { .. }));
        assert!(err.to_string().contains("kaboom"));
        assert!(err.to_string().contains("test:panic"));
    }

    #[test]
    fn test_ok_passes_through() {
        let result = run_with_panic_policy("test:ok", || Ok(7));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_check_dimensions_limits() {
        assert!(check_dimensions(1, 1).is_ok());
        assert!(check_dimensions(MAX_DIMENSION, 1).is_ok());
        assert!(matches!(
            check_dimensions(MAX_DIMENSION + 1, 1),
            Err(SnapshotError::DimensionExceedsLimit { .. })
        ));
        assert!(matches!(
            check_dimensions(20_000, 20_000),
            Err(SnapshotError::PixelCountExceedsLimit { .. })
        ));
    }
}
