// tests/edge_cases.rs
//
// Edge case tests for snapshot-webp
// Tests boundary values, invalid inputs, and error handling

use snapshot_webp::engine::{
    allowed_differences, check_dimensions, extract, extract_resized, resolve, BitmapInfo,
    MismatchReason, RawBitmap, MAX_DIMENSION, MAX_PIXELS,
};
use snapshot_webp::{
    decode_webp, CanonicalImage, ComparisonVerdict, Comparator, ErrorCategory, QualityLevel,
    SnapshotError, StatisticsSink, ToleranceConfig, WebPEncoder,
};

// Helper function to create test images
fn create_test_image(width: u32, height: u32) -> CanonicalImage {
    CanonicalImage::from_fn(width, height, |x, y| {
        [(x % 256) as u8, (y % 256) as u8, 128, 255]
    })
}

fn comparator() -> Comparator {
    Comparator::new().with_encoder(WebPEncoder::with_sink(StatisticsSink::new()))
}

mod dimension_tests {
    use super::*;

    #[test]
    fn test_one_pixel_image_round_trips() {
        let img = CanonicalImage::from_fn(1, 1, |_, _| [12, 34, 56, 78]);
        let artifact = WebPEncoder::with_sink(StatisticsSink::new())
            .encode_level(&img, QualityLevel::Lossless)
            .unwrap();
        assert!(decode_webp(artifact.as_bytes()).unwrap().pixels_eq(&img));
    }

    #[test]
    fn test_extreme_aspect_ratios() {
        let encoder = WebPEncoder::with_sink(StatisticsSink::new());
        for (w, h) in [(1000, 1), (1, 1000)] {
            let img = create_test_image(w, h);
            let decoded =
                decode_webp(encoder.encode_level(&img, QualityLevel::Lossless).unwrap().as_bytes())
                    .unwrap();
            assert_eq!(decoded.dimensions(), (w, h));
        }
    }

    #[test]
    fn test_limits() {
        assert!(check_dimensions(MAX_DIMENSION, 1).is_ok());
        let err = check_dimensions(1, MAX_DIMENSION + 1).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ResourceLimit);
        assert!(err.is_recoverable());
        let side = (MAX_PIXELS as f64).sqrt() as u32 + 1;
        assert!(matches!(
            check_dimensions(side, side),
            Err(SnapshotError::PixelCountExceedsLimit { .. })
        ));
    }

    #[test]
    fn test_zero_height_candidate_is_empty() {
        let verdict = comparator()
            .compare(
                &create_test_image(5, 5),
                &CanonicalImage::transparent(5, 0),
                &ToleranceConfig::exact(),
                QualityLevel::Medium,
            )
            .unwrap();
        assert_eq!(verdict.message().unwrap(), "Newly-taken snapshot is empty.");
    }

    #[test]
    fn test_empty_reference_is_size_mismatch() {
        let verdict = comparator()
            .compare(
                &CanonicalImage::empty(),
                &create_test_image(3, 2),
                &ToleranceConfig::new(0.0, 0.0),
                QualityLevel::Lossless,
            )
            .unwrap();
        assert!(matches!(
            verdict,
            ComparisonVerdict::Mismatch {
                reason: MismatchReason::SizeMismatch { .. },
                ..
            }
        ));
    }
}

mod stride_tests {
    use super::*;

    fn padded_copy(img: &CanonicalImage, pad: usize, fill: u8) -> CanonicalImage {
        let mut data = Vec::new();
        for row in img.rows() {
            data.extend_from_slice(row);
            data.extend(std::iter::repeat(fill).take(pad));
        }
        CanonicalImage::new(img.width(), img.height(), img.row_bytes() + pad, data).unwrap()
    }

    #[test]
    fn test_padding_never_affects_comparison() {
        let img = create_test_image(9, 7);
        let a = padded_copy(&img, 4, 0x00);
        let b = padded_copy(&img, 12, 0xFF);
        let verdict = comparator()
            .compare(&a, &b, &ToleranceConfig::exact(), QualityLevel::Lossless)
            .unwrap();
        assert!(verdict.is_match());
    }

    #[test]
    fn test_padded_raw_bitmap_is_repacked() {
        let img = create_test_image(3, 2);
        let padded = padded_copy(&img, 8, 0xAB);
        let raw = RawBitmap::premultiplied_rgba(3, 2, padded.raw_bytes())
            .with_bytes_per_row(padded.stride());
        let extracted = extract(&raw).unwrap();
        assert_eq!(extracted.stride(), 12);
        assert!(extracted.pixels_eq(&img));
    }

    #[test]
    fn test_invalid_geometry() {
        let err = CanonicalImage::new(4, 4, 16, vec![0; 63]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::UserError);
        assert!(err.to_string().contains("4x4"));
    }
}

mod tolerance_tests {
    use super::*;

    #[test]
    fn test_threshold_exact_for_awkward_totals() {
        for total in [3usize, 7, 97, 1000, 4 * 333 * 211] {
            for k in [0, 1, total / 3, total / 2, total - 1, total] {
                let p = 1.0 - k as f64 / total as f64;
                assert_eq!(allowed_differences(total, p), k, "total={total} k={k}");
            }
        }
    }

    #[test]
    fn test_zero_precision_accepts_anything_same_size() {
        let white = CanonicalImage::from_fn(6, 6, |_, _| [255, 255, 255, 255]);
        let black = CanonicalImage::from_fn(6, 6, |_, _| [0, 0, 0, 255]);
        let verdict = comparator()
            .compare(
                &white,
                &black,
                &ToleranceConfig::new(0.0, 1.0),
                QualityLevel::Lossless,
            )
            .unwrap();
        assert!(verdict.is_match());
    }

    #[test]
    fn test_lossless_with_tolerance_runs_full_escalation() {
        let reference = create_test_image(8, 8);
        let candidate = CanonicalImage::from_fn(8, 8, |x, y| {
            let mut px = reference.pixel(x, y);
            if x == 0 {
                px[1] = px[1].wrapping_add(40);
            }
            px
        });
        // 8 differing bytes out of 256.
        let verdict = comparator()
            .compare(
                &reference,
                &candidate,
                &ToleranceConfig::new(0.95, 1.0),
                QualityLevel::Lossless,
            )
            .unwrap();
        assert!(verdict.is_match());

        let verdict = comparator()
            .compare(
                &reference,
                &candidate,
                &ToleranceConfig::new(0.99, 1.0),
                QualityLevel::Lossless,
            )
            .unwrap();
        assert!(matches!(
            verdict,
            ComparisonVerdict::Mismatch {
                reason: MismatchReason::PixelPrecision { .. },
                ..
            }
        ));
    }
}

mod error_tests {
    use super::*;

    #[test]
    fn test_truncated_webp_is_decode_error() {
        let artifact = WebPEncoder::with_sink(StatisticsSink::new())
            .encode_level(&create_test_image(32, 32), QualityLevel::Lossless)
            .unwrap();
        let truncated = &artifact.as_bytes()[..artifact.len() / 2];
        let err = decode_webp(truncated).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::CodecError);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_out_of_range_params_are_invalid_config() {
        let mut params = resolve(QualityLevel::Low);
        params.quality = -1.0;
        let err = WebPEncoder::with_sink(StatisticsSink::new())
            .encode(&create_test_image(4, 4), &params)
            .unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidConfig { .. }));
        assert_eq!(err.category(), ErrorCategory::UserError);
    }

    #[test]
    fn test_conflicting_alpha_flags_are_extraction_error() {
        let data = vec![0u8; 16];
        let raw = RawBitmap::rgba8(
            2,
            2,
            BitmapInfo::ALPHA_PREMULTIPLIED | BitmapInfo::ALPHA_STRAIGHT,
            &data,
        );
        assert!(matches!(
            extract(&raw),
            Err(SnapshotError::Extraction { .. })
        ));
    }

    #[test]
    fn test_resize_to_zero_is_invalid_argument() {
        let err = extract_resized(&create_test_image(4, 4), 4, 0).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidArgument { .. }));
    }
}
