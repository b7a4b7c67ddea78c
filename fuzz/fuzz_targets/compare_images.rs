#![no_main]

//! Compare two arbitrary images under arbitrary tolerances. The comparator
//! must always produce a verdict and must match an image against itself.

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use snapshot_webp::{
    CanonicalImage, Comparator, QualityLevel, StatisticsSink, ToleranceConfig, WebPEncoder,
};

#[derive(Arbitrary, Debug)]
struct CompareSeed {
    ref_width: u8,
    ref_height: u8,
    new_width: u8,
    new_height: u8,
    precision: f64,
    perceptual_precision: f64,
    quality: f64,
}

fn build_image(width: u8, height: u8, pixels: &[u8]) -> CanonicalImage {
    let w = width as u32 % 32;
    let h = height as u32 % 32;
    CanonicalImage::from_fn(w, h, |x, y| {
        let i = ((y * w + x) * 4) as usize;
        let byte = |k: usize| pixels.get((i + k) % pixels.len().max(1)).copied().unwrap_or(0);
        let a = byte(3);
        [byte(0).min(a), byte(1).min(a), byte(2).min(a), a]
    })
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let seed: CompareSeed = match CompareSeed::arbitrary(&mut unstructured) {
        Ok(s) => s,
        Err(_) => return,
    };
    let pixels = unstructured.take_rest();
    let reference = build_image(seed.ref_width, seed.ref_height, pixels);
    let candidate = build_image(seed.new_width, seed.new_height, pixels.get(7..).unwrap_or(&[]));
    let tolerance = ToleranceConfig::new(seed.precision, seed.perceptual_precision);
    let quality = QualityLevel::from_raw(seed.quality);

    let comparator = Comparator::new().with_encoder(WebPEncoder::with_sink(StatisticsSink::new()));
    if let Ok(verdict) = comparator.compare(&reference, &candidate, &tolerance, quality) {
        if let Some(diff) = verdict.diff_image() {
            assert_eq!(diff.width(), reference.width().max(candidate.width()));
            assert_eq!(diff.height(), reference.height().max(candidate.height()));
        }
    }
    if !candidate.is_empty() {
        let verdict = comparator
            .compare(&candidate, &candidate, &tolerance, quality)
            .expect("self comparison never re-encodes");
        assert!(verdict.is_match());
    }
});
