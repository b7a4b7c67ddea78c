#![no_main]

//! Encode arbitrary premultiplied buffers at arbitrary quality and stride.
//! Lossless output must decode back to the input.

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use snapshot_webp::engine::resolve_with_effort;
use snapshot_webp::{
    decode_webp, CanonicalImage, EncoderEffort, QualityLevel, StatisticsSink, WebPEncoder,
};

#[derive(Arbitrary, Debug)]
struct EncodeSeed {
    width: u8,
    height: u8,
    padding: u8,
    quality: f64,
    thorough: bool,
}

fn build_image(seed: &EncodeSeed, pixels: &[u8]) -> CanonicalImage {
    // Limit dimensions to avoid OOM (max 64x64)
    let w = (seed.width as u32 % 64).max(1);
    let h = (seed.height as u32 % 64).max(1);
    let pad = (seed.padding % 16) as usize;
    let stride = w as usize * 4 + pad;
    let mut data = vec![0u8; stride * h as usize];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = pixels.get(i % pixels.len().max(1)).copied().unwrap_or(128);
    }
    // Keep samples valid premultiplied.
    for row in data.chunks_mut(stride) {
        for px in row[..w as usize * 4].chunks_exact_mut(4) {
            let a = px[3];
            px[0] = px[0].min(a);
            px[1] = px[1].min(a);
            px[2] = px[2].min(a);
        }
    }
    CanonicalImage::new(w, h, stride, data).expect("geometry is consistent")
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let seed: EncodeSeed = match EncodeSeed::arbitrary(&mut unstructured) {
        Ok(s) => s,
        Err(_) => return,
    };
    let image = build_image(&seed, unstructured.take_rest());
    let level = QualityLevel::from_raw(seed.quality);
    let effort = if seed.thorough {
        EncoderEffort::Thorough
    } else {
        EncoderEffort::Fast
    };

    let encoder = WebPEncoder::with_sink(StatisticsSink::new());
    let artifact = encoder
        .encode(&image, &resolve_with_effort(level, effort))
        .expect("valid image and resolved params must encode");
    let decoded = decode_webp(artifact.as_bytes()).expect("own output must decode");
    assert_eq!(decoded.dimensions(), image.dimensions());
    if level.is_lossless() {
        assert!(decoded.pixels_eq(&image));
    }
});
