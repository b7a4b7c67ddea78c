// src/engine/encoder.rs
//
// WebP encode/decode for canonical images.
//
// The encoder drives libwebp directly (through codecs::webp_safe) because the
// higher-level `webp::Encoder` cannot import padded rows. Decoding goes through
// the `webp` crate's simple decoder.
//
// Stored files are standard straight-alpha WebP: pixels are un-premultiplied
// before import and premultiplied again after decode. For valid premultiplied
// samples that pair is an exact round trip.

use crate::codecs::webp_safe::{validate_config, SafeMemoryWriter, SafeWebPPicture};
use crate::engine::canonical::{premultiply_in_place, unpremultiply_in_place, CanonicalImage};
use crate::engine::common::{check_dimensions, run_with_panic_policy, EngineResult};
use crate::engine::quality::{resolve, EncoderParams, QualityLevel, WebPPreset};
use crate::engine::stats::{EncodingStatistics, StatisticsSink};
use crate::error::SnapshotError;
use libwebp_sys::WebPConfig;
use std::time::Instant;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};

/// A compressed WebP stream plus the statistics of the encode that made it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArtifact {
    pub data: Vec<u8>,
    pub statistics: EncodingStatistics,
}

impl EncodedArtifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Encodes canonical images and reports statistics to a sink.
///
/// `WebPEncoder::default()` writes to the process-wide sink; tests that need
/// isolation use `with_sink(StatisticsSink::new())`.
#[derive(Debug, Clone)]
pub struct WebPEncoder {
    sink: StatisticsSink,
}

impl Default for WebPEncoder {
    fn default() -> Self {
        Self {
            sink: StatisticsSink::global(),
        }
    }
}

impl WebPEncoder {
    pub fn with_sink(sink: StatisticsSink) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &StatisticsSink {
        &self.sink
    }

    /// Encode at a quality level with the default effort.
    pub fn encode_level(
        &self,
        image: &CanonicalImage,
        level: QualityLevel,
    ) -> EngineResult<EncodedArtifact> {
        self.encode(image, &resolve(level))
    }

    /// Encode a canonical image with fully resolved parameters.
    ///
    /// On success the statistics are also written to this encoder's sink,
    /// replacing whatever was there.
    pub fn encode(
        &self,
        image: &CanonicalImage,
        params: &EncoderParams,
    ) -> EngineResult<EncodedArtifact> {
        run_with_panic_policy("encode:webp", || {
            let (width, height) = image.dimensions();
            if image.is_empty() {
                return Err(SnapshotError::encode_failed(format!(
                    "cannot encode an empty image ({width}x{height})"
                )));
            }
            check_dimensions(width, height)?;
            let config = build_config(params)?;

            let import_start = Instant::now();
            let straight = straight_alpha_copy(image);
            let mut picture = SafeWebPPicture::new(width, height)?;
            picture.import_rgba(&straight, image.stride())?;
            drop(straight);
            let import_duration = import_start.elapsed();

            let encode_start = Instant::now();
            let mut writer = SafeMemoryWriter::new();
            picture.encode(&config, &mut writer)?;
            let data = writer.to_vec();
            let encoding_duration = encode_start.elapsed();

            let statistics = EncodingStatistics {
                original_size: image.buffer_len(),
                encoded_size: data.len(),
                import_duration,
                encoding_duration,
            };
            tracing::trace!(
                width,
                height,
                lossless = params.lossless,
                quality = params.quality,
                original = statistics.original_size,
                encoded = statistics.encoded_size,
                import_us = import_duration.as_micros() as u64,
                encode_us = encoding_duration.as_micros() as u64,
                "encode:webp finished"
            );
            self.sink.record(statistics);
            Ok(EncodedArtifact { data, statistics })
        })
    }
}

fn libwebp_preset(preset: WebPPreset) -> libwebp_sys::WebPPreset {
    match preset {
        WebPPreset::Default => libwebp_sys::WebPPreset::WEBP_PRESET_DEFAULT,
        WebPPreset::Picture => libwebp_sys::WebPPreset::WEBP_PRESET_PICTURE,
        WebPPreset::Photo => libwebp_sys::WebPPreset::WEBP_PRESET_PHOTO,
        WebPPreset::Drawing => libwebp_sys::WebPPreset::WEBP_PRESET_DRAWING,
        WebPPreset::Icon => libwebp_sys::WebPPreset::WEBP_PRESET_ICON,
        WebPPreset::Text => libwebp_sys::WebPPreset::WEBP_PRESET_TEXT,
    }
}

/// Translate encoder parameters into a validated libwebp configuration.
pub fn build_config(params: &EncoderParams) -> EngineResult<WebPConfig> {
    // Preset init validates too, so seed it with an in-range quality and let
    // the final validation report the caller's value.
    let mut config =
        WebPConfig::new_with_preset(libwebp_preset(params.preset), params.quality.clamp(0.0, 100.0))
            .map_err(|_| SnapshotError::invalid_config("failed to initialize WebPConfig"))?;

    config.quality = params.quality;
    config.lossless = i32::from(params.lossless);
    config.method = params.method;
    config.exact = i32::from(params.exact);
    config.thread_level = params.thread_level;
    config.alpha_compression = params.alpha_compression;
    config.alpha_filtering = params.alpha_filtering;
    config.alpha_quality = params.alpha_quality;
    config.pass = params.pass;
    config.preprocessing = params.preprocessing;
    config.use_sharp_yuv = i32::from(params.use_sharp_yuv);
    config.autofilter = i32::from(params.autofilter);

    validate_config(&config)?;
    tracing::debug!(
        preset = ?params.preset,
        lossless = params.lossless,
        quality = params.quality,
        method = params.method,
        "encode:webp config"
    );
    Ok(config)
}

/// Un-premultiplied copy that keeps the source stride (padding is untouched).
fn straight_alpha_copy(image: &CanonicalImage) -> Vec<u8> {
    let mut data = image.raw_bytes().to_vec();
    let row_bytes = image.row_bytes();
    for row in data.chunks_mut(image.stride()).take(image.height() as usize) {
        unpremultiply_in_place(&mut row[..row_bytes]);
    }
    data
}

/// Decode a WebP stream into a canonical (premultiplied) image.
pub fn decode_webp(data: &[u8]) -> EngineResult<CanonicalImage> {
    run_with_panic_policy("decode:webp", || {
        // Parse header first to avoid allocating huge buffers on malformed files
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            SnapshotError::decode_failed("webp: failed to read bitstream features")
        })?;
        if features.has_animation() {
            return Err(SnapshotError::decode_failed(
                "webp: animated streams are not supported",
            ));
        }
        check_dimensions(features.width(), features.height())?;

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| SnapshotError::decode_failed("webp: decode failed"))?;
        let (width, height) = (decoded.width(), decoded.height());
        check_dimensions(width, height)?;

        let mut pixels = if decoded.is_alpha() {
            decoded.to_vec()
        } else {
            let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
            for px in decoded.chunks_exact(3) {
                rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
            rgba
        };
        premultiply_in_place(&mut pixels);
        CanonicalImage::from_packed(width, height, pixels)
    })
}
